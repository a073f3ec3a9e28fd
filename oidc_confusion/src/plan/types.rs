use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::RoleSlot;

/// Behavior identifier plus the parameters handed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorSpec {
    pub implementation: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Step parameters, overriding the plan's suite parameters.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
    pub browser: BehaviorSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op1: Option<BehaviorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op2: Option<BehaviorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp1: Option<BehaviorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp2: Option<BehaviorSpec>,
}

impl TestStep {
    /// Counterpart servers of this step in slot order.
    pub fn servers(&self) -> Vec<(RoleSlot, &BehaviorSpec)> {
        [
            (RoleSlot::Op1, &self.op1),
            (RoleSlot::Op2, &self.op2),
            (RoleSlot::Rp1, &self.rp1),
            (RoleSlot::Rp2, &self.rp2),
        ]
        .into_iter()
        .filter_map(|(slot, spec)| spec.as_ref().map(|spec| (slot, spec)))
        .collect()
    }

    /// Suite parameters overlaid with the step's own.
    pub fn context_parameters(&self, suite: &HashMap<String, String>) -> HashMap<String, String> {
        let mut params = suite.clone();
        params.extend(self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}

/// Which kind of target a plan tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Rp,
    Op,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub name: String,
    #[serde(default)]
    pub suite_parameters: HashMap<String, String>,
    pub learning_step: TestStep,
    pub steps: Vec<TestStep>,
}

impl TestPlan {
    pub fn step(&self, name: &str) -> Option<&TestStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    /// The learning step followed by all regular steps.
    pub fn all_steps(&self) -> impl Iterator<Item = &TestStep> {
        std::iter::once(&self.learning_step).chain(self.steps.iter())
    }
}
