//! Bundled test plans.

mod errors;
mod types;

use std::collections::HashSet;
use std::sync::Arc;

use crate::actor::BehaviorCatalog;
use crate::types::RoleSlot;

pub use errors::PlanError;
pub use types::{BehaviorSpec, PlanKind, TestPlan, TestStep};

const RP_TEST_PLAN: &str = include_str!("plans/rp_test_plan.json");
const OP_TEST_PLAN: &str = include_str!("plans/op_test_plan.json");

/// Both plans, parsed and checked against a behavior catalog.
#[derive(Debug, Clone)]
pub struct TestPlans {
    rp: Arc<TestPlan>,
    op: Arc<TestPlan>,
}

impl TestPlans {
    /// Load the bundled plans. Fails when a plan names an implementation
    /// the catalog does not know.
    pub fn load(catalog: &BehaviorCatalog) -> Result<Self, PlanError> {
        let rp = parse_plan("RP-Test-Plan", RP_TEST_PLAN)?;
        let op = parse_plan("OP-Test-Plan", OP_TEST_PLAN)?;
        validate(&rp, PlanKind::Rp, catalog)?;
        validate(&op, PlanKind::Op, catalog)?;
        tracing::info!(
            "Loaded test plans: {} ({} steps), {} ({} steps)",
            rp.name,
            rp.steps.len(),
            op.name,
            op.steps.len()
        );
        Ok(Self {
            rp: Arc::new(rp),
            op: Arc::new(op),
        })
    }

    pub fn rp(&self) -> Arc<TestPlan> {
        self.rp.clone()
    }

    pub fn op(&self) -> Arc<TestPlan> {
        self.op.clone()
    }

    pub fn get(&self, kind: PlanKind) -> Arc<TestPlan> {
        match kind {
            PlanKind::Rp => self.rp(),
            PlanKind::Op => self.op(),
        }
    }
}

pub fn parse_plan(label: &str, json: &str) -> Result<TestPlan, PlanError> {
    serde_json::from_str(json).map_err(|e| PlanError::Parse {
        plan: label.to_string(),
        message: e.to_string(),
    })
}

/// Check identifiers, slots and step names of `plan`.
pub fn validate(plan: &TestPlan, kind: PlanKind, catalog: &BehaviorCatalog) -> Result<(), PlanError> {
    let invalid = |message: String| PlanError::Invalid {
        plan: plan.name.clone(),
        message,
    };
    let unknown = |step: &TestStep, implementation: &str| PlanError::UnknownImplementation {
        plan: plan.name.clone(),
        step: step.name.clone(),
        implementation: implementation.to_string(),
    };

    let mut names = HashSet::new();
    for step in plan.all_steps() {
        if !names.insert(step.name.as_str()) {
            return Err(invalid(format!("duplicate step name '{}'", step.name)));
        }
        if !catalog.has_browser(&step.browser.implementation) {
            return Err(unknown(step, &step.browser.implementation));
        }
        for (slot, spec) in step.servers() {
            let expected_op = kind == PlanKind::Rp;
            if slot.is_op() != expected_op {
                return Err(invalid(format!("step '{}' uses slot {}", step.name, slot)));
            }
            if !catalog.has_server(&spec.implementation) {
                return Err(unknown(step, &spec.implementation));
            }
        }
        let required = match kind {
            PlanKind::Rp => [RoleSlot::Op1, RoleSlot::Op2],
            PlanKind::Op => [RoleSlot::Rp1, RoleSlot::Rp2],
        };
        let present: Vec<RoleSlot> = step.servers().into_iter().map(|(slot, _)| slot).collect();
        if let Some(missing) = required.iter().find(|slot| !present.contains(*slot)) {
            return Err(invalid(format!("step '{}' lacks slot {}", step.name, missing)));
        }
    }
    Ok(())
}
