use serde::{Deserialize, Serialize};

use crate::logger::LogEntry;
use crate::plan::{PlanKind, TestStep};
use crate::types::{TestConfig, TestId};
use crate::verdict::Verdict;

/// Result and log of one step as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub result: Verdict,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl StepResult {
    pub fn not_run(step: &TestStep) -> Self {
        Self {
            step: step.name.clone(),
            description: step.description.clone(),
            result: Verdict::NotRun,
            log: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub learning: StepResult,
    pub steps: Vec<StepResult>,
}

impl TestReport {
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.step == name)
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Option<&mut StepResult> {
        if self.learning.step == name {
            return Some(&mut self.learning);
        }
        self.steps.iter_mut().find(|result| result.step == name)
    }
}

/// Serialized form of a test object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestObjectExport {
    pub test_id: TestId,
    pub kind: PlanKind,
    pub plan: String,
    pub config: TestConfig,
    pub report: TestReport,
}

/// URLs of one simulated counterpart, known before any step runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedActor {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    pub jwks_uri: String,
}

/// Discovery data handed out early so the target can be prepared, e.g. by
/// registering the simulated clients or trusting the simulated issuers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedEndpoints {
    pub test_id: TestId,
    pub honest: ExposedActor,
    pub evil: ExposedActor,
}
