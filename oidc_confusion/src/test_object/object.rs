use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::actor::Endpoint;
use crate::config::HostConfig;
use crate::context::SuiteContext;
use crate::logger::StepLogger;
use crate::plan::{PlanKind, TestPlan, TestStep};
use crate::runner::{StepExecutor, StepRun};
use crate::types::{OpTestConfig, RpTestConfig, TestConfig, TestId};
use crate::verdict::Verdict;

use super::errors::TestObjectError;
use super::types::{ExposedActor, ExposedEndpoints, StepResult, TestObjectExport, TestReport};

/// One user-visible test run: configuration, report and the suite context
/// shared by all of its steps.
pub struct TestObject {
    test_id: TestId,
    kind: PlanKind,
    plan: Arc<TestPlan>,
    config: Arc<RwLock<TestConfig>>,
    suite: Arc<SuiteContext>,
    report: Mutex<TestReport>,
    // Steps of one object share its actor slots and run one at a time
    running: tokio::sync::Mutex<()>,
}

impl TestObject {
    pub(crate) fn new(test_id: TestId, kind: PlanKind, plan: Arc<TestPlan>) -> Self {
        let config = match kind {
            PlanKind::Rp => TestConfig::Rp(RpTestConfig::default()),
            PlanKind::Op => TestConfig::Op(OpTestConfig::default()),
        };
        let report = TestReport {
            learning: StepResult::not_run(&plan.learning_step),
            steps: plan.steps.iter().map(StepResult::not_run).collect(),
        };
        Self {
            test_id,
            kind,
            plan,
            config: Arc::new(RwLock::new(config)),
            suite: Arc::new(SuiteContext::new()),
            report: Mutex::new(report),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn test_id(&self) -> &TestId {
        &self.test_id
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn plan(&self) -> &Arc<TestPlan> {
        &self.plan
    }

    pub fn config(&self) -> TestConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn report(&self) -> TestReport {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_rp_config(&self, update: RpTestConfig) -> Result<(), TestObjectError> {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match &mut *config {
            TestConfig::Rp(current) => {
                *current = update;
                Ok(())
            }
            TestConfig::Op(_) => Err(TestObjectError::WrongKind {
                test_id: self.test_id.to_string(),
                expected: "relying party",
            }),
        }
    }

    pub fn update_op_config(&self, update: OpTestConfig) -> Result<(), TestObjectError> {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match &mut *config {
            TestConfig::Op(current) => {
                *current = update;
                Ok(())
            }
            TestConfig::Rp(_) => Err(TestObjectError::WrongKind {
                test_id: self.test_id.to_string(),
                expected: "OpenID provider",
            }),
        }
    }

    pub async fn run_learning_step(&self, executor: &StepExecutor) -> Verdict {
        let step = self.plan.learning_step.clone();
        self.run(executor, step).await
    }

    pub async fn run_step(
        &self,
        executor: &StepExecutor,
        name: &str,
    ) -> Result<Verdict, TestObjectError> {
        let step = self
            .plan
            .step(name)
            .cloned()
            .ok_or_else(|| TestObjectError::NoSuchStep {
                plan: self.plan.name.clone(),
                step: name.to_string(),
            })?;
        Ok(self.run(executor, step).await)
    }

    async fn run(&self, executor: &StepExecutor, step: TestStep) -> Verdict {
        let _running = self.running.lock().await;
        let name = step.name.clone();
        self.record(&name, |result| result.log.clear());

        let logger = StepLogger::new(self.test_id.as_str(), &name);
        let verdict = executor
            .run_step(StepRun {
                test_id: self.test_id.clone(),
                step,
                suite_parameters: self.plan.suite_parameters.clone(),
                config: self.config.clone(),
                suite: self.suite.clone(),
                logger: logger.clone(),
            })
            .await;

        let log = logger.entries();
        self.record(&name, |result| {
            result.result = verdict;
            result.log = log;
        });
        verdict
    }

    fn record(&self, name: &str, update: impl FnOnce(&mut StepResult)) {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = report.entry_mut(name) {
            update(result);
        }
    }

    pub fn export(&self) -> TestObjectExport {
        TestObjectExport {
            test_id: self.test_id.clone(),
            kind: self.kind,
            plan: self.plan.name.clone(),
            config: self.config(),
            report: self.report(),
        }
    }

    /// URLs of the simulated OPs (RP tests) or RPs (OP tests) of this
    /// object.
    pub fn expose(&self, hosts: &HostConfig) -> ExposedEndpoints {
        let actor = |host: &str| {
            let base_url = format!("{}/{}", host, self.test_id);
            match self.kind {
                PlanKind::Rp => ExposedActor {
                    discovery_url: Some(format!("{base_url}{}", Endpoint::Discovery.path())),
                    redirect_uri: None,
                    jwks_uri: format!("{base_url}{}", Endpoint::Jwks.path()),
                    base_url,
                },
                PlanKind::Op => ExposedActor {
                    discovery_url: None,
                    redirect_uri: Some(format!("{base_url}{}", Endpoint::Callback.path())),
                    jwks_uri: format!("{base_url}{}", Endpoint::Jwks.path()),
                    base_url,
                },
            }
        };
        let (honest, evil) = match self.kind {
            PlanKind::Rp => (actor(&hosts.honest_op_url), actor(&hosts.evil_op_url)),
            PlanKind::Op => (actor(&hosts.honest_rp_url), actor(&hosts.evil_rp_url)),
        };
        ExposedEndpoints {
            test_id: self.test_id.clone(),
            honest,
            evil,
        }
    }
}
