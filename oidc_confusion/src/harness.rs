use std::sync::Arc;
use std::time::Duration;

use crate::actor::{BehaviorCatalog, DriverFactory};
use crate::config::{OIDC_CONFUSION_TEST_ID_LENGTH, OIDC_CONFUSION_TEST_OBJECT_LIFETIME};
use crate::plan::{PlanError, TestPlans};
use crate::registry::InstanceRegistry;
use crate::runner::{RunnerConfig, StepExecutor};
use crate::test_object::TestObjectRegistry;

/// Process-wide state: live test objects, live actor instances and the
/// executor wiring them together.
#[derive(Clone)]
pub struct Harness {
    objects: Arc<TestObjectRegistry>,
    executor: StepExecutor,
}

/// Construction options of a [`Harness`].
pub struct HarnessOptions {
    pub runner: RunnerConfig,
    pub catalog: BehaviorCatalog,
    pub drivers: Arc<dyn DriverFactory>,
    pub object_lifetime: Duration,
    pub test_id_length: usize,
}

impl HarnessOptions {
    /// Builtin behaviors and settings read from the environment.
    pub fn from_env(drivers: Arc<dyn DriverFactory>) -> Self {
        Self {
            runner: RunnerConfig::from_env(),
            catalog: BehaviorCatalog::builtin(),
            drivers,
            object_lifetime: *OIDC_CONFUSION_TEST_OBJECT_LIFETIME,
            test_id_length: *OIDC_CONFUSION_TEST_ID_LENGTH,
        }
    }
}

impl Harness {
    /// Load and validate the test plans and wire up the registries.
    pub fn new(options: HarnessOptions) -> Result<Self, PlanError> {
        let plans = TestPlans::load(&options.catalog)?;
        let objects = TestObjectRegistry::new(plans, options.object_lifetime, options.test_id_length);
        let executor = StepExecutor::new(
            options.runner,
            Arc::new(InstanceRegistry::new()),
            Arc::new(options.catalog),
            options.drivers,
        );
        Ok(Self {
            objects: Arc::new(objects),
            executor,
        })
    }

    pub fn objects(&self) -> &TestObjectRegistry {
        &self.objects
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    pub fn instances(&self) -> &InstanceRegistry {
        self.executor.registry()
    }

    pub fn config(&self) -> &RunnerConfig {
        self.executor.config()
    }
}
