use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::actor::{
    ActorEnv, ActorError, ActorInstance, ActorParams, BehaviorCatalog, BrowserBehavior,
    DriverFactory,
};
use crate::context::keys::params::{
    BROWSER_INPUT_EVIL_OP_URL, BROWSER_INPUT_HONEST_OP_URL, BROWSER_INPUT_OP_URL,
    REGISTRATION_NEEDED, TARGET_OP_URL,
};
use crate::context::keys::{REGISTRATION_FRAGMENT, STEP_COMPLETED};
use crate::context::{StepContext, SuiteContext};
use crate::logger::StepLogger;
use crate::plan::TestStep;
use crate::registry::InstanceRegistry;
use crate::types::{ENFORCE_REGISTRATION_PREFIX, RoleSlot, TestConfig, TestId};
use crate::utils::gen_alphanumeric;
use crate::verdict::Verdict;

use super::config::RunnerConfig;
use super::errors::RunnerError;
use super::grant::test_granted;

/// Everything a single step execution needs from its test object.
pub struct StepRun {
    pub test_id: TestId,
    pub step: TestStep,
    /// Suite parameters of the plan the step belongs to.
    pub suite_parameters: HashMap<String, String>,
    pub config: Arc<RwLock<TestConfig>>,
    pub suite: Arc<SuiteContext>,
    pub logger: StepLogger,
}

/// Runs test steps: grant check, actor wiring, browser run and teardown.
#[derive(Clone)]
pub struct StepExecutor {
    config: Arc<RunnerConfig>,
    registry: Arc<InstanceRegistry>,
    catalog: Arc<BehaviorCatalog>,
    drivers: Arc<dyn DriverFactory>,
}

/// What one step registered, released by `cleanup`.
struct StepResources {
    slots: Vec<RoleSlot>,
    browser: Option<Arc<dyn BrowserBehavior>>,
}

impl StepExecutor {
    pub fn new(
        config: RunnerConfig,
        registry: Arc<InstanceRegistry>,
        catalog: Arc<BehaviorCatalog>,
        drivers: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            catalog,
            drivers,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<BehaviorCatalog> {
        &self.catalog
    }

    /// Run one step and return its verdict. Failures never escape: they are
    /// logged and reported as UNDETERMINED.
    pub async fn run_step(&self, run: StepRun) -> Verdict {
        let step = Arc::new(StepContext::new(
            run.step.context_parameters(&run.suite_parameters),
        ));
        run.logger
            .log(format!("Running test step '{}'.", run.step.name));

        let target = run
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .target_url()
            .to_string();
        if !test_granted(&self.config, &target, &step, &run.logger).await {
            run.logger
                .log("Test not permitted by the target, the result is undetermined.");
            return Verdict::Undetermined;
        }

        let env = ActorEnv {
            test_id: run.test_id.clone(),
            hosts: Arc::new(self.config.hosts.clone()),
            config: run.config.clone(),
            logger: run.logger.clone(),
            suite: run.suite.clone(),
            step: step.clone(),
            params: ActorParams::default(),
            timeouts: self.config.timeouts,
        };

        let mut resources = StepResources {
            slots: Vec::new(),
            browser: None,
        };
        let result = self.execute(&run.step, &env, &mut resources).await;
        self.cleanup(&env, resources).await;

        match result {
            Ok(verdict) => {
                if verdict.is_conclusive() {
                    run.suite.insert(STEP_COMPLETED, true);
                }
                run.logger
                    .log(format!("Test step '{}' finished: {}.", run.step.name, verdict));
                verdict
            }
            Err(e) => {
                let e = e.log();
                run.logger.log_error(e.reason(), &e);
                Verdict::Undetermined
            }
        }
    }

    async fn execute(
        &self,
        test_step: &TestStep,
        env: &ActorEnv,
        resources: &mut StepResources,
    ) -> Result<Verdict, RunnerError> {
        match env.config() {
            TestConfig::Rp(_) => self.prepare_rp_test(test_step, env)?,
            TestConfig::Op(cfg) => {
                if !cfg.is_minimal_valid() {
                    return Err(RunnerError::Preparation(ActorError::Configuration(
                        "OP test configuration is incomplete".to_string(),
                    )));
                }
                if !cfg.url_op_target.trim().is_empty() {
                    env.step.set_param(TARGET_OP_URL, cfg.url_op_target.trim());
                }
            }
        }

        let mut instances = Vec::new();
        for (slot, spec) in test_step.servers() {
            let actor_env = env.with_params(ActorParams::new(spec.parameters.clone()));
            let behavior = self
                .catalog
                .server(&spec.implementation, actor_env, slot)
                .map_err(RunnerError::Preparation)?;
            let instance =
                ActorInstance::new(slot, &spec.implementation, behavior, env.logger.clone());
            instances.push(self.registry.register(&env.test_id, instance));
            resources.slots.push(slot);
        }
        for instance in instances {
            let slot = instance.slot();
            match tokio::spawn(async move { instance.setup().await }).await {
                Ok(result) => result.map_err(RunnerError::Preparation)?,
                Err(e) => {
                    env.logger.log_error(&format!("Setup of {slot} aborted"), &e);
                    return Ok(Verdict::Undetermined);
                }
            }
        }

        let mut browser_params = test_step.browser.parameters.clone();
        browser_params.remove(BROWSER_INPUT_OP_URL);
        let browser: Arc<dyn BrowserBehavior> = Arc::from(
            self.catalog
                .browser(
                    &test_step.browser.implementation,
                    env.with_params(ActorParams::new(browser_params)),
                    self.drivers.clone(),
                )
                .map_err(RunnerError::Preparation)?,
        );
        resources.browser = Some(browser.clone());

        let handle = tokio::spawn(async move { browser.run().await });
        match handle.await {
            Ok(result) => Ok(result?),
            Err(e) => {
                env.logger.log_error("Browser run aborted", &e);
                Ok(Verdict::Undetermined)
            }
        }
    }

    /// Pick the OP identities typed into the RP's login form.
    fn prepare_rp_test(&self, test_step: &TestStep, env: &ActorEnv) -> Result<(), RunnerError> {
        let config = env.rp_config().map_err(RunnerError::Preparation)?;
        let hosts = &self.config.hosts;

        let (honest, evil) = if env.step.param_bool(REGISTRATION_NEEDED) {
            let fragment = format!("{ENFORCE_REGISTRATION_PREFIX}{}", gen_alphanumeric(8)?);
            env.step.insert(REGISTRATION_FRAGMENT, fragment.clone());
            env.logger.log(format!(
                "Enforcing client registration with path fragment '{fragment}'."
            ));
            (
                format!("{}/{}/{}", hosts.honest_op_url, fragment, env.test_id),
                format!("{}/{}/{}", hosts.evil_op_url, fragment, env.test_id),
            )
        } else {
            let or_issuer = |configured: &str, host: &str| {
                if configured.trim().is_empty() {
                    format!("{}/{}", host, env.test_id)
                } else {
                    configured.trim().to_string()
                }
            };
            (
                or_issuer(&config.honest_webfinger_resource_id, &hosts.honest_op_url),
                or_issuer(&config.evil_webfinger_resource_id, &hosts.evil_op_url),
            )
        };
        env.step.set_param(BROWSER_INPUT_HONEST_OP_URL, &honest);
        env.step.set_param(BROWSER_INPUT_EVIL_OP_URL, &evil);

        let selected = test_step
            .browser
            .parameters
            .get(BROWSER_INPUT_OP_URL)
            .map(String::as_str)
            .unwrap_or("EVIL");
        let identity = if selected.eq_ignore_ascii_case("EVIL") {
            evil
        } else if selected.eq_ignore_ascii_case("HONEST") {
            honest
        } else {
            return Err(RunnerError::Preparation(ActorError::Configuration(format!(
                "Invalid value '{selected}' for {BROWSER_INPUT_OP_URL}, expected HONEST or EVIL"
            ))));
        };
        env.step.set_param(BROWSER_INPUT_OP_URL, identity);
        Ok(())
    }

    async fn cleanup(&self, env: &ActorEnv, resources: StepResources) {
        for slot in resources.slots {
            self.registry.unregister(&env.test_id, slot);
        }
        let abandoned = env.step.abandon_barriers();
        if abandoned > 0 {
            tracing::debug!("Abandoned {} pending barriers of test {}", abandoned, env.test_id);
        }
        if let Some(browser) = resources.browser {
            browser.quit().await;
        }
    }
}
