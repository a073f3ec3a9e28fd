use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{HostConfig, Timeouts};
use crate::context::{StepContext, SuiteContext};
use crate::logger::StepLogger;
use crate::types::{OpTestConfig, RpTestConfig, TestConfig, TestId};

use super::errors::ActorError;
use super::types::ActorParams;

/// Everything an actor is wired with when a step starts: configuration,
/// logger, both context scopes and its own parameters.
#[derive(Clone)]
pub struct ActorEnv {
    pub test_id: TestId,
    pub hosts: Arc<HostConfig>,
    pub config: Arc<RwLock<TestConfig>>,
    pub logger: StepLogger,
    pub suite: Arc<SuiteContext>,
    pub step: Arc<StepContext>,
    pub params: ActorParams,
    pub timeouts: Timeouts,
}

impl ActorEnv {
    /// Same wiring with different actor parameters.
    pub fn with_params(&self, params: ActorParams) -> Self {
        Self {
            params,
            ..self.clone()
        }
    }

    pub fn config(&self) -> TestConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn rp_config(&self) -> Result<RpTestConfig, ActorError> {
        match self.config() {
            TestConfig::Rp(cfg) => Ok(cfg),
            TestConfig::Op(_) => Err(ActorError::Configuration(
                "Relying party test configuration required".to_string(),
            )),
        }
    }

    pub fn op_config(&self) -> Result<OpTestConfig, ActorError> {
        match self.config() {
            TestConfig::Op(cfg) => Ok(cfg),
            TestConfig::Rp(_) => Err(ActorError::Configuration(
                "OpenID provider test configuration required".to_string(),
            )),
        }
    }

    /// Boolean switch set either on the actor or on the whole step.
    pub fn flag(&self, name: &str) -> bool {
        self.params.bool(name) || self.step.param_bool(name)
    }

    pub fn update_config(&self, update: impl FnOnce(&mut TestConfig)) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut config);
    }

    /// Variables available to script templates: step parameters overlaid
    /// with the actor's own parameters.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let mut vars = self.step.params();
        vars.extend(
            self.params
                .as_map()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        vars
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ActorError> {
        reqwest::Client::builder()
            .timeout(self.timeouts.long)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ActorError::Http(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    pub(crate) fn test_hosts() -> HostConfig {
        HostConfig::new(
            "http://controller.test/",
            "http://honest-op.test/",
            "http://evil-op.test/",
            "http://honest-rp.test/",
            "http://evil-rp.test/",
        )
    }

    /// Environment with short timeouts for unit tests.
    pub(crate) fn env_with(config: TestConfig, params: &[(&str, &str)]) -> ActorEnv {
        let params: HashMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ActorEnv {
            test_id: TestId::new("t1"),
            hosts: Arc::new(test_hosts()),
            config: Arc::new(RwLock::new(config)),
            logger: StepLogger::new("t1", "unit"),
            suite: Arc::new(SuiteContext::new()),
            step: Arc::new(StepContext::new(HashMap::new())),
            params: ActorParams::new(params),
            timeouts: Timeouts::uniform(Duration::from_millis(100)),
        }
    }

    pub(crate) fn rp_env(params: &[(&str, &str)]) -> ActorEnv {
        env_with(TestConfig::Rp(RpTestConfig::default()), params)
    }
}
