use crate::config::{
    HOSTS, HostConfig, OIDC_CONFUSION_GRANT_PATH, OIDC_CONFUSION_SKIP_GRANT_CHECK, TIMEOUTS,
    Timeouts,
};

/// Settings of the step executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub hosts: HostConfig,
    /// Path of the grant resource on the target, e.g. `/.professos`.
    pub grant_path: String,
    pub skip_grant_check: bool,
    pub timeouts: Timeouts,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self {
            hosts: HOSTS.clone(),
            grant_path: OIDC_CONFUSION_GRANT_PATH.clone(),
            skip_grant_check: *OIDC_CONFUSION_SKIP_GRANT_CHECK,
            timeouts: *TIMEOUTS,
        }
    }
}
