//! Central configuration for the oidc_confusion crate

use std::{env, sync::LazyLock, time::Duration};

/// URI of the controller that targets must echo back from their grant resource.
pub static OIDC_CONFUSION_CONTROLLER_URI: LazyLock<String> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_CONTROLLER_URI")
        .unwrap_or_else(|_| "http://controller.oidc-confusion.test/".to_string())
});

pub static OIDC_CONFUSION_HONEST_OP_URL: LazyLock<String> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_HONEST_OP_URL")
        .unwrap_or_else(|_| "http://honest-op.oidc-confusion.test/".to_string())
});

pub static OIDC_CONFUSION_EVIL_OP_URL: LazyLock<String> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_EVIL_OP_URL")
        .unwrap_or_else(|_| "http://evil-op.oidc-confusion.test/".to_string())
});

pub static OIDC_CONFUSION_HONEST_RP_URL: LazyLock<String> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_HONEST_RP_URL")
        .unwrap_or_else(|_| "http://honest-rp.oidc-confusion.test/".to_string())
});

pub static OIDC_CONFUSION_EVIL_RP_URL: LazyLock<String> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_EVIL_RP_URL")
        .unwrap_or_else(|_| "http://evil-rp.oidc-confusion.test/".to_string())
});

/// Path queried on the target to obtain permission for a test run.
/// Default: "/.professos"
pub static OIDC_CONFUSION_GRANT_PATH: LazyLock<String> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_GRANT_PATH").unwrap_or_else(|_| "/.professos".to_string())
});

/// Skip the grant check for every step. Intended for local setups only.
pub static OIDC_CONFUSION_SKIP_GRANT_CHECK: LazyLock<bool> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_SKIP_GRANT_CHECK")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
});

/// Idle lifetime of a test object in seconds. Default: 1800
pub static OIDC_CONFUSION_TEST_OBJECT_LIFETIME: LazyLock<Duration> = LazyLock::new(|| {
    Duration::from_secs(
        env::var("OIDC_CONFUSION_TEST_OBJECT_LIFETIME")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1800),
    )
});

pub static OIDC_CONFUSION_TEST_ID_LENGTH: LazyLock<usize> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_TEST_ID_LENGTH")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|len| *len >= 4)
        .unwrap_or(10)
});

/// W3C WebDriver endpoint used for simulated browsers, e.g.
/// "http://127.0.0.1:4444". Unset means no browser is available.
pub static OIDC_CONFUSION_WEBDRIVER_URL: LazyLock<Option<String>> = LazyLock::new(|| {
    env::var("OIDC_CONFUSION_WEBDRIVER_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
});

pub static TIMEOUTS: LazyLock<Timeouts> = LazyLock::new(Timeouts::from_env);

pub static HOSTS: LazyLock<HostConfig> = LazyLock::new(HostConfig::from_env);

/// Wait bounds for every rendezvous and page-settle delay.
///
/// The defaults were tuned against real browser and server stacks; tests
/// typically shrink them to a few milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Page-settle delay and needle search bound.
    pub settle: Duration,
    pub short: Duration,
    pub medium: Duration,
    pub normal: Duration,
    pub long: Duration,
    pub extended: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            short: Duration::from_secs(5),
            medium: Duration::from_secs(10),
            normal: Duration::from_secs(15),
            long: Duration::from_secs(25),
            extended: Duration::from_secs(60),
        }
    }
}

impl Timeouts {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            settle: env_millis("OIDC_CONFUSION_TIMEOUT_SETTLE_MS", defaults.settle),
            short: env_millis("OIDC_CONFUSION_TIMEOUT_SHORT_MS", defaults.short),
            medium: env_millis("OIDC_CONFUSION_TIMEOUT_MEDIUM_MS", defaults.medium),
            normal: env_millis("OIDC_CONFUSION_TIMEOUT_NORMAL_MS", defaults.normal),
            long: env_millis("OIDC_CONFUSION_TIMEOUT_LONG_MS", defaults.long),
            extended: env_millis("OIDC_CONFUSION_TIMEOUT_EXTENDED_MS", defaults.extended),
        }
    }

    /// Every bound set to the same value.
    pub fn uniform(value: Duration) -> Self {
        Self {
            settle: value,
            short: value,
            medium: value,
            normal: value,
            long: value,
            extended: value,
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Public base URLs of the controller and the four actor hosts.
///
/// All URLs are stored without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub controller_uri: String,
    pub honest_op_url: String,
    pub evil_op_url: String,
    pub honest_rp_url: String,
    pub evil_rp_url: String,
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self::new(
            OIDC_CONFUSION_CONTROLLER_URI.as_str(),
            OIDC_CONFUSION_HONEST_OP_URL.as_str(),
            OIDC_CONFUSION_EVIL_OP_URL.as_str(),
            OIDC_CONFUSION_HONEST_RP_URL.as_str(),
            OIDC_CONFUSION_EVIL_RP_URL.as_str(),
        )
    }

    pub fn new(
        controller_uri: &str,
        honest_op_url: &str,
        evil_op_url: &str,
        honest_rp_url: &str,
        evil_rp_url: &str,
    ) -> Self {
        let trim = |s: &str| s.trim_end_matches('/').to_string();
        Self {
            controller_uri: controller_uri.to_string(),
            honest_op_url: trim(honest_op_url),
            evil_op_url: trim(evil_op_url),
            honest_rp_url: trim(honest_rp_url),
            evil_rp_url: trim(evil_rp_url),
        }
    }
}
