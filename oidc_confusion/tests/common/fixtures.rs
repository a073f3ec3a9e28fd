//! Shared harness setup for integration tests.

use std::time::Duration;

use oidc_confusion::{
    BehaviorCatalog, Harness, HarnessOptions, HostConfig, OpTestConfig, RpTestConfig, RunnerConfig,
    Timeouts,
};

use super::in_process_browser::InProcessBrowser;

pub const CONTROLLER_URI: &str = "http://controller.test/";

pub fn test_hosts() -> HostConfig {
    HostConfig::new(
        CONTROLLER_URI,
        "http://honest-op.test",
        "http://evil-op.test",
        "http://honest-rp.test",
        "http://evil-rp.test",
    )
}

/// Short bounds; local round trips finish far below them.
pub fn test_timeouts() -> Timeouts {
    Timeouts {
        settle: Duration::from_millis(20),
        short: Duration::from_secs(2),
        medium: Duration::from_secs(3),
        normal: Duration::from_secs(3),
        long: Duration::from_secs(5),
        extended: Duration::from_secs(10),
    }
}

/// Harness with the grant check enabled, driven by the in-process browser.
pub fn test_harness() -> Harness {
    test_harness_with(BehaviorCatalog::builtin())
}

/// Same as [`test_harness`] with the behaviors of `catalog`.
pub fn test_harness_with(catalog: BehaviorCatalog) -> Harness {
    let browser = InProcessBrowser::factory();
    let harness = Harness::new(HarnessOptions {
        runner: RunnerConfig {
            hosts: test_hosts(),
            grant_path: "/.professos".to_string(),
            skip_grant_check: false,
            timeouts: test_timeouts(),
        },
        catalog,
        drivers: browser.clone(),
        object_lifetime: Duration::from_secs(300),
        test_id_length: 10,
    })
    .expect("Failed to create harness");
    browser.attach(harness.clone());
    harness
}

/// OP test configuration for the mock OP at `base`. The login script is the
/// in-process browser's `login:` command.
pub fn op_config(base: &str) -> OpTestConfig {
    OpTestConfig {
        url_op_target: base.to_string(),
        user1_name: "alice".to_string(),
        user1_pass: "alice-pw".to_string(),
        user2_name: "bob".to_string(),
        user2_pass: "bob-pw".to_string(),
        login_script: "login:${current_user_username}".to_string(),
        ..Default::default()
    }
}

/// RP test configuration for the mock RP at `base`. The provider identity is
/// typed in with the in-process browser's `login:` command.
pub fn rp_config(base: &str) -> RpTestConfig {
    RpTestConfig {
        url_client_target: format!("{base}/login"),
        login_script: "login:${browser_input_op_url}".to_string(),
        final_valid_url: format!("{base}/welcome"),
        honest_user_needle: "Honest User".to_string(),
        evil_user_needle: "Evil User".to_string(),
        ..Default::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("oidc_confusion=debug")
        .with_test_writer()
        .try_init();
}
