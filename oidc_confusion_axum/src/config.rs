//! Central configuration for the oidc_confusion_axum crate

use std::sync::LazyLock;

/// Mount point of the control API.
/// Default: "/api"
pub static OIDC_CONFUSION_API_PREFIX: LazyLock<String> = LazyLock::new(|| {
    std::env::var("OIDC_CONFUSION_API_PREFIX").unwrap_or_else(|_| "/api".to_string())
});

/// Largest request body handed to an actor.
/// Default: 1 MiB
pub static OIDC_CONFUSION_MAX_BODY_BYTES: LazyLock<usize> = LazyLock::new(|| {
    parse_body_limit(std::env::var("OIDC_CONFUSION_MAX_BODY_BYTES").ok().as_deref())
});

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

fn parse_body_limit(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_MAX_BODY_BYTES)
}
