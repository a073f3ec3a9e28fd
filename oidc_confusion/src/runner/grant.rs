//! Permission check run against the target before every step.

use url::Url;

use crate::context::StepContext;
use crate::context::keys::params::GRANT_NOT_NEEDED;
use crate::logger::StepLogger;
use crate::utils::{UtilError, normalize_uri};

use super::config::RunnerConfig;

/// Grant resource URL for `target`: its origin with the path replaced by
/// `grant_path` and no query.
pub fn grant_url(target: &str, grant_path: &str) -> Result<String, UtilError> {
    let normalized = normalize_uri(target)?;
    let mut url = Url::parse(&normalized).map_err(|e| UtilError::Uri(format!("{target}: {e}")))?;
    url.set_path(grant_path);
    url.set_query(None);
    Ok(url.to_string())
}

/// Whether the target allows this controller to run tests against it.
///
/// The grant resource must answer 200 with a body naming the controller
/// URI. Every other outcome denies the test.
pub async fn test_granted(
    config: &RunnerConfig,
    target: &str,
    step: &StepContext,
    logger: &StepLogger,
) -> bool {
    if config.skip_grant_check || step.param_bool(GRANT_NOT_NEEDED) {
        logger.log("Permission to perform test on remote server not evaluated.");
        return true;
    }

    let url = match grant_url(target, &config.grant_path) {
        Ok(url) => url,
        Err(e) => {
            logger.log_error("Invalid target URL", &e);
            return false;
        }
    };
    logger.log(format!("Obtaining permission to perform test from url '{url}'."));

    let client = match reqwest::Client::builder()
        .timeout(config.timeouts.long)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            logger.log_error("Failed to create HTTP client", &e);
            return false;
        }
    };
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            logger.log_error("Failed to retrieve grant token from target", &e);
            return false;
        }
    };
    if response.status() != reqwest::StatusCode::OK {
        logger.log(format!("No valid response received ({}).", response.status()));
        return false;
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            logger.log_error("Failed to read grant token", &e);
            return false;
        }
    };
    let token = body.trim();
    if token.is_empty() {
        logger.log("No valid response received (empty body).");
        return false;
    }

    match (normalize_uri(token), normalize_uri(&config.hosts.controller_uri)) {
        (Ok(granted), Ok(controller)) if granted == controller => true,
        (Ok(granted), Ok(_)) => {
            logger.log(format!("Grant token '{granted}' does not name this controller."));
            false
        }
        (Err(e), _) | (_, Err(e)) => {
            logger.log_error("Grant token is not a valid URI", &e);
            false
        }
    }
}
