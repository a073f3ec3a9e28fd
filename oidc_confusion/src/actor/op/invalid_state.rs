use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use http::StatusCode;

use crate::actor::errors::ActorError;
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::params::{FORCE_STATE_INVALID, FORCE_STATE_OTHER_SESSION};
use crate::context::keys::{RELEASE_OP, RELOAD_BROWSER};
use crate::utils::gen_random_string;

use super::server::{OpScenario, OpServer};

/// Answers authorization requests with a `state` the RP did not issue for
/// the current session: either a random value, or the state of an earlier
/// login attempt in another browser session.
pub struct InvalidStateOp {
    first_state: Mutex<Option<String>>,
}

impl InvalidStateOp {
    pub fn new() -> Self {
        Self {
            first_state: Mutex::new(None),
        }
    }

    fn stored_state(&self) -> Option<String> {
        self.first_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hold the first login attempt until the browser has started the second
    /// one, then break it off.
    async fn capture_first(
        &self,
        op: &OpServer,
        request: &ActorRequest,
    ) -> Result<ActorResponse, ActorError> {
        let env = op.env();
        let state = request.param("state").unwrap_or_default().to_string();
        env.logger
            .log(format!("Storing state '{state}' of the first Authentication Request."));
        *self
            .first_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(state);

        let release = env.step.barrier(RELEASE_OP);
        env.step.barrier(RELOAD_BROWSER).complete(());
        if let Err(e) = release.wait(env.timeouts.normal).await {
            env.logger.log_error("Waiting for the browser failed", &e);
        }
        Ok(ActorResponse::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "First authentication attempt aborted.",
        ))
    }
}

impl Default for InvalidStateOp {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of `request` with every `state` parameter replaced.
fn with_state(request: &ActorRequest, state: &str) -> ActorRequest {
    let mut modified = request.clone();
    for (name, value) in modified.query.iter_mut().chain(modified.form.iter_mut()) {
        if name == "state" {
            *value = state.to_string();
        }
    }
    modified
}

#[async_trait]
impl OpScenario for InvalidStateOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        if endpoint != Endpoint::Authorization {
            return Ok(None);
        }
        let params = &op.env().params;
        if params.bool(FORCE_STATE_INVALID) {
            let state = gen_random_string(16)?;
            op.env()
                .logger
                .log(format!("Replacing state with random value '{state}'."));
            return op.authorization(&with_state(request, &state)).map(Some);
        }
        if params.bool(FORCE_STATE_OTHER_SESSION) {
            return match self.stored_state() {
                None => self.capture_first(op, request).await.map(Some),
                Some(state) => {
                    op.env()
                        .logger
                        .log(format!("Replacing state with '{state}' of the first session."));
                    op.authorization(&with_state(request, &state)).map(Some)
                }
            };
        }
        Ok(None)
    }
}
