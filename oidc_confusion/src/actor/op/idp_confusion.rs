use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use http::StatusCode;

use crate::actor::errors::ActorError;
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::{
    AUTH_REQ_HONEST_NONCE, AUTH_REQ_HONEST_STATE, HONEST_AUTH_SEEN, STEP_RESULT,
};
use crate::types::Role;
use crate::verdict::Verdict;

use super::server::{OpScenario, OpServer};

/// IdP mix-up: the evil provider bounces the browser to the honest one and
/// waits for the honest code at its own token endpoint.
pub struct IdpConfusionOp {
    first_request: AtomicBool,
}

impl IdpConfusionOp {
    pub fn new() -> Self {
        Self {
            first_request: AtomicBool::new(true),
        }
    }

    fn honest_authorization(
        &self,
        op: &OpServer,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        if !self.first_request.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        if request.param("response_type").is_none() || request.param("redirect_uri").is_none() {
            op.env().logger.log("Failed to parse Authorization Request.");
            return Ok(Some(ActorResponse::new(StatusCode::BAD_REQUEST)));
        }
        let step = &op.env().step;
        if let Some(state) = request.param("state") {
            step.insert(AUTH_REQ_HONEST_STATE, state.to_string());
        }
        if let Some(nonce) = request.param("nonce") {
            step.insert(AUTH_REQ_HONEST_NONCE, nonce.to_string());
        }
        op.env().logger.log("State and Nonce from Honest OP saved.");
        step.barrier(HONEST_AUTH_SEEN).complete(());
        Ok(Some(ActorResponse::empty_ok()))
    }

    fn evil_authorization(&self, op: &OpServer, request: &ActorRequest) -> ActorResponse {
        let honest_nonce = op.env().step.get(AUTH_REQ_HONEST_NONCE);
        let pairs = request.query.iter().map(|(k, v)| match &honest_nonce {
            Some(nonce) if k == "nonce" => (k.as_str(), nonce.as_str()),
            _ => (k.as_str(), v.as_str()),
        });
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let target = format!(
            "{}?{}",
            op.endpoint_url(Role::Honest, Endpoint::Authorization),
            query
        );
        op.env().logger.log("Redirecting browser to honest OP.");
        ActorResponse::redirect(&target)
    }
}

#[async_trait]
impl OpScenario for IdpConfusionOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        match (endpoint, op.role()) {
            (Endpoint::Authorization, Role::Honest) => self.honest_authorization(op, request),
            (Endpoint::Authorization, Role::Evil) => Ok(Some(self.evil_authorization(op, request))),
            (Endpoint::Token, _) => {
                let result = op.env().step.barrier(STEP_RESULT);
                match op.code_replay_verdict(request) {
                    Ok(verdict) => {
                        result.complete(verdict);
                        Ok(Some(ActorResponse::empty_ok()))
                    }
                    Err(e) => {
                        op.env().logger.log_error("Invalid token request", &e);
                        result.complete(Verdict::Undetermined);
                        Ok(Some(ActorResponse::oauth_error(
                            StatusCode::BAD_REQUEST,
                            "invalid_request",
                            &e.to_string(),
                        )))
                    }
                }
            }
            _ => Ok(None),
        }
    }
}
