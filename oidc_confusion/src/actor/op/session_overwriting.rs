use async_trait::async_trait;
use http::StatusCode;

use crate::actor::errors::ActorError;
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::{FIRST_AUTH_CLAIMED, HONEST_AUTH_SEEN, SECOND_AUTH_SEEN, STEP_RESULT};
use crate::verdict::Verdict;

use super::server::{OpScenario, OpServer};

/// Holds back the first authorization response until a second
/// authorization request arrives in the same browser session.
pub struct SessionOverwritingOp;

impl SessionOverwritingOp {
    async fn first_authorization(
        &self,
        op: &OpServer,
        request: &ActorRequest,
    ) -> Result<ActorResponse, ActorError> {
        let env = op.env();
        let second = env.step.barrier(SECOND_AUTH_SEEN);
        env.step.barrier(HONEST_AUTH_SEEN).complete(());

        match second.wait(env.timeouts.normal).await {
            Ok(()) => env.logger.log(format!(
                "Start processing Authentication Request in {}-OP",
                op.role()
            )),
            Err(e) => env
                .logger
                .log_error("Waiting to release first Authentication Response failed", &e),
        }
        op.authorization(request)
    }
}

#[async_trait]
impl OpScenario for SessionOverwritingOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        match endpoint {
            Endpoint::Authorization => {
                op.env()
                    .logger
                    .log(format!("Authentication requested at {}-OP.", op.role()));
                if op.env().step.insert_if_absent(FIRST_AUTH_CLAIMED, true) {
                    return self.first_authorization(op, request).await.map(Some);
                }
                op.env().logger.log("Releasing delayed AuthResponse");
                op.env().step.barrier(SECOND_AUTH_SEEN).complete(());
                Ok(Some(ActorResponse::no_content()))
            }
            Endpoint::Token => {
                let verdict = match op.code_replay_verdict(request) {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        op.env().logger.log_error("Invalid token request", &e);
                        Verdict::Undetermined
                    }
                };
                op.env().step.barrier(STEP_RESULT).complete(verdict);
                Ok(Some(ActorResponse::oauth_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    "Token request rejected",
                )))
            }
            _ => Ok(None),
        }
    }
}
