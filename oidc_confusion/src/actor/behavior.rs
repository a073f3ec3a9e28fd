use async_trait::async_trait;
use http::StatusCode;

use crate::logger::StepLogger;
use crate::types::RoleSlot;
use crate::verdict::Verdict;

use super::errors::ActorError;
use super::types::{ActorRequest, ActorResponse, Endpoint};

/// Honest or evil counterpart server of a step.
#[async_trait]
pub trait ServerBehavior: Send + Sync + 'static {
    /// Runs once after the instance is registered and before the browser
    /// starts.
    async fn setup(&self) -> Result<(), ActorError> {
        Ok(())
    }

    async fn handle(
        &self,
        endpoint: Endpoint,
        request: ActorRequest,
    ) -> Result<ActorResponse, ActorError>;
}

/// Simulated user agent driving one step.
#[async_trait]
pub trait BrowserBehavior: Send + Sync + 'static {
    async fn run(&self) -> Result<Verdict, ActorError>;

    /// Release driver resources. Must be safe to call more than once.
    async fn quit(&self);
}

/// A server behavior bound to one role slot for the lifetime of a step.
pub struct ActorInstance {
    slot: RoleSlot,
    behavior_id: String,
    behavior: Box<dyn ServerBehavior>,
    logger: StepLogger,
}

impl ActorInstance {
    pub fn new(
        slot: RoleSlot,
        behavior_id: &str,
        behavior: Box<dyn ServerBehavior>,
        logger: StepLogger,
    ) -> Self {
        Self {
            slot,
            behavior_id: behavior_id.to_string(),
            behavior,
            logger,
        }
    }

    pub fn slot(&self) -> RoleSlot {
        self.slot
    }

    pub fn behavior_id(&self) -> &str {
        &self.behavior_id
    }

    pub async fn setup(&self) -> Result<(), ActorError> {
        self.behavior.setup().await
    }

    /// Run the endpoint handler. Request and response are recorded in the
    /// step log; handler errors become OAuth error responses.
    pub async fn handle(&self, endpoint: Endpoint, request: ActorRequest) -> ActorResponse {
        self.logger.log(format!(
            "{} ({}) received {:?} request.",
            self.slot, self.behavior_id, endpoint
        ));
        self.logger.log_http_request(&request);

        let response = match self.behavior.handle(endpoint, request).await {
            Ok(response) => response,
            Err(e) => {
                self.logger
                    .log_error(&format!("{} failed to process request", self.slot), &e);
                error_response(&e)
            }
        };

        self.logger.log_http_response(&response);
        response
    }
}

fn error_response(error: &ActorError) -> ActorResponse {
    match error {
        ActorError::Protocol(msg) => {
            ActorResponse::oauth_error(StatusCode::BAD_REQUEST, "invalid_request", msg)
        }
        ActorError::NotApplicable(msg) => {
            ActorResponse::oauth_error(StatusCode::BAD_REQUEST, "server_error", msg)
        }
        other => ActorResponse::oauth_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            &other.to_string(),
        ),
    }
}
