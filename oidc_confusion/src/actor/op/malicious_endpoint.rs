use async_trait::async_trait;

use crate::actor::errors::ActorError;
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::{HONEST_ACCESS_TOKEN, HONEST_CODE, TOKEN_LEAK, USERINFO_LEAK};
use crate::verdict::{Verdict, worst};

use super::server::{OpScenario, OpServer};

/// Evil provider that checks whether the RP leaks honest credentials to
/// its token or userinfo endpoint. Requests are answered normally.
pub struct MaliciousEndpointOp;

impl MaliciousEndpointOp {
    fn token_leak(&self, op: &OpServer, request: &ActorRequest) -> Option<Verdict> {
        let logger = &op.env().logger;
        let client_id = request.client_id();
        let code = match request.param("grant_type") {
            Some("authorization_code") => request.param("code"),
            _ => None,
        };
        let honest_client_id = op.honest_client().map(|c| c.client_id);
        let honest_code = op.env().step.get(HONEST_CODE);

        let mut result = None;
        if client_id.is_some() && client_id == honest_client_id {
            logger.log("Detected Honest ClientID in Evil OP.");
            result = Some(Verdict::Fail);
        } else if let Some(id) = &client_id {
            logger.log(format!("Detected unknown ClientID {id} in Evil OP."));
            result = Some(Verdict::Undetermined);
        }
        if code.is_some() && code == honest_code.as_deref() {
            logger.log("Detected Honest Code in Evil OP.");
            result = Some(Verdict::Fail);
        } else if code.is_some() {
            logger.log("Detected unknown Code in Evil OP.");
            result = worst(Some(Verdict::Undetermined), result);
        }
        result
    }

    fn userinfo_leak(&self, op: &OpServer, request: &ActorRequest) -> Option<Verdict> {
        let access_token = request.bearer_token()?;
        if op.env().step.get(HONEST_ACCESS_TOKEN).as_ref() == Some(&access_token) {
            op.env().logger.log("Detected Honest AccessToken in Evil OP.");
            Some(Verdict::Fail)
        } else {
            op.env().logger.log("Detected unknown AccessToken in Evil OP.");
            Some(Verdict::Undetermined)
        }
    }
}

#[async_trait]
impl OpScenario for MaliciousEndpointOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        match endpoint {
            Endpoint::Token => {
                let verdict = self.token_leak(op, request);
                op.env().step.barrier(TOKEN_LEAK).complete(verdict);
            }
            Endpoint::UserInfo => {
                if let Some(verdict) = self.userinfo_leak(op, request) {
                    op.env().step.barrier(USERINFO_LEAK).complete(Some(verdict));
                }
            }
            _ => {}
        }
        Ok(None)
    }
}
