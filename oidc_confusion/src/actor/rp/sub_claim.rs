use async_trait::async_trait;
use serde_json::{Value, json};

use crate::actor::errors::ActorError;
use crate::actor::keys;
use crate::context::keys::STORED_USER1_SUB;
use crate::context::keys::params::{
    AUTH_ERROR_FAILS_TEST, CLAIMSREQ_ARRAY_SUB1_SUB2, CLAIMSREQ_ARRAY_SUB2_SUB1,
    CLAIMSREQ_ARRAY_USER1_SUB, CLAIMSREQ_USER1_SUB, ID_TOKEN_HINT_USER1,
};
use crate::verdict::Verdict;

use super::server::{AuthResponse, RpScenario, RpServer};

/// Template variables the browser fills in once the subjects are known.
pub(crate) const USER1_SUB_VAR: &str = "placeholder_user1_sub";
pub(crate) const USER2_SUB_VAR: &str = "placeholder_user2_sub";
pub(crate) const USER1_ID_TOKEN_VAR: &str = "placeholder_user1_idtoken";

fn placeholder(name: &str) -> String {
    format!("${{{name}}}")
}

/// Asks for the first user's subject through the `claims` request parameter
/// or `id_token_hint` while the second user logs in.
pub struct SubClaimSpoofingRp;

impl SubClaimSpoofingRp {
    fn sub_requirement(rp: &RpServer) -> Option<Value> {
        let params = &rp.env().params;
        let user1 = placeholder(USER1_SUB_VAR);
        let user2 = placeholder(USER2_SUB_VAR);
        if params.bool(CLAIMSREQ_USER1_SUB) {
            return Some(json!({ "essential": true, "value": user1 }));
        }
        let values = if params.bool(CLAIMSREQ_ARRAY_USER1_SUB) {
            vec![user1]
        } else if params.bool(CLAIMSREQ_ARRAY_SUB1_SUB2) {
            vec![user1, user2]
        } else if params.bool(CLAIMSREQ_ARRAY_SUB2_SUB1) {
            vec![user2, user1]
        } else {
            return None;
        };
        Some(json!({ "essential": true, "values": values }))
    }
}

#[async_trait]
impl RpScenario for SubClaimSpoofingRp {
    async fn evaluate(&self, rp: &RpServer, response: &AuthResponse) -> Result<Verdict, ActorError> {
        let env = rp.env();
        if response.is_error() {
            let fails = env.params.bool(AUTH_ERROR_FAILS_TEST);
            return Ok(if fails { Verdict::Fail } else { Verdict::Pass });
        }
        let id_token = match response.code() {
            Some(code) => rp.redeem_code(code).await?.and_then(|tokens| tokens.id_token),
            None => response.param("id_token").map(str::to_string),
        };
        let Some(id_token) = id_token else {
            env.logger.log("No ID token received.");
            return Ok(Verdict::Pass);
        };
        rp.store_id_token(&id_token, &env.op_config()?);

        let sub = match keys::decode_claims_json(&id_token) {
            Ok(claims) => claims["sub"].as_str().unwrap_or_default().to_string(),
            Err(e) => {
                env.logger
                    .log_code_block("Invalid ID token received:", id_token.clone());
                env.logger.log_error("Decoding failed", &e);
                return Ok(Verdict::Undetermined);
            }
        };
        let Some(user1_sub) = env.step.get(STORED_USER1_SUB).filter(|s| !s.is_empty()) else {
            env.logger.log("Reference value for sub claim not found.");
            return Ok(Verdict::Undetermined);
        };
        if sub == user1_sub {
            env.logger.log(format!(
                "ID token contains the sub claim of the first user: {user1_sub}."
            ));
            return Ok(Verdict::Fail);
        }

        let claims_supported = rp.metadata()?.claims_parameter_supported == Some(true);
        env.logger.log(format!(
            "First user's sub ({user1_sub}) not in the ID token, which carries '{sub}'. \
             Claims parameter supported by the OP: {claims_supported}."
        ));
        let params = &env.params;
        if params.bool(CLAIMSREQ_ARRAY_SUB1_SUB2) || params.bool(CLAIMSREQ_ARRAY_SUB2_SUB1) {
            return Ok(Verdict::Pass);
        }
        if claims_supported || params.bool(ID_TOKEN_HINT_USER1) {
            env.logger.log(
                "The OP must not issue an ID token for a different user when id_token_hint \
                 or the claims parameter names one.",
            );
            return Ok(Verdict::Undetermined);
        }
        Ok(Verdict::Pass)
    }

    fn authn_request_params(&self, rp: &RpServer) -> Result<Vec<(String, String)>, ActorError> {
        let mut params = Vec::new();
        if let Some(sub) = Self::sub_requirement(rp) {
            let claims = json!({ "id_token": { "sub": sub } });
            params.push(("claims".to_string(), claims.to_string()));
        }
        if rp.env().params.bool(ID_TOKEN_HINT_USER1) {
            params.push((
                "id_token_hint".to_string(),
                placeholder(USER1_ID_TOKEN_VAR),
            ));
        }
        Ok(params)
    }
}
