use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use crate::actor::errors::ActorError;
use crate::actor::keys::{self, KeyKind};
use crate::actor::types::{ActorRequest, ActorResponse, Endpoint};
use crate::context::keys::params::{
    KEY_FRESH_KID, KEY_JKU_AS_KID, KEY_SPOOFED_JWK, KEY_SPOOFED_X5C,
};
use crate::context::keys::{MULTI_PART_FINISHED, UNTRUSTED_KEY_REQUESTED};
use crate::utils::gen_alphanumeric;

use super::server::{OpScenario, OpServer};

/// Number of token issuances of one full multi-part run.
pub const KEY_CONFUSION_ITERATIONS: usize = 3;

/// Single-token variants that smuggle the untrusted key through the JOSE
/// header instead of the `jku` rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderVariant {
    SpoofedJwk,
    SpoofedX5c,
    FreshKid,
    JkuAsKid,
}

impl HeaderVariant {
    fn selected(op: &OpServer) -> Option<Self> {
        let params = &op.env().params;
        [
            (KEY_SPOOFED_JWK, Self::SpoofedJwk),
            (KEY_SPOOFED_X5C, Self::SpoofedX5c),
            (KEY_FRESH_KID, Self::FreshKid),
            (KEY_JKU_AS_KID, Self::JkuAsKid),
        ]
        .into_iter()
        .find(|(name, _)| params.bool(name))
        .map(|(_, variant)| variant)
    }
}

/// Issues ID tokens signed with a key the RP has never seen and points the
/// `jku` header at the untrusted-key endpoint. The key set served there
/// changes with every issued token.
pub struct KeyConfusionOp {
    issued: AtomicUsize,
    served_keys: Mutex<Option<Value>>,
}

impl KeyConfusionOp {
    pub fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            served_keys: Mutex::new(None),
        }
    }

    /// Number of ID tokens issued so far by this instance.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Key set currently served at the untrusted-key endpoint.
    pub fn served_keys(&self) -> Option<Value> {
        self.served_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn serve(&self, key_set: Value) {
        *self
            .served_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(key_set);
    }

    fn key_set_for(iteration: usize, op: &OpServer) -> Result<Value, ActorError> {
        let untrusted = keys::signing_key(KeyKind::Untrusted)?;
        let trusted = keys::signing_key(KeyKind::from(op.role()))?;
        Ok(match iteration {
            0 => keys::jwk_set(&[untrusted]),
            1 => keys::jwk_set(&[untrusted, trusted]),
            _ => keys::jwk_set(&[trusted, untrusted]),
        })
    }

    fn sign_rotating(
        &self,
        op: &OpServer,
        iteration: usize,
        claims: &Value,
    ) -> Result<String, ActorError> {
        let iteration = iteration.min(KEY_CONFUSION_ITERATIONS - 1);
        op.env()
            .logger
            .log(format!("Key confusion iteration {}.", iteration + 1));

        self.serve(Self::key_set_for(iteration, op)?);
        if iteration == KEY_CONFUSION_ITERATIONS - 1 {
            op.env().step.insert(MULTI_PART_FINISHED, true);
        }

        let untrusted = keys::signing_key(KeyKind::Untrusted)?;
        let mut header = untrusted.header();
        header.jku = Some(op.endpoint_url(op.role(), Endpoint::UntrustedKey));
        untrusted.sign(&header, claims)
    }

    fn sign_variant(
        &self,
        op: &OpServer,
        variant: HeaderVariant,
        claims: &Value,
    ) -> Result<String, ActorError> {
        let untrusted = keys::signing_key(KeyKind::Untrusted)?;
        let mut header = json!({ "alg": "EdDSA", "typ": "JWT", "kid": untrusted.kid() });
        match variant {
            HeaderVariant::SpoofedJwk => {
                op.env().logger.log("Embedding the signing key as jwk header.");
                header["jwk"] = untrusted.public_jwk();
            }
            HeaderVariant::SpoofedX5c => {
                op.env()
                    .logger
                    .log("Embedding a self-signed certificate as x5c header.");
                header["x5c"] = json!([STANDARD.encode(untrusted.certificate_der())]);
            }
            HeaderVariant::FreshKid => {
                let kid = gen_alphanumeric(12)?;
                op.env()
                    .logger
                    .log(format!("Using fresh key ID '{kid}' in token and key set."));
                header["kid"] = json!(kid);
                header["jwk"] = untrusted.public_jwk_with_kid(&kid);
                self.serve(json!({ "keys": [untrusted.public_jwk_with_kid(&kid)] }));
            }
            HeaderVariant::JkuAsKid => {
                let url = op.endpoint_url(op.role(), Endpoint::UntrustedKey);
                op.env()
                    .logger
                    .log(format!("Using untrusted key URL '{url}' as key ID."));
                header["kid"] = json!(url);
                self.serve(keys::jwk_set(&[untrusted]));
            }
        }
        op.env().step.insert(MULTI_PART_FINISHED, true);
        untrusted.sign_with_header(&header, claims)
    }
}

impl Default for KeyConfusionOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OpScenario for KeyConfusionOp {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        _request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        if endpoint != Endpoint::UntrustedKey {
            return Ok(None);
        }
        op.env().step.insert(UNTRUSTED_KEY_REQUESTED, true);
        op.env().logger.log("Untrusted key requested");
        let served = self
            .served_keys()
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(Some(ActorResponse::ok_json(&served)))
    }

    fn sign_id_token(&self, op: &OpServer, claims: &Value) -> Result<Option<String>, ActorError> {
        let iteration = self.issued.fetch_add(1, Ordering::SeqCst);
        match HeaderVariant::selected(op) {
            Some(variant) => self.sign_variant(op, variant, claims).map(Some),
            None => self.sign_rotating(op, iteration, claims).map(Some),
        }
    }
}
