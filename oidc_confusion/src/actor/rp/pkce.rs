use async_trait::async_trait;

use crate::actor::errors::ActorError;
use crate::context::keys::params::{
    AUTH_ERROR_FAILS_TEST, FORCE_NO_REDEEM_AUTH_CODE, PKCE_FROM_OTHER_SESSION, PKCE_METHOD_PLAIN,
    PKCE_VERIFIER_EXCLUDED, PKCE_VERIFIER_INVALID, TOKEN_RECEIVAL_FAILS_TEST,
};
use crate::context::keys::{PKCE_FIRST_VERIFIER, PKCE_VERIFIER};
use crate::utils::{gen_random_string, pkce_challenge};
use crate::verdict::Verdict;

use super::server::{AuthResponse, RpScenario, RpServer};

/// Sends an S256 code challenge with every authentication request and a
/// broken or missing verifier with the token request.
pub struct PkceRp;

impl PkceRp {
    /// The verifier sent at the token endpoint, `None` to omit it.
    fn token_verifier(rp: &RpServer) -> Option<String> {
        let env = rp.env();
        let current = env.step.get(PKCE_VERIFIER)?;
        if env.params.bool(PKCE_VERIFIER_EXCLUDED) {
            return None;
        }
        if env.params.bool(PKCE_FROM_OTHER_SESSION) {
            if let Some(first) = env.step.get(PKCE_FIRST_VERIFIER) {
                return Some(first);
            }
        }
        if env.params.bool(PKCE_VERIFIER_INVALID) {
            return Some(corrupt(&current));
        }
        Some(current)
    }
}

/// Swap the last character so the verifier no longer matches.
fn corrupt(verifier: &str) -> String {
    let mut out = verifier.to_string();
    let replacement = if out.ends_with('A') { 'B' } else { 'A' };
    out.pop();
    out.push(replacement);
    out
}

#[async_trait]
impl RpScenario for PkceRp {
    async fn evaluate(&self, rp: &RpServer, response: &AuthResponse) -> Result<Verdict, ActorError> {
        let env = rp.env();
        if response.is_error() {
            env.logger.log("Authentication failed.");
            let fails = env.params.bool(AUTH_ERROR_FAILS_TEST);
            return Ok(if fails { Verdict::Fail } else { Verdict::Pass });
        }

        let first_done = env.step.get(PKCE_FIRST_VERIFIER).is_some();
        let redeem = !env.params.bool(FORCE_NO_REDEEM_AUTH_CODE) || first_done;
        let mut verdict = Verdict::Pass;
        if let Some(code) = response.code().filter(|_| redeem) {
            match rp.redeem_code(code).await? {
                None => env.logger.log("The OP rejected the token request."),
                Some(_) if env.params.bool(TOKEN_RECEIVAL_FAILS_TEST) => {
                    env.logger
                        .log("Tokens were issued despite the manipulated PKCE verifier.");
                    verdict = Verdict::Fail;
                }
                Some(_) => {}
            }
        }

        if !first_done {
            if let Some(verifier) = env.step.get(PKCE_VERIFIER) {
                env.step.insert(PKCE_FIRST_VERIFIER, verifier);
            }
        }
        rp.refresh_authn_request()?;
        Ok(verdict)
    }

    fn authn_request_params(&self, rp: &RpServer) -> Result<Vec<(String, String)>, ActorError> {
        let verifier = gen_random_string(32)?;
        let challenge = pkce_challenge(&verifier);
        rp.env().step.insert(PKCE_VERIFIER, verifier);
        Ok(vec![
            ("code_challenge".to_string(), challenge),
            ("code_challenge_method".to_string(), "S256".to_string()),
        ])
    }

    fn token_request_params(&self, rp: &RpServer) -> Vec<(String, String)> {
        let Some(verifier) = Self::token_verifier(rp) else {
            rp.env().logger.log("Sending the token request without a PKCE verifier.");
            return Vec::new();
        };
        if rp.env().params.bool(PKCE_METHOD_PLAIN) {
            // plain method: the challenge doubles as the verifier
            return vec![
                ("code_challenge_method".to_string(), "plain".to_string()),
                ("code_verifier".to_string(), pkce_challenge(&verifier)),
            ];
        }
        vec![("code_verifier".to_string(), verifier)]
    }
}
