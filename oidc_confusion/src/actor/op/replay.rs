use serde_json::{Map, Value, json};

use crate::context::keys::params;
use crate::utils::gen_random_string;

use super::server::{OpScenario, OpServer};

/// Provider that strips or swaps the nonce of issued ID tokens.
pub struct ReplayOp;

impl OpScenario for ReplayOp {
    fn adjust_claims(&self, op: &OpServer, claims: &mut Map<String, Value>) {
        let params = &op.env().params;
        if params.bool(params::FORCE_TOKEN_NONCE_EXCL) {
            op.env().logger.log("Removing nonce from id_token.");
            claims.remove("nonce");
        } else if params.bool(params::FORCE_TOKEN_NONCE_INVALID) {
            match gen_random_string(16) {
                Ok(nonce) => {
                    op.env().logger.log("Replacing nonce with random value.");
                    claims.insert("nonce".to_string(), json!(nonce));
                }
                Err(e) => op.env().logger.log_error("Failed to generate nonce", &e),
            }
        }
    }
}
