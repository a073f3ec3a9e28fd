use serde_json::{Map, Value, json};

use crate::context::keys::params::FORCE_TOKEN_HONEST_AUD;

use super::server::{OpScenario, OpServer};

/// Issues ID tokens addressed to the client registered at the honest OP,
/// so a token obtained for one client is presented to another.
pub struct TokenRecipientConfusionOp;

impl OpScenario for TokenRecipientConfusionOp {
    fn adjust_claims(&self, op: &OpServer, claims: &mut Map<String, Value>) {
        if !op.env().params.bool(FORCE_TOKEN_HONEST_AUD) {
            return;
        }
        match op.honest_client() {
            Some(client) => {
                op.env().logger.log(format!(
                    "Addressing id_token to honest client '{}'.",
                    client.client_id
                ));
                claims.insert("aud".to_string(), json!(client.client_id));
            }
            None => op
                .env()
                .logger
                .log("Honest client unknown, keeping the original audience."),
        }
    }
}
