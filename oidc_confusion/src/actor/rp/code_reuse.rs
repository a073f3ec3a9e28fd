use async_trait::async_trait;

use crate::actor::errors::ActorError;
use crate::context::keys::STORED_AUTH_CODE;
use crate::context::keys::params::{FORCE_NO_REDEEM_AUTH_CODE, TOKEN_RECEIVAL_FAILS_TEST};
use crate::verdict::Verdict;

use super::server::{AuthResponse, RpScenario, RpServer, matching_user};

/// Keeps the first authorization code it receives and tries to redeem it
/// again on the next callback.
pub struct CodeReuseRp;

#[async_trait]
impl RpScenario for CodeReuseRp {
    async fn evaluate(&self, rp: &RpServer, response: &AuthResponse) -> Result<Verdict, ActorError> {
        let env = rp.env();
        if response.is_error() {
            env.logger
                .log("Authentication failed, the code reuse check cannot run.");
            return Ok(Verdict::Undetermined);
        }

        let Some(stored) = env.step.get(STORED_AUTH_CODE) else {
            let Some(code) = response.code() else {
                env.logger.log("No authorization code received.");
                return Ok(Verdict::Undetermined);
            };
            env.step.insert(STORED_AUTH_CODE, code.to_string());
            if !env.params.bool(FORCE_NO_REDEEM_AUTH_CODE) && rp.redeem_code(code).await?.is_none() {
                return Ok(Verdict::Undetermined);
            }
            return Ok(Verdict::Pass);
        };

        env.logger
            .log(format!("Redeeming the stored code '{stored}' a second time."));
        let Some(tokens) = rp.redeem_code(&stored).await? else {
            env.logger.log("The OP rejected the reused code.");
            return Ok(Verdict::Pass);
        };
        if env.params.bool(TOKEN_RECEIVAL_FAILS_TEST) {
            env.logger.log("Tokens were issued for a reused code.");
            return Ok(Verdict::Fail);
        }

        let config = env.op_config()?;
        let userinfo = rp.request_userinfo(&tokens.access_token).await?;
        let user = userinfo
            .as_ref()
            .and_then(|info| matching_user(info, &[&config.user1_name, &config.user2_name]));
        match user {
            Some(user) if user == config.user1_name => {
                env.logger
                    .log("Reused code yields the first user's identity.");
                Ok(Verdict::Fail)
            }
            _ => Ok(Verdict::Pass),
        }
    }
}
