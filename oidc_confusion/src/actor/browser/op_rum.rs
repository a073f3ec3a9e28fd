use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::params::SCRIPT_EXEC_EXCEPTION_FAILS_TEST;
use crate::context::keys::{
    BROWSER_FINISHED, LAST_BROWSER_URL, REDIRECT_URI_MANIPULATOR, RP_HONEST_REDIRECT_URI,
    RP_RESULT,
};
use crate::types::Role;
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::op_login::{UserLogin, run_user_auth};
use super::session::BrowserSession;

/// Logs the first user in through an RP that sent a manipulated
/// `redirect_uri`. A code or token that lands on the unreachable
/// manipulated URI is handed to the honest RP's real callback.
pub struct OpRumBrowser {
    session: Arc<BrowserSession>,
}

impl OpRumBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

/// Start of the query or fragment of `url` when it carries an
/// authentication response.
fn response_start(url: &str) -> Option<usize> {
    let start = url.find(['?', '#'])?;
    let carries_response = ["code=", "token=", "id_token="].iter().any(|name| {
        url.match_indices(name)
            .any(|(i, _)| i > 0 && matches!(url.as_bytes()[i - 1], b'?' | b'&' | b'#'))
    });
    carries_response.then_some(start)
}

#[async_trait]
impl BrowserBehavior for OpRumBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let step = &session.env.step;
        let config = session.env.op_config()?;
        let on_script_error = session
            .env
            .params
            .bool(SCRIPT_EXEC_EXCEPTION_FAILS_TEST)
            .then_some(Verdict::Fail);

        let driver = session.fresh_driver().await?;
        let verdict = run_user_auth(
            session,
            driver.as_ref(),
            UserLogin {
                rp: Role::Honest,
                username: &config.user1_name,
                password: &config.user1_pass,
                on_script_error,
                on_timeout: Verdict::Pass,
            },
        )
        .await?;
        let answered = step.get(RP_RESULT).is_some_and(|result| result.is_settled());
        if answered || verdict != Verdict::Pass {
            return Ok(verdict);
        }

        let final_url = step.get(LAST_BROWSER_URL).unwrap_or_default();
        if step.get(REDIRECT_URI_MANIPULATOR).is_some() {
            session.log("Redirect to manipulated redirect_uri detected.");
        }
        let Some(start) = response_start(&final_url) else {
            session.log("Authentication failed, assuming test passed.");
            return Ok(Verdict::Pass);
        };

        session.log("Tokens or code found in the manipulated callback URI.");
        let forward = format!(
            "{}{}",
            step.require(RP_HONEST_REDIRECT_URI)?,
            &final_url[start..]
        );
        let finished = step.fresh_barrier(BROWSER_FINISHED);
        let result = step.fresh_barrier(RP_RESULT);
        session.log(format!("Forwarding the response to '{forward}'."));
        driver.open(&forward).await?;
        session.wait_ready(driver.as_ref()).await;
        step.insert(LAST_BROWSER_URL, forward);
        finished.complete(());

        match result.wait(session.env.timeouts.medium).await {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                session.log(format!("No result from the RP: {e}"));
                Ok(Verdict::Pass)
            }
        }
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
