use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::{HONEST_AUTH_SEEN, STEP_RESULT};
use crate::types::Role;
use crate::verdict::Verdict;

use super::driver::{BrowserDriver, DriverFactory};
use super::session::BrowserSession;

/// Starts a login with the honest OP to capture its authorization request,
/// then restarts it with the evil OP and waits for the evil token endpoint
/// to report what it received.
pub struct IdpConfusionRpBrowser {
    session: Arc<BrowserSession>,
}

impl IdpConfusionRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }

    async fn start_login(&self, driver: &dyn BrowserDriver, role: Role) -> Result<(), ActorError> {
        let session = &self.session;
        let config = session.env.rp_config()?;
        session.select_input_op(role);

        driver.open(&config.url_client_target).await?;
        session.wait_ready(driver).await;
        let script = session.render(&session.rp_login_script()?);
        session.execute_logged(driver, &script).await;
        session.log(format!("Start authentication for {role} OP."));
        Ok(())
    }
}

#[async_trait]
impl BrowserBehavior for IdpConfusionRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let step = &session.env.step;
        let timeouts = session.env.timeouts;
        let honest_seen = step.barrier(HONEST_AUTH_SEEN);
        let result = step.barrier(STEP_RESULT);

        let driver = session.fresh_driver().await?;
        self.start_login(driver.as_ref(), Role::Honest).await?;

        if let Err(e) = honest_seen.wait(timeouts.extended).await {
            session.log(format!("Honest OP never received the authorization request: {e}"));
            session.log_screenshot(driver.as_ref()).await;
            return Ok(Verdict::Undetermined);
        }

        self.start_login(driver.as_ref(), Role::Evil).await?;

        match result.wait(timeouts.extended).await {
            Ok(verdict) => {
                session.log_screenshot(driver.as_ref()).await;
                Ok(verdict)
            }
            Err(e) => {
                session.log(format!("No token request reached the evil OP: {e}"));
                session.log_screenshot(driver.as_ref()).await;
                Ok(Verdict::Undetermined)
            }
        }
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
