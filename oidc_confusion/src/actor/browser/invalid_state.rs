use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::{RELEASE_OP, RELOAD_BROWSER};
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::rp_default::{NoHooks, default_run};
use super::session::BrowserSession;

/// Starts a first login that the OP holds back, then logs in again from a
/// fresh browser. The OP answers the second login with the state of the
/// first one.
pub struct InvalidStateRpBrowser {
    session: Arc<BrowserSession>,
}

impl InvalidStateRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }

    async fn both_logins(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let config = session.env.rp_config()?;
        let reload = session.env.step.barrier(RELOAD_BROWSER);

        let first = session.fresh_driver().await?;
        session.log(format!(
            "Opening first browser with URL '{}'.",
            config.url_client_target
        ));
        first.open(&config.url_client_target).await?;
        session.wait_ready(first.as_ref()).await;
        let script = session.render(&session.rp_login_script()?);
        session.execute_logged(first.as_ref(), &script).await;

        if let Err(e) = reload.wait(session.env.timeouts.normal).await {
            session.log(format!("First authorization request never reached the OP: {e}"));
            return Ok(Verdict::Undetermined);
        }

        session.log("Starting second login in a fresh browser.");
        let second = session.fresh_driver().await?;
        default_run(session, second.as_ref(), &NoHooks).await
    }
}

#[async_trait]
impl BrowserBehavior for InvalidStateRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let release = self.session.env.step.barrier(RELEASE_OP);
        let result = self.both_logins().await;
        release.complete(());
        result
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
