use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::UNTRUSTED_KEY_REQUESTED;
use crate::context::keys::params::{
    FORCE_SUCCESS_URL_FAILS, FORCE_UNTRUSTED_KEY_REQUEST_FAILS, USE_EVIL_NEEDLE,
};
use crate::verdict::Verdict;

use super::driver::{BrowserDriver, DriverFactory};
use super::session::BrowserSession;

/// Points where RP browser scenarios hook into the default login run.
#[async_trait]
pub(crate) trait RpRunHooks: Send + Sync {
    /// Called once the login form was submitted. A verdict ends the run.
    async fn after_login(&self, _session: &BrowserSession) -> Option<Verdict> {
        None
    }

    /// Called on the last page before the needle search. A verdict ends the
    /// run.
    async fn on_final_page(
        &self,
        _session: &BrowserSession,
        _driver: &dyn BrowserDriver,
    ) -> Option<Verdict> {
        None
    }
}

pub(crate) struct NoHooks;

impl RpRunHooks for NoHooks {}

/// Log in at the RP under test with the selected OP identity and judge the
/// page the browser ends up on.
pub(crate) async fn default_run(
    session: &BrowserSession,
    driver: &dyn BrowserDriver,
    hooks: &dyn RpRunHooks,
) -> Result<Verdict, ActorError> {
    let config = session.env.rp_config()?;
    let step = &session.env.step;

    session.log(format!(
        "Opening browser with URL '{}'.",
        config.url_client_target
    ));
    driver.open(&config.url_client_target).await?;
    session.wait_ready(driver).await;

    let script = session.render(&session.rp_login_script()?);
    session.env.logger.log_code_block("Login script:", &script);
    driver.execute_script(&script).await?;
    session.log("Webfinger identity entered into the login form.");

    session.wait_ready(driver).await;
    session.settle().await;
    session.log("Finished login procedure, current state of the browser:");
    session.log_screenshot(driver).await;

    if let Some(verdict) = hooks.after_login(session).await {
        return Ok(verdict);
    }

    let current_url = driver.current_url().await?;
    let url_reached = !config.final_valid_url.is_empty() && config.final_valid_url == current_url;

    if session.env.params.bool(FORCE_SUCCESS_URL_FAILS) && url_reached {
        session.log("Success URL reached although the login should have been rejected.");
        return Ok(Verdict::Fail);
    }
    if session.env.params.bool(FORCE_UNTRUSTED_KEY_REQUEST_FAILS)
        && step.get_or(UNTRUSTED_KEY_REQUESTED, false)
    {
        session.log("The RP fetched keys from the untrusted key endpoint.");
        return Ok(Verdict::Fail);
    }
    if !url_reached {
        session.log(format!(
            "Browser stopped at '{current_url}' instead of the success URL, login was rejected."
        ));
        return Ok(Verdict::Pass);
    }

    if !config.profile_url.is_empty() {
        session.log(format!("Opening profile URL '{}'.", config.profile_url));
        driver.open(&config.profile_url).await?;
        session.wait_ready(driver).await;
        session.settle().await;
        session.log_screenshot(driver).await;
    }

    if let Some(verdict) = hooks.on_final_page(session, driver).await {
        return Ok(verdict);
    }

    let needle = if session.env.params.bool(USE_EVIL_NEEDLE) {
        config.evil_user_needle
    } else {
        config.honest_user_needle
    };
    let needle = session.render(&needle);
    if needle.is_empty() {
        session.log("No user needle configured, result is undetermined.");
        return Ok(Verdict::Undetermined);
    }

    if driver.page_contains(&needle).await? {
        session.log(format!("User needle '{needle}' found on the final page."));
        Ok(Verdict::Fail)
    } else {
        session.log(format!("User needle '{needle}' not found on the final page."));
        Ok(Verdict::Pass)
    }
}

/// Plain login run without scenario hooks.
pub struct DefaultRpBrowser {
    session: Arc<BrowserSession>,
}

impl DefaultRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

#[async_trait]
impl BrowserBehavior for DefaultRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let driver = self.session.fresh_driver().await?;
        default_run(&self.session, driver.as_ref(), &NoHooks).await
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
