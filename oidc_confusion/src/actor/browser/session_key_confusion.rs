use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::params::FORCE_SUCCESS_URL_FAILS;
use crate::types::Role;
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::session::BrowserSession;
use super::session_overwriting::second_login;

/// Starts a login with the evil OP and, while the evil OP holds its
/// response, a second login with the honest OP in the same browser
/// session. The first browser then receives the evil response into the
/// session the RP now associates with the honest OP.
pub struct SessionKeyConfusionRpBrowser {
    session: Arc<BrowserSession>,
}

impl SessionKeyConfusionRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

#[async_trait]
impl BrowserBehavior for SessionKeyConfusionRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let config = session.env.rp_config()?;
        let raw_script = session.rp_login_script()?;

        let evil_identity = session.select_input_op(Role::Evil);
        let honest_identity = session.other_input_op();

        let driver = session.fresh_driver().await?;
        driver.open(&config.url_client_target).await?;
        session.wait_ready(driver.as_ref()).await;
        let cookies = driver.cookies().await?;

        let submit = session.render(&raw_script);
        let second = tokio::spawn(second_login(
            session.clone(),
            config.url_client_target.clone(),
            honest_identity,
            cookies,
            raw_script,
        ));

        session.log(format!("Starting first login with identity '{evil_identity}'."));
        session.execute_logged(driver.as_ref(), &submit).await;
        if let Err(e) = second.await {
            session.log(format!("Second login aborted: {e}"));
            return Ok(Verdict::Undetermined);
        }
        session.wait_ready(driver.as_ref()).await;
        session.settle().await;
        session.log_screenshot(driver.as_ref()).await;

        let current_url = driver.current_url().await?;
        let url_reached = !config.final_valid_url.is_empty() && config.final_valid_url == current_url;
        if !url_reached {
            session.log(format!(
                "Browser stopped at '{current_url}' instead of the success URL, login was rejected."
            ));
            return Ok(Verdict::Pass);
        }
        if session.env.params.bool(FORCE_SUCCESS_URL_FAILS) {
            session.log("Success URL reached with the evil ID token.");
            return Ok(Verdict::Fail);
        }
        session.log("Success URL reached, no check decides this step.");
        Ok(Verdict::Undetermined)
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::browser::driver::testing::{QueueFactory, ScriptedDriver};
    use crate::actor::browser::rp_default::tests::browser_env;
    use crate::context::keys::HONEST_AUTH_SEEN;
    use crate::context::keys::params::{BROWSER_INPUT_EVIL_OP_URL, BROWSER_INPUT_HONEST_OP_URL};

    fn key_confusion_env(params: &[(&str, &str)]) -> ActorEnv {
        let env = browser_env(params);
        env.step.set_param(BROWSER_INPUT_HONEST_OP_URL, "honest-id");
        env.step.set_param(BROWSER_INPUT_EVIL_OP_URL, "evil-id");
        env
    }

    /// First browser whose evil login is held by the OP and then lands on
    /// `landing`.
    fn evil_login_driver(env: &ActorEnv, landing: &'static str) -> Arc<ScriptedDriver> {
        let step = env.step.clone();
        Arc::new(ScriptedDriver::new().on_script(move |driver, script| {
            if script.contains("evil-id") {
                step.barrier(HONEST_AUTH_SEEN).complete(());
                driver.set_location(landing);
            }
        }))
    }

    #[tokio::test]
    async fn test_accepted_evil_token_fails() {
        // Given the RP accepts the evil token after the honest login started
        let env = key_confusion_env(&[(FORCE_SUCCESS_URL_FAILS, "true")]);
        let first = evil_login_driver(&env, "https://rp.test/welcome");
        let second = Arc::new(ScriptedDriver::new());
        let browser = SessionKeyConfusionRpBrowser::new(
            env,
            QueueFactory::scripted(&[first, second.clone()]),
        );

        // When running both logins
        let verdict = browser.run().await.unwrap();

        // Then the step fails and the second browser logged in as honest user
        assert_eq!(verdict, Verdict::Fail);
        assert!(
            second
                .history
                .lock()
                .unwrap()
                .iter()
                .any(|h| h.starts_with("script") && h.contains("honest-id"))
        );
        browser.quit().await;
    }

    #[tokio::test]
    async fn test_rejected_evil_token_passes() {
        let env = key_confusion_env(&[(FORCE_SUCCESS_URL_FAILS, "true")]);
        let first = evil_login_driver(&env, "https://rp.test/error");
        let browser = SessionKeyConfusionRpBrowser::new(
            env,
            QueueFactory::scripted(&[first, Arc::new(ScriptedDriver::new())]),
        );

        assert_eq!(browser.run().await.unwrap(), Verdict::Pass);
    }

    #[tokio::test]
    async fn test_success_without_fail_flag_is_undetermined() {
        let env = key_confusion_env(&[]);
        let first = evil_login_driver(&env, "https://rp.test/welcome");
        let browser = SessionKeyConfusionRpBrowser::new(
            env,
            QueueFactory::scripted(&[first, Arc::new(ScriptedDriver::new())]),
        );

        assert_eq!(browser.run().await.unwrap(), Verdict::Undetermined);
    }
}
