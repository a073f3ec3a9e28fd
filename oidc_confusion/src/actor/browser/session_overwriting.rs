use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::barrier::BarrierError;
use crate::context::keys::params::BROWSER_INPUT_OP_URL;
use crate::context::keys::{HONEST_AUTH_SEEN, STEP_RESULT};
use crate::verdict::Verdict;

use super::driver::{BrowserCookie, DriverFactory};
use super::session::BrowserSession;

/// Runs two logins in one browser session: the first one is held open by
/// its OP while a second browser sharing the cookies logs in with the other
/// OP, so the RP's session state gets overwritten.
pub struct SessionOverwritingRpBrowser {
    session: Arc<BrowserSession>,
}

impl SessionOverwritingRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

/// Second login, started once the first OP signals that it holds the first
/// authorization request.
pub(super) async fn second_login(
    session: Arc<BrowserSession>,
    start_url: String,
    identity: String,
    cookies: Vec<BrowserCookie>,
    script: String,
) {
    let first_seen = session.env.step.barrier(HONEST_AUTH_SEEN);
    if let Err(e) = first_seen.wait(session.env.timeouts.normal).await {
        session.log(format!("First authorization request never arrived: {e}"));
        return;
    }

    let driver = match session.fresh_driver().await {
        Ok(driver) => driver,
        Err(e) => {
            session.env.logger.log_error("Failed to start second browser", &e);
            return;
        }
    };
    let started = async {
        driver.open(&start_url).await?;
        driver.set_cookies(&cookies).await?;
        Ok::<_, ActorError>(())
    }
    .await;
    if let Err(e) = started {
        session.env.logger.log_error("Failed to prepare second browser", &e);
        session.release(&driver).await;
        return;
    }

    session.env.step.set_param(BROWSER_INPUT_OP_URL, &identity);
    let script = session.render(&script);
    session.log(format!("Starting second login with identity '{identity}'."));
    session.execute_logged(driver.as_ref(), &script).await;
    session.wait_ready(driver.as_ref()).await;
    // Give the OP time to answer the held request before the browser closes
    tokio::time::sleep(session.env.timeouts.settle * 2).await;
    session.release(&driver).await;
}

#[async_trait]
impl BrowserBehavior for SessionOverwritingRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let config = session.env.rp_config()?;
        let result = session.env.step.barrier(STEP_RESULT);
        let raw_script = session.rp_login_script()?;

        let first_identity = session.input_op();
        let second_identity = session.other_input_op();

        let driver = session.fresh_driver().await?;
        driver.open(&config.url_client_target).await?;
        session.wait_ready(driver.as_ref()).await;
        let cookies = driver.cookies().await?;

        let submit = session.render(&raw_script);
        tokio::spawn(second_login(
            session.clone(),
            config.url_client_target.clone(),
            second_identity,
            cookies,
            raw_script,
        ));

        session.log(format!("Starting first login with identity '{first_identity}'."));
        session.execute_logged(driver.as_ref(), &submit).await;
        session.wait_ready(driver.as_ref()).await;

        match result.wait(session.env.timeouts.normal).await {
            Ok(verdict) => {
                session.log_screenshot(driver.as_ref()).await;
                session.log(format!(
                    "Browser finished at '{}'.",
                    driver.current_url().await.unwrap_or_default()
                ));
                Ok(verdict)
            }
            Err(BarrierError::TimedOut { .. }) => {
                session.log("Timeout while waiting for token request, assuming test passed.");
                Ok(Verdict::Pass)
            }
            Err(e) => {
                session.log(e.to_string());
                Ok(Verdict::Undetermined)
            }
        }
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
    use crate::context::keys::params::{BROWSER_INPUT_EVIL_OP_URL, BROWSER_INPUT_HONEST_OP_URL};
    use std::time::Duration;

    fn overwriting_env() -> ActorEnv {
        let env = browser_env(&[]);
        env.step.set_param(BROWSER_INPUT_HONEST_OP_URL, "honest-id");
        env.step.set_param(BROWSER_INPUT_EVIL_OP_URL, "evil-id");
        env.step.set_param(BROWSER_INPUT_OP_URL, "evil-id");
        env
    }

    #[tokio::test]
    async fn test_second_browser_uses_other_identity_and_cookies() {
        // Given a first browser holding a session cookie
        let env = overwriting_env();
        let step = env.step.clone();
        let first = Arc::new(ScriptedDriver::new().on_script(move |_, script| {
            if script.contains("evil-id") {
                step.barrier(HONEST_AUTH_SEEN).complete(());
            }
        }));
        first.cookies.lock().unwrap().push(BrowserCookie {
            name: "JSESSIONID".to_string(),
            value: "abc".to_string(),
            path: None,
            domain: None,
        });
        let step = env.step.clone();
        let second = Arc::new(ScriptedDriver::new().on_script(move |_, script| {
            if script.contains("honest-id") {
                step.barrier(STEP_RESULT).complete(Verdict::Fail);
            }
        }));
        let browser = SessionOverwritingRpBrowser::new(
            env,
            QueueFactory::scripted(&[first.clone(), second.clone()]),
        );

        // When running
        let verdict = browser.run().await.unwrap();

        // Then the second login finished the step with the other identity
        assert_eq!(verdict, Verdict::Fail);
        assert_eq!(second.cookies.lock().unwrap()[0].value, "abc");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(second.history.lock().unwrap().contains(&"quit".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_passes() {
        let env = overwriting_env();
        let browser = SessionOverwritingRpBrowser::new(
            env,
            QueueFactory::scripted(&[Arc::new(ScriptedDriver::new())]),
        );

        assert_eq!(browser.run().await.unwrap(), Verdict::Pass);
    }

    #[tokio::test]
    async fn test_abandoned_result_is_undetermined() {
        let env = overwriting_env();
        let step = env.step.clone();
        let driver = Arc::new(ScriptedDriver::new().on_script(move |_, _| {
            step.abandon_barriers();
        }));
        let browser = SessionOverwritingRpBrowser::new(env, QueueFactory::scripted(&[driver]));

        assert_eq!(browser.run().await.unwrap(), Verdict::Undetermined);
    }
}
