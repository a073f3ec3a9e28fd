use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::types::{Role, TestConfig};
use crate::verdict::Verdict;

use super::driver::{BrowserDriver, DriverFactory};
use super::session::BrowserSession;

/// Learns how to log in at the RP under test: once with the honest and once
/// with the evil identity. Records the URL reached after a successful login
/// and checks that each user's needle shows up.
pub struct RpLearningBrowser {
    session: Arc<BrowserSession>,
}

impl RpLearningBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }

    async fn login_script(&self, driver: &dyn BrowserDriver) -> Result<Option<String>, ActorError> {
        let config = self.session.env.rp_config()?;
        if config.login_script.trim().is_empty() && config.input_field_name.trim().is_empty() {
            let Some(field) = self.session.detect_input_field(driver).await else {
                return Ok(None);
            };
            self.session
                .log(format!("Using detected input field '{field}'."));
            self.session.env.update_config(|cfg| {
                if let TestConfig::Rp(rp) = cfg {
                    rp.input_field_name = field;
                }
            });
        }
        Ok(Some(self.session.rp_login_script()?))
    }

    async fn learn(&self, role: Role) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let config = session.env.rp_config()?;
        let identity = session.select_input_op(role);
        session.log(format!("Learning login with {role} OP identity '{identity}'."));

        let driver = session.fresh_driver().await?;
        driver.open(&config.url_client_target).await?;
        session.wait_ready(driver.as_ref()).await;

        let Some(script) = self.login_script(driver.as_ref()).await? else {
            session.log("Could not determine how to submit the login form.");
            session.release(&driver).await;
            return Ok(Verdict::Undetermined);
        };
        let script = session.render(&script);
        session.env.logger.log_code_block("Login script:", &script);
        driver.execute_script(&script).await?;

        session.wait_ready(driver.as_ref()).await;
        session.settle().await;
        session.log_screenshot(driver.as_ref()).await;

        if role == Role::Honest {
            let reached = driver.current_url().await?;
            session.log(format!("Recording '{reached}' as the URL of a valid login."));
            session.env.update_config(|cfg| {
                if let TestConfig::Rp(rp) = cfg {
                    rp.final_valid_url = reached;
                }
            });
        }

        if !config.profile_url.is_empty() {
            driver.open(&config.profile_url).await?;
            session.wait_ready(driver.as_ref()).await;
            session.settle().await;
            session.log_screenshot(driver.as_ref()).await;
        }

        let needle = session.render(&role.pick(config.honest_user_needle, config.evil_user_needle));
        let verdict = if needle.is_empty() {
            session.log("No user needle configured.");
            Verdict::Undetermined
        } else if driver.page_contains(&needle).await? {
            session.log(format!("User needle '{needle}' found."));
            Verdict::Pass
        } else {
            session.log(format!("User needle '{needle}' not found, login did not succeed."));
            Verdict::Fail
        };
        session.release(&driver).await;
        Ok(verdict)
    }
}

#[async_trait]
impl BrowserBehavior for RpLearningBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let honest = self.learn(Role::Honest).await?;
        if honest != Verdict::Pass {
            return Ok(honest);
        }
        self.learn(Role::Evil).await
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
