use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::types::Role;
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::op_login::{UserLogin, run_user_auth};
use super::session::BrowserSession;

/// Logs the first user in at the OP under test through the honest RP.
pub struct OpLearningBrowser {
    session: Arc<BrowserSession>,
}

impl OpLearningBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

#[async_trait]
impl BrowserBehavior for OpLearningBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let config = self.session.env.op_config()?;
        let driver = self.session.fresh_driver().await?;
        run_user_auth(
            &self.session,
            driver.as_ref(),
            UserLogin {
                rp: Role::Honest,
                username: &config.user1_name,
                password: &config.user1_pass,
                on_script_error: Some(Verdict::Undetermined),
                on_timeout: Verdict::Undetermined,
            },
        )
        .await
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::browser::driver::testing::QueueFactory;
    use crate::actor::browser::op_login::tests::{op_driver, op_env};
    use crate::context::keys::LAST_BROWSER_URL;

    #[tokio::test]
    async fn test_silent_rp_is_undetermined() {
        // Given an RP that never reports
        let env = op_env(&[]);
        let driver = op_driver(false);
        let browser = OpLearningBrowser::new(env.clone(), QueueFactory::scripted(&[driver.clone()]));

        // When learning
        let verdict = browser.run().await.unwrap();
        browser.quit().await;

        // Then nothing can be concluded, but the browser reached the RP
        assert_eq!(verdict, Verdict::Undetermined);
        assert!(env.step.get(LAST_BROWSER_URL).unwrap().contains("honest-rp"));
        assert!(driver.history.lock().unwrap().contains(&"quit".to_string()));
    }

    #[tokio::test]
    async fn test_rp_config_is_rejected() {
        let env = crate::actor::browser::rp_default::tests::browser_env(&[]);
        let browser = OpLearningBrowser::new(env, QueueFactory::scripted(&[]));
        assert!(matches!(
            browser.run().await,
            Err(ActorError::Configuration(_))
        ));
    }
}
