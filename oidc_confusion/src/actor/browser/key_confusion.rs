use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::actor::op::KEY_CONFUSION_ITERATIONS;
use crate::context::keys::{MULTI_PART_FINISHED, UNTRUSTED_KEY_REQUESTED};
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::rp_default::{NoHooks, default_run};
use super::session::BrowserSession;

/// Repeats the default login until the OP has delivered every key
/// confusion variant.
pub struct KeyConfusionRpBrowser {
    session: Arc<BrowserSession>,
}

impl KeyConfusionRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

#[async_trait]
impl BrowserBehavior for KeyConfusionRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let step = &session.env.step;
        let driver = session.fresh_driver().await?;

        let mut iteration = 0;
        while !step.get_or(MULTI_PART_FINISHED, false) {
            if iteration == KEY_CONFUSION_ITERATIONS {
                session.log("Multi part test did not finish, result is undetermined.");
                return Ok(Verdict::Undetermined);
            }
            session.log(format!("Key confusion iteration {}.", iteration + 1));
            let verdict = default_run(session, driver.as_ref(), &NoHooks).await?;
            if verdict == Verdict::Fail {
                return Ok(Verdict::Fail);
            }
            if step.get_or(UNTRUSTED_KEY_REQUESTED, false) {
                session.log("The RP fetched keys from the untrusted key endpoint.");
                return Ok(Verdict::Fail);
            }
            iteration += 1;
        }
        Ok(Verdict::Pass)
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
