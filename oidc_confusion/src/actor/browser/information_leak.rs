use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::{TOKEN_LEAK, USERINFO_LEAK};
use crate::verdict::{Verdict, worst};

use super::driver::DriverFactory;
use super::rp_default::{RpRunHooks, default_run};
use super::session::BrowserSession;

/// Default login run judged by what leaked to the evil OP's token and
/// userinfo endpoints instead of by the final page.
pub struct InformationLeakRpBrowser {
    session: Arc<BrowserSession>,
}

impl InformationLeakRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

struct LeakHooks;

#[async_trait]
impl RpRunHooks for LeakHooks {
    async fn after_login(&self, session: &BrowserSession) -> Option<Verdict> {
        let step = &session.env.step;
        let timeouts = session.env.timeouts;

        let token = match step.barrier(TOKEN_LEAK).wait(timeouts.normal).await {
            Ok(result) => result,
            Err(e) => {
                session.log(format!("No token request observed: {e}"));
                None
            }
        };
        // The userinfo request follows the token request, a short grace is enough
        let userinfo = match step.barrier(USERINFO_LEAK).wait(timeouts.settle).await {
            Ok(result) => result,
            Err(e) => {
                session.log(format!("No userinfo request observed: {e}"));
                None
            }
        };

        let result = worst(token, userinfo);
        match result {
            Some(verdict) => session.log(format!("Information leak checks finished with {verdict}.")),
            None => session.log("No leak observed, continuing with the default checks."),
        }
        result
    }
}

#[async_trait]
impl BrowserBehavior for InformationLeakRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let driver = self.session.fresh_driver().await?;
        default_run(&self.session, driver.as_ref(), &LeakHooks).await
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
