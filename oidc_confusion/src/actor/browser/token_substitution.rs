use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::params::{FORCE_TOKEN_REQUEST_FAILS, FORCE_USERINFO_REQUEST_FAILS};
use crate::context::keys::{TOKEN_REQUEST_RECEIVED, USERINFO_REQUEST_RECEIVED};
use crate::verdict::{Verdict, worst};

use super::driver::DriverFactory;
use super::rp_default::{NoHooks, default_run};
use super::session::BrowserSession;

/// Default login run that additionally fails when the RP went on to the
/// token or UserInfo endpoint although the authorization response should
/// have stopped it.
pub struct TokenSubstitutionRpBrowser {
    session: Arc<BrowserSession>,
}

impl TokenSubstitutionRpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }

    fn endpoint_verdict(&self) -> Option<Verdict> {
        let env = &self.session.env;
        if env.params.bool(FORCE_TOKEN_REQUEST_FAILS) {
            if let Some(role) = env.step.get(TOKEN_REQUEST_RECEIVED) {
                self.session
                    .log(format!("Token request received at the {role} OP."));
                return Some(Verdict::Fail);
            }
        }
        if env.params.bool(FORCE_USERINFO_REQUEST_FAILS) {
            if let Some(role) = env.step.get(USERINFO_REQUEST_RECEIVED) {
                self.session
                    .log(format!("UserInfo request received at the {role} OP."));
                return Some(Verdict::Fail);
            }
        }
        None
    }
}

#[async_trait]
impl BrowserBehavior for TokenSubstitutionRpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let driver = self.session.fresh_driver().await?;
        let verdict = default_run(&self.session, driver.as_ref(), &NoHooks).await?;
        Ok(worst(Some(verdict), self.endpoint_verdict()).unwrap_or(verdict))
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
