use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::params::{IS_SINGLE_RP_TEST, SCRIPT_EXEC_EXCEPTION_FAILS_TEST};
use crate::types::Role;
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::op_login::{UserLogin, run_user_auth};
use super::session::BrowserSession;

/// Logs two users in one after the other, each in a fresh browser. The RP
/// behaviors decide what the second login reveals.
pub struct OpCodeReuseBrowser {
    session: Arc<BrowserSession>,
}

impl OpCodeReuseBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }
}

#[async_trait]
impl BrowserBehavior for OpCodeReuseBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let config = session.env.op_config()?;
        let second_rp = if session.env.flag(IS_SINGLE_RP_TEST) {
            Role::Honest
        } else {
            Role::Evil
        };
        let on_script_error = session
            .env
            .params
            .bool(SCRIPT_EXEC_EXCEPTION_FAILS_TEST)
            .then_some(Verdict::Fail);

        let users = [
            (Role::Honest, &config.user1_name, &config.user1_pass),
            (second_rp, &config.user2_name, &config.user2_pass),
        ];
        let mut verdict = Verdict::Undetermined;
        for (rp, username, password) in users {
            let driver = session.fresh_driver().await?;
            verdict = run_user_auth(
                session,
                driver.as_ref(),
                UserLogin {
                    rp,
                    username,
                    password,
                    on_script_error,
                    on_timeout: Verdict::Pass,
                },
            )
            .await?;
            session.release(&driver).await;
            session.log(format!("Login of '{username}' finished with {verdict}."));
        }
        Ok(verdict)
    }

    async fn quit(&self) {
        self.session.quit_all().await
    }
}
