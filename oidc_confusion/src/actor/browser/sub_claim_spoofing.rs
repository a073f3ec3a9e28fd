use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::actor::behavior::BrowserBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::actor::keys::decode_claims_json;
use crate::actor::rp::{USER1_ID_TOKEN_VAR, USER1_SUB_VAR, USER2_SUB_VAR};
use crate::context::keys::{
    RP_HONEST_AUTHN_REQUEST, RP_USER1_ID_TOKEN, RP_USER2_ID_TOKEN, STORED_USER1_SUB,
};
use crate::types::Role;
use crate::utils::render_template;
use crate::verdict::Verdict;

use super::driver::DriverFactory;
use super::op_login::{UserLogin, run_user_auth};
use super::session::BrowserSession;

/// Learns both users' subjects, fills them into the honest RP's
/// authentication request and logs the second user in with it.
pub struct SubClaimSpoofingOpBrowser {
    session: Arc<BrowserSession>,
}

impl SubClaimSpoofingOpBrowser {
    pub fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            session: BrowserSession::new(env, factory),
        }
    }

    async fn login(&self, user1: bool, on_timeout: Verdict) -> Result<Verdict, ActorError> {
        let session = &self.session;
        let config = session.env.op_config()?;
        let (username, password) = if user1 {
            (&config.user1_name, &config.user1_pass)
        } else {
            (&config.user2_name, &config.user2_pass)
        };
        let driver = session.fresh_driver().await?;
        let verdict = run_user_auth(
            session,
            driver.as_ref(),
            UserLogin {
                rp: Role::Honest,
                username,
                password,
                on_script_error: None,
                on_timeout,
            },
        )
        .await;
        session.release(&driver).await;
        verdict
    }

    /// Subject of the stored ID token of a user, logging the user in first
    /// when no token is known yet.
    async fn user_subject(&self, user1: bool, plain_request: &str) -> Result<String, ActorError> {
        let env = &self.session.env;
        let key = if user1 { RP_USER1_ID_TOKEN } else { RP_USER2_ID_TOKEN };
        if env.suite.get(key).is_none() {
            self.session
                .log("No ID token stored for the user, logging in to learn the subject.");
            env.step
                .insert(RP_HONEST_AUTHN_REQUEST, plain_request.to_string());
            self.login(user1, Verdict::Undetermined).await?;
        }
        let token = env.suite.get(key).ok_or_else(|| {
            ActorError::NotApplicable("The subject of a test user could not be learned".to_string())
        })?;
        decode_claims_json(&token)?["sub"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ActorError::Protocol("Stored ID token has no sub claim".to_string()))
    }
}

/// The request without the parameters naming the other user.
fn without_user_hints(request: &str) -> Result<String, ActorError> {
    rebuild_query(request, |name, value| {
        (!matches!(name, "claims" | "id_token_hint")).then(|| value.to_string())
    })
}

/// The request with template placeholders in every value filled in.
fn fill_placeholders(request: &str, vars: &HashMap<String, String>) -> Result<String, ActorError> {
    rebuild_query(request, |_, value| Some(render_template(value, vars)))
}

fn rebuild_query(
    request: &str,
    mut map: impl FnMut(&str, &str) -> Option<String>,
) -> Result<String, ActorError> {
    let mut url = Url::parse(request)
        .map_err(|e| ActorError::Protocol(format!("Invalid authentication request: {e}")))?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(name, value)| map(&name, &value).map(|value| (name.into_owned(), value)))
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url.to_string())
}

#[async_trait]
impl BrowserBehavior for SubClaimSpoofingOpBrowser {
    async fn run(&self) -> Result<Verdict, ActorError> {
        let env = &self.session.env;
        let request = env.step.require(RP_HONEST_AUTHN_REQUEST)?;
        let plain_request = without_user_hints(&request)?;

        let user1_sub = self.user_subject(true, &plain_request).await?;
        let user2_sub = self.user_subject(false, &plain_request).await?;
        env.step.insert(STORED_USER1_SUB, user1_sub.clone());

        let vars = HashMap::from([
            (USER1_SUB_VAR.to_string(), user1_sub),
            (USER2_SUB_VAR.to_string(), user2_sub),
            (
                USER1_ID_TOKEN_VAR.to_string(),
                env.suite.get(RP_USER1_ID_TOKEN).unwrap_or_default(),
            ),
        ]);
        env.step
            .insert(RP_HONEST_AUTHN_REQUEST, fill_placeholders(&request, &vars)?);

        self.login(false, Verdict::Pass).await
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
    use crate::actor::keys::unsigned_token;
    use crate::context::keys::params::CURRENT_USER_USERNAME;
    use crate::context::keys::{BROWSER_FINISHED, RP_RESULT};
    use serde_json::json;
    use std::time::Duration;

    const REQUEST: &str = "https://op.test/auth?client_id=c1\
        &claims=%7B%22sub%22%3A%22%24%7Bplaceholder_user1_sub%7D%22%7D\
        &id_token_hint=%24%7Bplaceholder_user1_idtoken%7D";

    /// Honest RP double storing an ID token for every login and answering
    /// `verdict` for the second user's login with the filled request.
    fn learning_rp(env: &ActorEnv, verdict: Verdict) -> tokio::task::JoinHandle<Vec<String>> {
        let step = env.step.clone();
        let suite = env.suite.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..400 {
                let finished = step.get(BROWSER_FINISHED).is_some_and(|b| b.is_settled());
                let answered = step.get(RP_RESULT).is_some_and(|b| b.is_settled());
                if finished && !answered {
                    let user = step.param(CURRENT_USER_USERNAME).unwrap_or_default();
                    let request = step.get(RP_HONEST_AUTHN_REQUEST).unwrap_or_default();
                    seen.push(request.clone());
                    let token = unsigned_token(&json!({ "sub": format!("sub-{user}") }));
                    let key = if user == "alice" { RP_USER1_ID_TOKEN } else { RP_USER2_ID_TOKEN };
                    suite.insert(key, token);
                    let done = request.contains("sub-alice");
                    step.barrier(RP_RESULT)
                        .complete(if done { verdict } else { Verdict::Pass });
                    if done {
                        return seen;
                    }
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            seen
        })
    }

    #[tokio::test]
    async fn test_subjects_are_learned_and_filled_in() {
        // Given no stored ID tokens and a request with placeholders
        let env = op_env(&[]);
        env.step.insert(RP_HONEST_AUTHN_REQUEST, REQUEST.to_string());
        let rp = learning_rp(&env, Verdict::Fail);
        let browser = SubClaimSpoofingOpBrowser::new(
            env.clone(),
            QueueFactory::scripted(&[op_driver(false), op_driver(false), op_driver(false)]),
        );

        // When running
        let verdict = browser.run().await.unwrap();
        let seen = rp.await.unwrap();

        // Then both users logged in without the hints first
        assert_eq!(verdict, Verdict::Fail);
        assert_eq!(seen.len(), 3);
        assert!(!seen[0].contains("claims=") && !seen[0].contains("id_token_hint="));
        assert!(!seen[1].contains("claims="));

        // And the last login carried the first user's sub and ID token
        assert_eq!(env.step.get(STORED_USER1_SUB).as_deref(), Some("sub-alice"));
        let last = Url::parse(&seen[2]).unwrap();
        let claims = last
            .query_pairs()
            .find(|(k, _)| k == "claims")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(claims, r#"{"sub":"sub-alice"}"#);
        let hint = last
            .query_pairs()
            .find(|(k, _)| k == "id_token_hint")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(hint, env.suite.get(RP_USER1_ID_TOKEN).unwrap());
        assert_eq!(env.step.param(CURRENT_USER_USERNAME).as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_stored_tokens_skip_learning_logins() {
        let env = op_env(&[]);
        env.step.insert(RP_HONEST_AUTHN_REQUEST, REQUEST.to_string());
        env.suite
            .insert(RP_USER1_ID_TOKEN, unsigned_token(&json!({ "sub": "sub-alice" })));
        env.suite
            .insert(RP_USER2_ID_TOKEN, unsigned_token(&json!({ "sub": "sub-bob" })));
        let rp = learning_rp(&env, Verdict::Pass);
        let browser = SubClaimSpoofingOpBrowser::new(
            env,
            QueueFactory::scripted(&[op_driver(false)]),
        );

        assert_eq!(browser.run().await.unwrap(), Verdict::Pass);
        assert_eq!(rp.await.unwrap().len(), 1);
    }

    #[test]
    fn test_without_user_hints_keeps_other_params() {
        let plain = without_user_hints(REQUEST).unwrap();
        assert_eq!(plain, "https://op.test/auth?client_id=c1");
    }
}
