use async_trait::async_trait;
use url::Url;

use crate::actor::errors::ActorError;
use crate::context::keys::REDIRECT_URI_MANIPULATOR;
use crate::context::keys::params::{
    RUM_EVIL_REDIRECT_URI, RUM_INVALID_TLD, RUM_PATH_SUFFIX, RUM_SUBDOMAIN,
};
use crate::types::Role;
use crate::utils::gen_alphanumeric;
use crate::verdict::Verdict;

use super::server::{AuthResponse, RpScenario, RpServer};

/// Sends a manipulated `redirect_uri` in the authentication request. Any
/// response that still reaches an RP means the OP accepted it.
pub struct RedirectUriManipulationRp;

impl RedirectUriManipulationRp {
    fn manipulated(rp: &RpServer) -> Result<String, ActorError> {
        let params = &rp.env().params;
        let base = if params.bool(RUM_EVIL_REDIRECT_URI) {
            rp.redirect_uri(Role::Evil)
        } else {
            rp.redirect_uri(rp.role())
        };
        let manipulator = gen_alphanumeric(12)?.to_lowercase();
        let uri = manipulate(
            &base,
            &manipulator,
            params.bool(RUM_SUBDOMAIN),
            params.bool(RUM_INVALID_TLD),
            params.bool(RUM_PATH_SUFFIX),
        )?;
        rp.env().step.insert(REDIRECT_URI_MANIPULATOR, manipulator);
        Ok(uri)
    }
}

fn manipulate(
    base: &str,
    manipulator: &str,
    subdomain: bool,
    invalid_tld: bool,
    path_suffix: bool,
) -> Result<String, ActorError> {
    let mut url =
        Url::parse(base).map_err(|e| ActorError::Protocol(format!("{base}: {e}")))?;
    let mut host = url.host_str().unwrap_or_default().to_string();
    if subdomain {
        host = format!("{manipulator}.{host}");
    }
    if invalid_tld {
        host.push_str(".invalid");
    }
    url.set_host(Some(&host))
        .map_err(|e| ActorError::Protocol(format!("{host}: {e}")))?;
    if path_suffix {
        let path = format!("{}/{manipulator}", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    Ok(url.to_string())
}

#[async_trait]
impl RpScenario for RedirectUriManipulationRp {
    async fn evaluate(&self, rp: &RpServer, response: &AuthResponse) -> Result<Verdict, ActorError> {
        let env = rp.env();
        if response.is_error() {
            env.logger.log("The OP refused the manipulated redirect URI.");
            return Ok(Verdict::Pass);
        }
        if rp.role() == Role::Evil {
            env.logger
                .log("Authentication response was delivered to the evil RP.");
            return Ok(Verdict::Fail);
        }
        let Some(code) = response.code() else {
            return Ok(Verdict::Pass);
        };
        let Some(tokens) = rp.redeem_code(code).await? else {
            env.logger
                .log("Code issued for the manipulated redirect URI could not be redeemed.");
            return Ok(Verdict::Pass);
        };
        rp.request_userinfo(&tokens.access_token).await?;
        env.logger
            .log("Code issued for the manipulated redirect URI was redeemed.");
        Ok(Verdict::Fail)
    }

    fn authn_redirect_uri(&self, rp: &RpServer) -> Result<String, ActorError> {
        Self::manipulated(rp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::behavior::ServerBehavior;
    use crate::actor::rp::server::tests::{callback, mock_op, op_target_env, ready_rp};
    use crate::context::keys::RP_HONEST_AUTHN_REQUEST;
    use crate::types::RoleSlot;
    use std::sync::Arc;

    #[test]
    fn test_manipulations_combine() {
        let base = "http://honest-rp.test/t1/callback";
        assert_eq!(
            manipulate(base, "x1", true, false, false).unwrap(),
            "http://x1.honest-rp.test/t1/callback"
        );
        assert_eq!(
            manipulate(base, "x1", false, true, true).unwrap(),
            "http://honest-rp.test.invalid/t1/callback/x1"
        );
    }

    #[tokio::test]
    async fn test_request_uses_evil_redirect_uri_with_subdomain() {
        // Given an RP sending the evil RP's redirect URI under a random subdomain
        let op = mock_op(false).await;
        let base = op.base.lock().unwrap().clone();
        let env = op_target_env(
            &base,
            &[(RUM_EVIL_REDIRECT_URI, "true"), (RUM_SUBDOMAIN, "true")],
        );

        // When it is set up
        ready_rp(&env, Arc::new(RedirectUriManipulationRp)).await;

        // Then the request names the manipulated host
        let manipulator = env.step.get(REDIRECT_URI_MANIPULATOR).unwrap();
        assert_eq!(manipulator.len(), 12);
        let request = env.step.get(RP_HONEST_AUTHN_REQUEST).unwrap();
        let redirect = Url::parse(&request)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(
            redirect,
            format!("http://{manipulator}.evil-rp.test/t1/callback")
        );
    }

    #[tokio::test]
    async fn test_redeemed_code_fails() {
        let op = mock_op(false).await;
        let base = op.base.lock().unwrap().clone();
        let env = op_target_env(&base, &[(RUM_PATH_SUFFIX, "true")]);
        let rp = ready_rp(&env, Arc::new(RedirectUriManipulationRp)).await;

        let verdict = callback(&rp, "http://honest-rp.test/t1/callback?code=c1").await;
        assert_eq!(verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_rejected_code_passes() {
        let op = mock_op(false).await;
        op.redeemed.lock().unwrap().insert("c1".to_string());
        let base = op.base.lock().unwrap().clone();
        let env = op_target_env(&base, &[(RUM_PATH_SUFFIX, "true")]);
        let rp = ready_rp(&env, Arc::new(RedirectUriManipulationRp)).await;

        let verdict = callback(&rp, "http://honest-rp.test/t1/callback?code=c1").await;
        assert_eq!(verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_response_at_evil_rp_fails() {
        let op = mock_op(false).await;
        let base = op.base.lock().unwrap().clone();
        let env = op_target_env(&base, &[(RUM_EVIL_REDIRECT_URI, "true")]);
        ready_rp(&env, Arc::new(RedirectUriManipulationRp)).await;
        let evil = RpServer::new(env.clone(), RoleSlot::Rp2, Arc::new(RedirectUriManipulationRp));
        evil.setup().await.unwrap();

        let verdict = callback(&evil, "http://evil-rp.test/t1/callback?code=c1").await;
        assert_eq!(verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_error_response_passes() {
        let op = mock_op(false).await;
        let base = op.base.lock().unwrap().clone();
        let env = op_target_env(&base, &[(RUM_SUBDOMAIN, "true")]);
        let rp = ready_rp(&env, Arc::new(RedirectUriManipulationRp)).await;

        let verdict =
            callback(&rp, "http://honest-rp.test/t1/callback?error=invalid_request").await;
        assert_eq!(verdict, Verdict::Pass);
    }
}
