use url::Url;

use crate::actor::errors::ActorError;
use crate::context::keys::params::{CURRENT_USER_PASSWORD, CURRENT_USER_USERNAME};
use crate::context::keys::{
    BROWSER_FINISHED, LAST_BROWSER_URL, RP_EVIL_AUTHN_REQUEST, RP_EVIL_REDIRECT_URI,
    RP_HONEST_AUTHN_REQUEST, RP_HONEST_REDIRECT_URI, RP_RESULT,
};
use crate::types::Role;
use crate::verdict::Verdict;

use super::driver::BrowserDriver;
use super::session::BrowserSession;

/// One user logging in at the OP under test through one of the simulated RPs.
pub(crate) struct UserLogin<'a> {
    pub(crate) rp: Role,
    pub(crate) username: &'a str,
    pub(crate) password: &'a str,
    /// Verdict when a login or consent script throws. `None` carries on.
    pub(crate) on_script_error: Option<Verdict>,
    /// Verdict when the RP never reports a result.
    pub(crate) on_timeout: Verdict,
}

/// Open the prepared authentication request, log the user in, hand the
/// final URL to the RP and wait for its verdict.
pub(crate) async fn run_user_auth(
    session: &BrowserSession,
    driver: &dyn BrowserDriver,
    login: UserLogin<'_>,
) -> Result<Verdict, ActorError> {
    let step = &session.env.step;
    let rp_finished_browser = step.fresh_barrier(BROWSER_FINISHED);
    let rp_result = step.fresh_barrier(RP_RESULT);

    step.set_param(CURRENT_USER_USERNAME, login.username);
    step.set_param(CURRENT_USER_PASSWORD, login.password);

    let authn_request = step.require(login.rp.pick(RP_HONEST_AUTHN_REQUEST, RP_EVIL_AUTHN_REQUEST))?;
    session
        .env
        .logger
        .log_code_block("Authentication Request URL:", &authn_request);
    driver.open(&authn_request).await?;
    session.wait_ready(driver).await;

    let login_script = session.render(&session.op_login_script()?);
    session.log(format!("Logging in as '{}'.", login.username));
    if !session.execute_logged(driver, &login_script).await {
        session.log_screenshot(driver).await;
        if let Some(verdict) = login.on_script_error {
            return Ok(verdict);
        }
    }
    session.wait_ready(driver).await;
    session.settle().await;

    let location = driver.current_url().await?.to_lowercase();
    let redirect_uris = [
        step.get(RP_HONEST_REDIRECT_URI).unwrap_or_default(),
        step.get(RP_EVIL_REDIRECT_URI).unwrap_or_default(),
        requested_redirect_uri(&authn_request).unwrap_or_default(),
    ];
    let at_rp = redirect_uris
        .iter()
        .any(|uri| !uri.is_empty() && location.starts_with(&uri.to_lowercase()));
    if !at_rp {
        session.log("Not redirected to the RP yet, running consent script.");
        let consent_script = session.render(&session.op_consent_script()?);
        if !session.execute_logged(driver, &consent_script).await {
            session.log_screenshot(driver).await;
            if let Some(verdict) = login.on_script_error {
                return Ok(verdict);
            }
        }
        session.wait_ready(driver).await;
        session.settle().await;
    }

    let final_url = driver.current_url().await?;
    session.log(format!("Browser reached '{final_url}'."));
    session.log_screenshot(driver).await;
    step.insert(LAST_BROWSER_URL, final_url);
    rp_finished_browser.complete(());

    match rp_result.wait(session.env.timeouts.medium).await {
        Ok(verdict) => Ok(verdict),
        Err(e) => {
            session.log(format!("No result from the RP: {e}"));
            Ok(login.on_timeout)
        }
    }
}

/// `redirect_uri` named in an authentication request.
fn requested_redirect_uri(authn_request: &str) -> Option<String> {
    Url::parse(authn_request)
        .ok()?
        .query_pairs()
        .find(|(name, _)| name == "redirect_uri")
        .map(|(_, value)| value.into_owned())
}
