use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::context::keys::params::{
    BROWSER_INPUT_EVIL_OP_URL, BROWSER_INPUT_HONEST_OP_URL, BROWSER_INPUT_OP_URL,
};
use crate::types::Role;
use crate::utils::render_template;

use super::driver::{BrowserDriver, DriverFactory, DriverPool};

const READY_STATE_SCRIPT: &str = "return document.readyState;";

/// Script submitting the RP login form through the named input field.
const SUBMIT_FORM_TEMPLATE: &str = r#"var input = document.querySelector('input[name="${input_field_name}"]');
input.value = "${browser_input_op_url}";
if (input.form.requestSubmit) { input.form.requestSubmit(); } else { input.form.submit(); }"#;

/// Candidate identity inputs on an RP login page, as a list of field names.
const FIND_IDENTITY_INPUTS: &str = r#"return Array.from(document.querySelectorAll('input'))
  .filter(function (i) {
    var n = ((i.name || '') + ' ' + (i.id || '')).toLowerCase();
    return i.name && (n.indexOf('openid') >= 0 || n.indexOf('identifier') >= 0 || n.indexOf('issuer') >= 0);
  })
  .map(function (i) { return i.name; });"#;

/// Fills the OP login form with the current user.
const DEFAULT_OP_LOGIN_SCRIPT: &str = r#"var user = document.querySelector('input[type="email"], input[name*="user" i], input[name*="login" i], input[type="text"]');
var pass = document.querySelector('input[type="password"]');
user.value = "${current_user_username}";
pass.value = "${current_user_password}";
var form = pass.form || user.form;
if (form.requestSubmit) { form.requestSubmit(); } else { form.submit(); }"#;

/// Accepts a consent page if one is shown.
const DEFAULT_OP_CONSENT_SCRIPT: &str = r#"var form = document.querySelector('form');
if (form) {
  var button = form.querySelector('[type="submit"]');
  if (button) { button.click(); } else { form.submit(); }
}"#;

/// Shared plumbing of every browser behavior: environment, driver pool and
/// the small page-handling helpers the scenarios are written with.
pub(crate) struct BrowserSession {
    pub(crate) env: ActorEnv,
    pool: DriverPool,
}

impl BrowserSession {
    pub(crate) fn new(env: ActorEnv, factory: Arc<dyn DriverFactory>) -> Arc<Self> {
        Arc::new(Self {
            env,
            pool: DriverPool::new(factory),
        })
    }

    pub(crate) async fn fresh_driver(&self) -> Result<Arc<dyn BrowserDriver>, ActorError> {
        self.pool.fresh().await
    }

    pub(crate) async fn release(&self, driver: &Arc<dyn BrowserDriver>) {
        self.pool.release(driver).await
    }

    pub(crate) async fn quit_all(&self) {
        self.pool.quit_all().await
    }

    pub(crate) fn log(&self, message: impl Into<String>) {
        self.env.logger.log(message)
    }

    /// Substitute `${name}` placeholders from the step and actor parameters.
    pub(crate) fn render(&self, template: &str) -> String {
        render_template(template, &self.env.template_vars())
    }

    /// Poll `document.readyState` until the page finished loading, bounded
    /// by the normal timeout.
    pub(crate) async fn wait_ready(&self, driver: &dyn BrowserDriver) {
        let deadline = Instant::now() + self.env.timeouts.normal;
        loop {
            match driver.execute_script(READY_STATE_SCRIPT).await {
                Ok(Value::String(state)) if state == "complete" => return,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Ready state poll failed: {}", e);
                    return;
                }
            }
            if Instant::now() >= deadline {
                self.log("Page did not finish loading in time.");
                return;
            }
            tokio::time::sleep(self.env.timeouts.settle / 4).await;
        }
    }

    pub(crate) async fn settle(&self) {
        tokio::time::sleep(self.env.timeouts.settle).await
    }

    pub(crate) async fn log_screenshot(&self, driver: &dyn BrowserDriver) {
        match driver.screenshot().await {
            Ok(image) => self.env.logger.log_screenshot(&image, "image/png"),
            Err(e) => self.env.logger.log_error("Failed to take screenshot", &e),
        }
    }

    /// Run a script, logging (not propagating) script failures.
    pub(crate) async fn execute_logged(&self, driver: &dyn BrowserDriver, script: &str) -> bool {
        match driver.execute_script(script).await {
            Ok(_) => true,
            Err(e) => {
                self.env.logger.log_error("Error during script execution", &e);
                false
            }
        }
    }

    /// Point the `browser_input_op_url` parameter at the given OP identity.
    pub(crate) fn select_input_op(&self, role: Role) -> String {
        let source = role.pick(BROWSER_INPUT_HONEST_OP_URL, BROWSER_INPUT_EVIL_OP_URL);
        let value = self.env.step.param(source).unwrap_or_default();
        self.env.step.set_param(BROWSER_INPUT_OP_URL, &value);
        value
    }

    /// OP identity entered into the RP's login form for this step.
    pub(crate) fn input_op(&self) -> String {
        self.env.step.param(BROWSER_INPUT_OP_URL).unwrap_or_default()
    }

    /// Identity not selected by `browser_input_op_url`.
    pub(crate) fn other_input_op(&self) -> String {
        let honest = self
            .env
            .step
            .param(BROWSER_INPUT_HONEST_OP_URL)
            .unwrap_or_default();
        if self.input_op() == honest {
            self.env
                .step
                .param(BROWSER_INPUT_EVIL_OP_URL)
                .unwrap_or_default()
        } else {
            honest
        }
    }

    /// Login script of the RP under test: the configured one, or a
    /// form-submit script generated from the input field name.
    pub(crate) fn rp_login_script(&self) -> Result<String, ActorError> {
        let config = self.env.rp_config()?;
        if !config.login_script.trim().is_empty() {
            return Ok(config.login_script);
        }
        if !config.input_field_name.trim().is_empty() {
            return Ok(SUBMIT_FORM_TEMPLATE.replace("${input_field_name}", &config.input_field_name));
        }
        Err(ActorError::Configuration(
            "Neither a login script nor an input field name is configured".to_string(),
        ))
    }

    /// Look for the identity input on the open login page. Exactly one
    /// candidate is accepted.
    pub(crate) async fn detect_input_field(&self, driver: &dyn BrowserDriver) -> Option<String> {
        let names = match driver.execute_script(FIND_IDENTITY_INPUTS).await {
            Ok(Value::Array(names)) => names,
            Ok(_) => Vec::new(),
            Err(e) => {
                self.env.logger.log_error("Input field detection failed", &e);
                return None;
            }
        };
        let names: Vec<String> = names
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        match names.as_slice() {
            [name] => Some(name.clone()),
            [] => {
                self.log("No identity input field found on the login page.");
                None
            }
            _ => {
                self.log(format!(
                    "Several candidate input fields found: {}",
                    names.join(", ")
                ));
                None
            }
        }
    }

    pub(crate) fn op_login_script(&self) -> Result<String, ActorError> {
        let config = self.env.op_config()?;
        Ok(non_empty_or(config.login_script, DEFAULT_OP_LOGIN_SCRIPT))
    }

    pub(crate) fn op_consent_script(&self) -> Result<String, ActorError> {
        let config = self.env.op_config()?;
        Ok(non_empty_or(config.consent_script, DEFAULT_OP_CONSENT_SCRIPT))
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}
