use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use http::header::PRAGMA;
use serde_json::{Map, Value, json};
use url::Url;

use crate::actor::behavior::ServerBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::actor::keys::{self, KeyKind};
use crate::actor::types::{
    ActorRequest, ActorResponse, ClientInfo, Endpoint, IssuedTokens, ProviderMetadata,
};
use crate::context::keys::params::{
    AUTH_ERROR_FAILS_TEST, CURRENT_USER_USERNAME, FORCE_NO_REDEEM_AUTH_CODE, IS_RP_LEARNING_STEP,
    IS_SINGLE_RP_TEST, TARGET_OP_URL, TOKEN_RECEIVAL_FAILS_TEST, USER2_IN_USERINFO_FAILS_TEST,
};
use crate::context::keys::{
    BROWSER_FINISHED, LAST_BROWSER_URL, RP_DISCOVERED_METADATA, RP_EVIL_AUTHN_REQUEST,
    RP_EVIL_CLIENT, RP_EVIL_REDIRECT_URI, RP_EVIL_STATE, RP_HONEST_AUTHN_REQUEST,
    RP_HONEST_CLIENT, RP_HONEST_REDIRECT_URI, RP_HONEST_STATE, RP_LAST_TOKENS, RP_RESULT,
    RP_USER1_ID_TOKEN, RP_USER2_ID_TOKEN, STEP_COMPLETED,
};
use crate::types::{OpTestConfig, Role, RoleSlot};
use crate::utils::{gen_random_string, html_escape};
use crate::verdict::Verdict;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Parameters of an authentication response as seen by the RP.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    params: HashMap<String, String>,
    tokens_in_query: bool,
}

impl AuthResponse {
    /// Read query and fragment parameters of the URL the browser ended on.
    pub fn from_url(url: &str) -> Result<Self, ActorError> {
        let url = Url::parse(url).map_err(|e| ActorError::Protocol(format!("{url}: {e}")))?;
        let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let tokens_in_query = params.contains_key("id_token") || params.contains_key("access_token");
        if let Some(fragment) = url.fragment() {
            params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
        }
        Ok(Self {
            params,
            tokens_in_query,
        })
    }

    /// Query and form parameters of the callback request itself.
    pub fn from_request(request: &ActorRequest) -> Self {
        let params: HashMap<String, String> =
            request.query.iter().chain(request.form.iter()).cloned().collect();
        let tokens_in_query = request
            .query
            .iter()
            .any(|(k, _)| k == "id_token" || k == "access_token");
        Self {
            params,
            tokens_in_query,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn code(&self) -> Option<&str> {
        self.param("code")
    }

    pub fn is_error(&self) -> bool {
        self.params.contains_key("error")
    }

    /// Carries anything an OP would send back to the redirect URI.
    pub fn is_authentication_response(&self) -> bool {
        ["code", "error", "id_token", "access_token"]
            .iter()
            .any(|name| self.params.contains_key(*name))
    }

    pub fn tokens_in_query(&self) -> bool {
        self.tokens_in_query
    }

    fn describe(&self) -> String {
        let mut pairs: Vec<_> = self.params.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Attack-specific judgement of the authentication response.
#[async_trait]
pub trait RpScenario: Send + Sync + 'static {
    async fn evaluate(&self, rp: &RpServer, response: &AuthResponse) -> Result<Verdict, ActorError> {
        rp.default_evaluation(response).await
    }

    /// Parameters appended to the prepared authentication request.
    fn authn_request_params(&self, _rp: &RpServer) -> Result<Vec<(String, String)>, ActorError> {
        Ok(Vec::new())
    }

    /// `redirect_uri` of the authentication request.
    fn authn_redirect_uri(&self, rp: &RpServer) -> Result<String, ActorError> {
        Ok(rp.redirect_uri(rp.role()))
    }

    /// Form parameters appended to the token request.
    fn token_request_params(&self, _rp: &RpServer) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Plain client: redeem the code, fetch userinfo, report.
pub struct DefaultRp;

impl RpScenario for DefaultRp {}

/// Simulated relying party playing RP1 (honest) or RP2 (evil) against the
/// OP under test.
#[derive(Clone)]
pub struct RpServer {
    env: ActorEnv,
    slot: RoleSlot,
    scenario: Arc<dyn RpScenario>,
}

impl RpServer {
    pub fn new(env: ActorEnv, slot: RoleSlot, scenario: Arc<dyn RpScenario>) -> Self {
        Self {
            env,
            slot,
            scenario,
        }
    }

    pub fn env(&self) -> &ActorEnv {
        &self.env
    }

    pub fn role(&self) -> Role {
        self.slot.role()
    }

    /// The honest RP starts every step and owns discovery.
    fn is_start_rp(&self) -> bool {
        self.role() == Role::Honest
    }

    pub fn redirect_uri(&self, role: Role) -> String {
        let host = role.pick(&self.env.hosts.honest_rp_url, &self.env.hosts.evil_rp_url);
        format!("{}/{}{}", host, self.env.test_id, Endpoint::Callback.path())
    }

    fn jwks_uri(&self) -> String {
        let host = self
            .role()
            .pick(&self.env.hosts.honest_rp_url, &self.env.hosts.evil_rp_url);
        format!("{}/{}{}", host, self.env.test_id, Endpoint::Jwks.path())
    }

    pub fn metadata(&self) -> Result<ProviderMetadata, ActorError> {
        Ok(self.env.suite.require(RP_DISCOVERED_METADATA)?)
    }

    pub fn client(&self) -> Result<ClientInfo, ActorError> {
        Ok(self
            .env
            .suite
            .require(self.role().pick(RP_HONEST_CLIENT, RP_EVIL_CLIENT))?)
    }

    async fn prepare(&self) -> Result<(), ActorError> {
        let config = self.env.op_config()?;
        let start = self.is_start_rp();
        if start && !config.is_minimal_valid() {
            return Err(ActorError::Configuration(
                "Users and either the OP URL or its metadata must be configured".to_string(),
            ));
        }

        let step = &self.env.step;
        step.insert(
            self.role().pick(RP_HONEST_REDIRECT_URI, RP_EVIL_REDIRECT_URI),
            self.redirect_uri(self.role()),
        );
        if !start {
            step.insert(RP_HONEST_REDIRECT_URI, self.redirect_uri(Role::Honest));
        }
        if !start && self.env.flag(IS_SINGLE_RP_TEST) {
            return Ok(());
        }

        let metadata = self.discover(&config).await?;
        let client = self.register(&config, &metadata).await?;
        self.prepare_authn_request(&metadata, &client)
    }

    async fn discover(&self, config: &OpTestConfig) -> Result<ProviderMetadata, ActorError> {
        let suite = &self.env.suite;
        if let Some(metadata) = suite.get(RP_DISCOVERED_METADATA) {
            if !self.is_start_rp() || suite.get_or(STEP_COMPLETED, false) {
                return Ok(metadata);
            }
        }
        if !self.is_start_rp() {
            return Err(ActorError::Configuration(
                "OP metadata has not been discovered".to_string(),
            ));
        }

        let target = self
            .env
            .step
            .param(TARGET_OP_URL)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| config.url_op_target.clone());
        let discovered = if target.trim().is_empty() {
            None
        } else {
            self.fetch_discovery(&target).await
        };

        let provided = match config.op_metadata.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str::<Map<String, Value>>(raw).map_err(|e| {
                    ActorError::Configuration(format!("Configured OP metadata is invalid: {e}"))
                })?,
            ),
            _ => None,
        };

        let document = match (discovered, provided) {
            (Some(mut document), Some(provided)) => {
                self.env
                    .logger
                    .log("Overriding discovered OP metadata with configured values.");
                document.extend(provided);
                document
            }
            (Some(document), None) => document,
            (None, Some(provided)) => {
                self.env.logger.log("Using configured OP metadata.");
                provided
            }
            (None, None) => {
                return Err(ActorError::Configuration(
                    "OP discovery failed and no OP metadata is configured".to_string(),
                ));
            }
        };

        let metadata: ProviderMetadata = serde_json::from_value(Value::Object(document))
            .map_err(|e| ActorError::Configuration(format!("OP metadata is incomplete: {e}")))?;
        suite.insert(RP_DISCOVERED_METADATA, metadata.clone());
        Ok(metadata)
    }

    async fn fetch_discovery(&self, target: &str) -> Option<Map<String, Value>> {
        let url = format!("{}{}", target.trim_end_matches('/'), DISCOVERY_PATH);
        self.env.logger.log(format!("Fetching OP metadata from '{url}'."));
        let response = match self.env.http_client().ok()?.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.env.logger.log_error("Discovery request failed", &e);
                return None;
            }
        };
        if !response.status().is_success() {
            self.env
                .logger
                .log(format!("Discovery returned status {}.", response.status()));
            return None;
        }
        match response.json::<Map<String, Value>>().await {
            Ok(document) => Some(document),
            Err(e) => {
                self.env.logger.log_error("Discovery document is not valid JSON", &e);
                None
            }
        }
    }

    async fn register(
        &self,
        config: &OpTestConfig,
        metadata: &ProviderMetadata,
    ) -> Result<ClientInfo, ActorError> {
        let suite = &self.env.suite;
        let key = self.role().pick(RP_HONEST_CLIENT, RP_EVIL_CLIENT);
        if suite.get_or(STEP_COMPLETED, false) {
            if let Some(client) = suite.get(key) {
                return Ok(client);
            }
        }

        let client = match self.configured_client(config) {
            Some(client) => client,
            None => self.register_dynamically(metadata).await?,
        };
        suite.insert(key, client.clone());
        Ok(client)
    }

    fn configured_client(&self, config: &OpTestConfig) -> Option<ClientInfo> {
        let raw = self
            .role()
            .pick(&config.client1_config, &config.client2_config)
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())?;
        match serde_json::from_str::<ClientInfo>(raw) {
            Ok(client) => {
                self.env.logger.log("Using configured client credentials.");
                Some(client)
            }
            Err(e) => {
                self.env
                    .logger
                    .log_error("Configured client is invalid, registering instead", &e);
                None
            }
        }
    }

    async fn register_dynamically(
        &self,
        metadata: &ProviderMetadata,
    ) -> Result<ClientInfo, ActorError> {
        let endpoint = metadata.registration_endpoint.as_deref().ok_or_else(|| {
            ActorError::Configuration(
                "Client registration required but not supported by the OP".to_string(),
            )
        })?;

        let body = json!({
            "redirect_uris": [self.redirect_uri(self.role())],
            "client_name": self.role().pick("Honest Test-Client", "Evil Test-Client"),
            "grant_types": ["authorization_code"],
            "response_types": ["code"],
            "jwks_uri": self.jwks_uri(),
        });
        self.env
            .logger
            .log_code_block("Registration request:", body.to_string());

        let response = self
            .env
            .http_client()?
            .post(endpoint)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        self.env
            .logger
            .log_code_block(&format!("Registration response ({status}):"), text.clone());
        if !status.is_success() {
            return Err(ActorError::Configuration(
                "Client registration attempt failed".to_string(),
            ));
        }
        serde_json::from_str(&text).map_err(|e| {
            ActorError::Configuration(format!("Client registration response is invalid: {e}"))
        })
    }

    fn prepare_authn_request(
        &self,
        metadata: &ProviderMetadata,
        client: &ClientInfo,
    ) -> Result<(), ActorError> {
        let role = self.role();
        let redirect_uri = self.scenario.authn_redirect_uri(self)?;
        let extra = self.scenario.authn_request_params(self)?;
        let state = gen_random_string(16)?;
        let nonce = gen_random_string(16)?;

        let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
            ActorError::Configuration(format!("Invalid authorization endpoint: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("scope", "openid profile")
            .append_pair("client_id", &client.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .extend_pairs(extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let step = &self.env.step;
        step.insert(
            role.pick(RP_HONEST_AUTHN_REQUEST, RP_EVIL_AUTHN_REQUEST),
            url.to_string(),
        );
        step.insert(role.pick(RP_HONEST_STATE, RP_EVIL_STATE), state);
        Ok(())
    }

    /// Replace the prepared authentication request with a fresh one, e.g.
    /// before a second login in the same step.
    pub fn refresh_authn_request(&self) -> Result<(), ActorError> {
        let metadata = self.metadata()?;
        let client = self.client()?;
        self.prepare_authn_request(&metadata, &client)
    }

    /// Exchange `code` at the token endpoint. `Ok(None)` means the OP
    /// refused it.
    pub async fn redeem_code(&self, code: &str) -> Result<Option<IssuedTokens>, ActorError> {
        let metadata = self.metadata()?;
        let client = self.client()?;
        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), self.redirect_uri(self.role())),
        ];
        form.extend(self.scenario.token_request_params(self));

        let response = self
            .env
            .http_client()?
            .post(&metadata.token_endpoint)
            .basic_auth(&client.client_id, client.client_secret.as_deref())
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        self.env
            .logger
            .log_code_block(&format!("Token response ({status}):"), text.clone());
        if !status.is_success() {
            self.env.logger.log("Code redemption failed.");
            return Ok(None);
        }

        match serde_json::from_str::<IssuedTokens>(&text) {
            Ok(tokens) => {
                self.env.step.insert(RP_LAST_TOKENS, tokens.clone());
                Ok(Some(tokens))
            }
            Err(e) => {
                self.env.logger.log_error("Token response is invalid", &e);
                Ok(None)
            }
        }
    }

    /// Userinfo claims for `access_token`, `None` when unavailable.
    pub async fn request_userinfo(&self, access_token: &str) -> Result<Option<Value>, ActorError> {
        let Some(endpoint) = self.metadata()?.userinfo_endpoint else {
            self.env.logger.log("The OP has no userinfo endpoint.");
            return Ok(None);
        };
        let response = self
            .env
            .http_client()?
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        self.env
            .logger
            .log_code_block(&format!("Userinfo response ({status}):"), text.clone());
        if !status.is_success() {
            return Ok(None);
        }
        Ok(serde_json::from_str(&text).ok())
    }

    /// Keep the ID token of the user currently logging in for later steps.
    pub(crate) fn store_id_token(&self, id_token: &str, config: &OpTestConfig) {
        let current = self.env.step.param(CURRENT_USER_USERNAME).unwrap_or_default();
        let key = if current == config.user1_name {
            RP_USER1_ID_TOKEN
        } else {
            RP_USER2_ID_TOKEN
        };
        self.env.suite.insert(key, id_token.to_string());
    }

    /// Redeem, fetch userinfo and judge the response.
    pub async fn default_evaluation(&self, response: &AuthResponse) -> Result<Verdict, ActorError> {
        let logger = &self.env.logger;
        let learning = self.env.flag(IS_RP_LEARNING_STEP);

        if let Some(error) = response.param("error") {
            logger.log_code_block(
                "Error received in authentication response:",
                format!(
                    "{error}: {}",
                    response.param("error_description").unwrap_or_default()
                ),
            );
            let fails = self.env.params.bool(AUTH_ERROR_FAILS_TEST) || learning;
            return Ok(if fails { Verdict::Fail } else { Verdict::Pass });
        }
        if response.tokens_in_query() {
            logger.log("Detected token(s) in the URL query string, assuming test failed.");
            return Ok(Verdict::Fail);
        }

        let (access_token, id_token) = match response.code() {
            Some(code) if !self.env.params.bool(FORCE_NO_REDEEM_AUTH_CODE) => {
                let Some(tokens) = self.redeem_code(code).await? else {
                    return Ok(if learning {
                        Verdict::Undetermined
                    } else {
                        Verdict::Pass
                    });
                };
                if self.env.params.bool(TOKEN_RECEIVAL_FAILS_TEST) {
                    logger.log("Tokens were issued, assuming test failed.");
                    return Ok(Verdict::Fail);
                }
                (Some(tokens.access_token), tokens.id_token)
            }
            _ => (
                response.param("access_token").map(str::to_string),
                response.param("id_token").map(str::to_string),
            ),
        };

        let config = self.env.op_config()?;
        if let Some(id_token) = id_token.as_deref().filter(|_| learning) {
            self.store_id_token(id_token, &config);
        }

        if let Some(access_token) = access_token {
            if let Some(userinfo) = self.request_userinfo(&access_token).await? {
                if self.env.params.bool(USER2_IN_USERINFO_FAILS_TEST)
                    && matching_user(&userinfo, &[&config.user2_name]).is_some()
                {
                    logger.log("Userinfo of the second user was returned, assuming test failed.");
                    return Ok(Verdict::Fail);
                }
            }
        }
        Ok(Verdict::Pass)
    }

    /// Evaluate a callback once the browser reported its final URL.
    async fn process_callback(self, request: ActorRequest) {
        let step = &self.env.step;
        let logger = &self.env.logger;
        if let Err(e) = step.barrier(BROWSER_FINISHED).wait(self.env.timeouts.short).await {
            logger.log(format!("Browser did not report its final URL: {e}"));
        }
        let result = step.barrier(RP_RESULT);

        let response = match step.get(LAST_BROWSER_URL).map(|url| AuthResponse::from_url(&url)) {
            Some(Ok(response)) if response.is_authentication_response() => response,
            _ => AuthResponse::from_request(&request),
        };
        logger.log_code_block("Authentication response received:", response.describe());

        let verdict = match self.scenario.evaluate(&self, &response).await {
            Ok(verdict) => verdict,
            Err(e) => {
                logger.log_error("Failed to evaluate authentication response", &e);
                Verdict::Undetermined
            }
        };
        logger.log(format!("{} finished with {verdict}.", self.slot));
        result.complete(verdict);
    }
}

/// The configured user whose name appears as a top-level userinfo value.
/// The later entry wins when several match.
pub(crate) fn matching_user<'a>(userinfo: &Value, users: &[&'a str]) -> Option<&'a str> {
    let values = userinfo.as_object()?;
    users
        .iter()
        .filter(|user| !user.is_empty())
        .filter(|user| values.values().any(|v| v.as_str() == Some(**user)))
        .last()
        .copied()
}

fn callback_page(request: &ActorRequest) -> ActorResponse {
    let body = format!(
        "<!DOCTYPE html><html><head><title>Callback confirmation</title></head>\
         <body><h2>Callback confirmation</h2><p>Received callback at <code>{}{}</code></p></body></html>",
        html_escape(&request.base_url),
        html_escape(&request.uri())
    );
    ActorResponse::html(StatusCode::OK, body).with_header(PRAGMA, "no-cache")
}

#[async_trait]
impl ServerBehavior for RpServer {
    async fn setup(&self) -> Result<(), ActorError> {
        self.prepare().await
    }

    async fn handle(
        &self,
        endpoint: Endpoint,
        request: ActorRequest,
    ) -> Result<ActorResponse, ActorError> {
        match endpoint {
            Endpoint::Callback => {
                let page = callback_page(&request);
                tokio::spawn(self.clone().process_callback(request));
                Ok(page)
            }
            Endpoint::Jwks => {
                let key = keys::signing_key(KeyKind::from(self.role()))?;
                Ok(ActorResponse::ok_json(&keys::jwk_set(&[key])))
            }
            other => Err(ActorError::Protocol(format!(
                "{other:?} is not served by relying parties"
            ))),
        }
    }
}
