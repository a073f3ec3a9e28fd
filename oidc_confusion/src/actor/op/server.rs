use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use http::StatusCode;
use http::header::{CACHE_CONTROL, WWW_AUTHENTICATE};
use serde_json::{Map, Value, json};

use crate::actor::behavior::ServerBehavior;
use crate::actor::env::ActorEnv;
use crate::actor::errors::ActorError;
use crate::actor::keys::{self, KeyKind};
use crate::actor::types::{ActorRequest, ActorResponse, ClientInfo, Endpoint, ProviderMetadata};
use crate::context::keys::{
    AUTH_REQ_NONCE, HONEST_ACCESS_TOKEN, HONEST_CODE, OP_EVIL_CLIENT, OP_HONEST_CLIENT,
    REGISTRATION_FRAGMENT, TOKEN_REQUEST_RECEIVED, USERINFO_REQUEST_RECEIVED, params,
};
use crate::types::{ENFORCE_REGISTRATION_PREFIX, Role, RoleSlot};
use crate::utils::{gen_random_string, half_hash, html_escape};
use crate::verdict::Verdict;

const ISSUER_REL: &str = "http://openid.net/specs/connect/1.0/issuer";

/// Attack-specific overrides layered on top of the default provider.
///
/// Every hook has a no-op default, a scenario only implements what it
/// changes.
#[async_trait]
pub trait OpScenario: Send + Sync + 'static {
    /// Answer a request instead of the default handler. `None` falls
    /// through to the default.
    async fn intercept(
        &self,
        _op: &OpServer,
        _endpoint: Endpoint,
        _request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        Ok(None)
    }

    /// Modify ID token claims before signing.
    fn adjust_claims(&self, _op: &OpServer, _claims: &mut Map<String, Value>) {}

    /// Produce the serialized ID token. `None` uses the default signer.
    fn sign_id_token(&self, _op: &OpServer, _claims: &Value) -> Result<Option<String>, ActorError> {
        Ok(None)
    }
}

/// Honest baseline without any override.
pub struct DefaultOp;

impl OpScenario for DefaultOp {}

/// Shared scenario, e.g. to inspect its state while it serves requests.
#[async_trait]
impl<T: OpScenario> OpScenario for Arc<T> {
    async fn intercept(
        &self,
        op: &OpServer,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<Option<ActorResponse>, ActorError> {
        self.as_ref().intercept(op, endpoint, request).await
    }

    fn adjust_claims(&self, op: &OpServer, claims: &mut Map<String, Value>) {
        self.as_ref().adjust_claims(op, claims)
    }

    fn sign_id_token(&self, op: &OpServer, claims: &Value) -> Result<Option<String>, ActorError> {
        self.as_ref().sign_id_token(op, claims)
    }
}

/// Simulated OpenID provider playing OP1 (honest) or OP2 (evil).
pub struct OpServer {
    env: ActorEnv,
    slot: RoleSlot,
    scenario: Box<dyn OpScenario>,
}

impl OpServer {
    pub fn new(env: ActorEnv, slot: RoleSlot, scenario: Box<dyn OpScenario>) -> Self {
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

    /// `<host>[/<enforce-fragment>]/<test-id>` of the given role.
    pub fn issuer(&self, role: Role) -> String {
        let host = role.pick(&self.env.hosts.honest_op_url, &self.env.hosts.evil_op_url);
        match self.env.step.get(REGISTRATION_FRAGMENT) {
            Some(fragment) => format!("{}/{}/{}", host, fragment, self.env.test_id),
            None => format!("{}/{}", host, self.env.test_id),
        }
    }

    pub fn endpoint_url(&self, role: Role, endpoint: Endpoint) -> String {
        format!("{}{}", self.issuer(role), endpoint.path())
    }

    fn honest_if(&self, param: &str) -> Role {
        if self.env.params.bool(param) {
            Role::Honest
        } else {
            self.role()
        }
    }

    pub fn metadata(&self) -> ProviderMetadata {
        let role = self.role();
        let strings = |v: &[&str]| -> Option<Vec<String>> {
            Some(v.iter().map(|s| s.to_string()).collect())
        };
        ProviderMetadata {
            issuer: self.issuer(self.honest_if(params::FORCE_HONEST_DISCOVERY_ISS)),
            authorization_endpoint: self.endpoint_url(role, Endpoint::Authorization),
            token_endpoint: self.endpoint_url(
                self.honest_if(params::FORCE_HONEST_DISCOVERY_TOKEN_EP),
                Endpoint::Token,
            ),
            userinfo_endpoint: Some(self.endpoint_url(
                self.honest_if(params::FORCE_HONEST_DISCOVERY_USERINFO_EP),
                Endpoint::UserInfo,
            )),
            jwks_uri: self.endpoint_url(role, Endpoint::Jwks),
            registration_endpoint: Some(self.endpoint_url(role, Endpoint::Registration)),
            scopes_supported: strings(&["openid", "name", "preferred_username", "email"]),
            response_types_supported: strings(&[
                "code",
                "id_token",
                "token id_token",
                "code id_token token",
            ]),
            response_modes_supported: strings(&["query", "fragment", "form_post"]),
            grant_types_supported: strings(&["authorization_code", "implicit"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["EdDSA", "none"]),
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_basic",
                "client_secret_post",
            ]),
            claims_parameter_supported: Some(false),
        }
    }

    /// Client registered at this OP, if any. The honest registration lives
    /// in the suite context and survives steps.
    pub fn registered_client(&self) -> Option<ClientInfo> {
        match self.role() {
            Role::Honest => self.env.suite.get(OP_HONEST_CLIENT),
            Role::Evil => self.env.step.get(OP_EVIL_CLIENT),
        }
    }

    pub fn honest_client(&self) -> Option<ClientInfo> {
        self.env.suite.get(OP_HONEST_CLIENT)
    }

    fn user_claims(&self) -> Map<String, Value> {
        let mut claims = user_identity(self.role());
        let sub = user_identity(self.honest_if(params::FORCE_HONEST_TOKEN_SUB))["sub"].clone();
        claims.insert("sub".to_string(), sub);
        claims
    }

    /// Claims of an ID token issued to `client_id`, honoring the token
    /// manipulation parameters.
    pub fn id_token_claims(
        &self,
        client_id: Option<&str>,
        nonce: Option<&str>,
        access_token: Option<&str>,
        code: Option<&str>,
    ) -> Result<Map<String, Value>, ActorError> {
        let params = &self.env.params;
        let mut claims = self.user_claims();

        let iss = self.issuer(self.honest_if(params::FORCE_HONEST_TOKEN_ISS));
        claims.insert("iss".to_string(), json!(iss));

        let aud = if params.bool(params::FORCE_TOKEN_AUD_INVALID) {
            Some(gen_random_string(16)?)
        } else {
            client_id.map(str::to_string)
        };
        if let Some(aud) = aud {
            claims.insert("aud".to_string(), json!(aud));
        }

        let now = Utc::now();
        let mut exp = now + Duration::minutes(15);
        if params.bool(params::FORCE_TOKEN_EXP_DAY) {
            self.env.logger.log("Setting exp to -1 day + 15min.");
            exp -= Duration::days(1);
        }
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert("exp".to_string(), json!(exp.timestamp()));

        if let Some(nonce) = nonce {
            claims.insert("nonce".to_string(), json!(nonce));
        }
        if let Some(at) = access_token {
            claims.insert("at_hash".to_string(), json!(half_hash(at)));
        }
        if let Some(code) = code {
            claims.insert("c_hash".to_string(), json!(half_hash(code)));
        }
        Ok(claims)
    }

    /// Build, adjust and sign an ID token.
    pub fn issue_id_token(
        &self,
        client_id: Option<&str>,
        nonce: Option<&str>,
        access_token: Option<&str>,
        code: Option<&str>,
    ) -> Result<String, ActorError> {
        let mut claims = self.id_token_claims(client_id, nonce, access_token, code)?;
        self.scenario.adjust_claims(self, &mut claims);
        let claims = Value::Object(claims);

        let token = match self.scenario.sign_id_token(self, &claims)? {
            Some(token) => token,
            None => self.default_sign(&claims)?,
        };

        if let Ok(header) = keys::decode_header_json(&token) {
            self.env
                .logger
                .log_code_block("Generated id_token header:", header.to_string());
        }
        Ok(token)
    }

    fn default_sign(&self, claims: &Value) -> Result<String, ActorError> {
        if self.env.params.bool(params::FORCE_TOKEN_SIG_NONE) {
            self.env.logger.log("Issuing unsigned id_token.");
            return Ok(keys::unsigned_token(claims));
        }
        let key = keys::signing_key(KeyKind::from(self.role()))?;
        let token = key.sign(&key.header(), claims)?;
        if self.env.params.bool(params::FORCE_TOKEN_SIG_INVALID) {
            self.env.logger.log("Invalidating id_token signature.");
            return keys::corrupt_signature(&token);
        }
        Ok(token)
    }

    pub fn webfinger(&self, request: &ActorRequest) -> Result<ActorResponse, ActorError> {
        let (Some(rel), Some(resource)) = (request.param("rel"), request.param("resource")) else {
            return Ok(ActorResponse::text(
                StatusCode::NOT_FOUND,
                "Missing webfinger parameters in request.",
            ));
        };
        if rel != ISSUER_REL {
            return Ok(ActorResponse::text(
                StatusCode::NOT_FOUND,
                "Unsupported webfinger relation.",
            ));
        }
        let href = if resource.contains(ENFORCE_REGISTRATION_PREFIX) {
            resource.to_string()
        } else {
            self.issuer(self.role())
        };
        Ok(ActorResponse::ok_json(&json!({
            "subject": resource,
            "links": [{ "rel": ISSUER_REL, "href": href }],
        })))
    }

    pub fn discovery(&self) -> Result<ActorResponse, ActorError> {
        let metadata = serde_json::to_value(self.metadata())?;
        Ok(ActorResponse::ok_json(&metadata))
    }

    pub fn jwks(&self) -> Result<ActorResponse, ActorError> {
        let key = keys::signing_key(KeyKind::from(self.role()))?;
        Ok(ActorResponse::ok_json(&keys::jwk_set(&[key])))
    }

    fn registration_client_id(&self) -> Result<String, ActorError> {
        if self.env.params.bool(params::FORCE_REGISTER_HONEST_CLIENTID) {
            match self.honest_client() {
                Some(client) if !client.client_id.is_empty() => {
                    self.env
                        .logger
                        .log(format!("Re-using client ID: {}", client.client_id));
                    return Ok(client.client_id);
                }
                _ => self.env.logger.log("ClientId at Honest OP could not be found."),
            }
        }
        Ok(format!("client-{}", gen_random_string(12)?))
    }

    pub fn registration(&self, request: &ActorRequest) -> Result<ActorResponse, ActorError> {
        if let Some(client) = self.registered_client() {
            self.env.logger.log("Client already registered.");
            return Ok(ActorResponse::json(
                StatusCode::CREATED,
                &serde_json::to_value(client)?,
            ));
        }

        let metadata: Value = match request.json_body() {
            Ok(value) => value,
            Err(e) => {
                return Ok(ActorResponse::oauth_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_client_metadata",
                    &e.to_string(),
                ));
            }
        };
        let redirect_uris: Vec<String> = metadata
            .get("redirect_uris")
            .and_then(Value::as_array)
            .map(|uris| {
                uris.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if redirect_uris.is_empty() {
            return Ok(ActorResponse::oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_redirect_uri",
                "redirect_uris missing",
            ));
        }

        let client = ClientInfo {
            client_id: self.registration_client_id()?,
            client_secret: Some(gen_random_string(24)?),
            client_name: metadata
                .get("client_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            redirect_uris,
            client_id_issued_at: Some(Utc::now().timestamp()),
        };
        match self.role() {
            Role::Honest => self.env.suite.insert(OP_HONEST_CLIENT, client.clone()),
            Role::Evil => self.env.step.insert(OP_EVIL_CLIENT, client.clone()),
        }
        self.env.logger.log("Returning Client Information Response.");
        Ok(ActorResponse::json(
            StatusCode::CREATED,
            &serde_json::to_value(client)?,
        ))
    }

    pub fn authorization(&self, request: &ActorRequest) -> Result<ActorResponse, ActorError> {
        let response_type = request
            .param("response_type")
            .ok_or_else(|| ActorError::Protocol("Missing response_type".to_string()))?;
        let redirect_uri = request
            .param("redirect_uri")
            .ok_or_else(|| ActorError::Protocol("Missing redirect_uri".to_string()))?;
        let client_id = request.param("client_id");
        let state = request.param("state");
        let nonce = request.param("nonce");
        let scope = request.param("scope").unwrap_or_default();
        let types: Vec<&str> = response_type.split_whitespace().collect();

        if !scope.split_whitespace().any(|s| s == "openid") {
            self.env.logger.log(
                "TestStep prerequisites not fulfilled: Scope 'openid' not requested by client.",
            );
            let mut error = vec![("error", "server_error".to_string())];
            if let Some(state) = state {
                error.push(("state", state.to_string()));
            }
            return Ok(ActorResponse::redirect(&append_params(
                redirect_uri,
                '?',
                &error,
            )));
        }

        let mut out: Vec<(&str, String)> = Vec::new();

        let code = if types.contains(&"code") {
            let code = gen_random_string(16)?;
            if self.role() == Role::Honest {
                self.env.step.insert(HONEST_CODE, code.clone());
            }
            out.push(("code", code.clone()));
            Some(code)
        } else {
            None
        };

        let access_token = if types.contains(&"token") {
            let at = gen_random_string(24)?;
            if self.role() == Role::Honest {
                self.env.step.insert(HONEST_ACCESS_TOKEN, at.clone());
            }
            out.push(("access_token", at.clone()));
            out.push(("token_type", "Bearer".to_string()));
            Some(at)
        } else {
            None
        };

        if types.contains(&"id_token") {
            let id_token =
                self.issue_id_token(client_id, nonce, access_token.as_deref(), code.as_deref())?;
            out.push(("id_token", id_token));
        }
        if let Some(state) = state {
            out.push(("state", state.to_string()));
        }
        if let Some(nonce) = nonce {
            self.env.step.insert(AUTH_REQ_NONCE, nonce.to_string());
        }

        let default_mode = if types == ["code"] { "query" } else { "fragment" };
        let response = match request.param("response_mode").unwrap_or(default_mode) {
            "form_post" => ActorResponse::html(StatusCode::OK, form_post_page(redirect_uri, &out)),
            "query" => ActorResponse::redirect(&append_params(redirect_uri, '?', &out)),
            _ => ActorResponse::redirect(&append_params(redirect_uri, '#', &out)),
        };
        self.env.logger.log("Returning default Authorization Response.");
        Ok(response)
    }

    pub fn token(&self, request: &ActorRequest) -> Result<ActorResponse, ActorError> {
        let client_id = request
            .client_id()
            .ok_or_else(|| ActorError::Protocol("Missing client authentication".to_string()))?;
        let code = match request.param("grant_type") {
            Some("authorization_code") => Some(
                request
                    .param("code")
                    .ok_or_else(|| ActorError::Protocol("Missing code".to_string()))?,
            ),
            Some(_) => None,
            None => return Err(ActorError::Protocol("Missing grant_type".to_string())),
        };
        self.env.step.insert(TOKEN_REQUEST_RECEIVED, self.role());

        let access_token = gen_random_string(24)?;
        if self.role() == Role::Honest {
            self.env
                .step
                .insert(HONEST_ACCESS_TOKEN, access_token.clone());
        }
        let nonce = self.env.step.get(AUTH_REQ_NONCE);
        let id_token = self.issue_id_token(
            Some(client_id.as_str()),
            nonce.as_deref(),
            Some(&access_token),
            code,
        )?;

        let body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600,
            "id_token": id_token,
        });
        self.env.logger.log(format!("{}OP is returning Token Response.", self.role()));
        Ok(ActorResponse::ok_json(&body).with_header(CACHE_CONTROL, "no-store"))
    }

    pub fn userinfo(&self, request: &ActorRequest) -> Result<ActorResponse, ActorError> {
        if request.bearer_token().is_none() {
            return Ok(ActorResponse::oauth_error(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Missing access token",
            )
            .with_header(WWW_AUTHENTICATE, "Bearer"));
        }
        self.env.step.insert(USERINFO_REQUEST_RECEIVED, self.role());
        self.env
            .logger
            .log(format!("{}OP is returning User Info Response.", self.role()));
        Ok(ActorResponse::ok_json(&Value::Object(self.user_claims())))
    }

    /// Verdict of a token request in the code replay scenarios: FAIL when
    /// the evil OP is handed the honest code, PASS otherwise.
    pub fn code_replay_verdict(&self, request: &ActorRequest) -> Result<Verdict, ActorError> {
        request
            .client_id()
            .ok_or_else(|| ActorError::Protocol("Missing client authentication".to_string()))?;
        let grant_type = request
            .param("grant_type")
            .ok_or_else(|| ActorError::Protocol("Missing grant_type".to_string()))?;

        if self.role() == Role::Evil && grant_type == "authorization_code" {
            let code = request
                .param("code")
                .ok_or_else(|| ActorError::Protocol("Missing code".to_string()))?;
            if self.env.step.get(HONEST_CODE).as_deref() == Some(code) {
                self.env.logger.log("Honest code received in attacker.");
                return Ok(Verdict::Fail);
            }
            self.env.logger.log("Honest code not received in attacker.");
        }
        Ok(Verdict::Pass)
    }

    pub fn untrusted_key(&self) -> Result<ActorResponse, ActorError> {
        self.env.logger.log("Unexpected untrusted key request received.");
        Ok(ActorResponse::new(StatusCode::NOT_IMPLEMENTED))
    }

    /// Default handler of `endpoint`, bypassing the scenario.
    pub fn default_handle(
        &self,
        endpoint: Endpoint,
        request: &ActorRequest,
    ) -> Result<ActorResponse, ActorError> {
        match endpoint {
            Endpoint::Webfinger => self.webfinger(request),
            Endpoint::Discovery => self.discovery(),
            Endpoint::Jwks => self.jwks(),
            Endpoint::Registration => self.registration(request),
            Endpoint::Authorization => self.authorization(request),
            Endpoint::Token => self.token(request),
            Endpoint::UserInfo => self.userinfo(request),
            Endpoint::UntrustedKey => self.untrusted_key(),
            Endpoint::Callback => Ok(ActorResponse::new(StatusCode::NOT_FOUND)),
        }
    }
}

#[async_trait]
impl ServerBehavior for OpServer {
    async fn handle(
        &self,
        endpoint: Endpoint,
        request: ActorRequest,
    ) -> Result<ActorResponse, ActorError> {
        if let Some(response) = self.scenario.intercept(self, endpoint, &request).await? {
            return Ok(response);
        }
        self.default_handle(endpoint, &request)
    }
}

/// Identity claims of the test user at the OP of `role`.
pub(crate) fn user_identity(role: Role) -> Map<String, Value> {
    let (sub, name, username, email) = role.pick(
        ("honest-op-test-subject", "Honest User", "honest-user-name", "user@honest.com"),
        ("evil-op-test-subject", "Evil User", "evil-user-name", "user@evil.com"),
    );
    let mut claims = Map::new();
    claims.insert("sub".to_string(), json!(sub));
    claims.insert("name".to_string(), json!(name));
    claims.insert("preferred_username".to_string(), json!(username));
    claims.insert("email".to_string(), json!(email));
    claims
}

fn append_params(base: &str, separator: char, pairs: &[(&str, String)]) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    let separator = match separator {
        '?' if base.contains('?') => '&',
        other => other,
    };
    format!("{base}{separator}{encoded}")
}

fn form_post_page(action: &str, pairs: &[(&str, String)]) -> String {
    let inputs: String = pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
                html_escape(k),
                html_escape(v)
            )
        })
        .collect();
    format!(
        "<!DOCTYPE html><html><head><title>Form post</title></head>\
         <body onload=\"javascript:document.forms[0].submit()\">\
         <form method=\"post\" action=\"{}\">{}</form></body></html>",
        html_escape(action),
        inputs
    )
}
