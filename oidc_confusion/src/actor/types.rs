use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::errors::ActorError;

/// Logical protocol endpoints served by the ephemeral actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Webfinger,
    Discovery,
    Jwks,
    Registration,
    Authorization,
    Token,
    UserInfo,
    UntrustedKey,
    Callback,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Webfinger => "/.well-known/webfinger",
            Endpoint::Discovery => "/.well-known/openid-configuration",
            Endpoint::Jwks => "/jwks",
            Endpoint::Registration => "/register",
            Endpoint::Authorization => "/auth-req",
            Endpoint::Token => "/token-req",
            Endpoint::UserInfo => "/user-info",
            Endpoint::UntrustedKey => "/untrusted-key",
            Endpoint::Callback => "/callback",
        }
    }

    /// Endpoint served at `path` by an OP (`op == true`) or RP actor.
    pub fn from_path(path: &str, op: bool) -> Option<Self> {
        let endpoint = match path {
            "/.well-known/webfinger" => Endpoint::Webfinger,
            "/.well-known/openid-configuration" => Endpoint::Discovery,
            "/jwks" => Endpoint::Jwks,
            "/register" => Endpoint::Registration,
            "/auth-req" => Endpoint::Authorization,
            "/token-req" => Endpoint::Token,
            "/user-info" => Endpoint::UserInfo,
            "/untrusted-key" => Endpoint::UntrustedKey,
            "/callback" => Endpoint::Callback,
            _ => return None,
        };
        let served = match endpoint {
            Endpoint::Jwks => true,
            Endpoint::Callback => !op,
            _ => op,
        };
        served.then_some(endpoint)
    }
}

/// Inbound request handed to an actor, already stripped of host, test id
/// and registration fragment.
#[derive(Debug, Clone)]
pub struct ActorRequest {
    pub method: Method,
    /// Resource path, e.g. `/token-req`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// `<host>[/<enforce-fragment>]/<test-id>` the request was addressed to.
    pub base_url: String,
}

impl ActorRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            form: Vec::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            base_url: String::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Build from raw parts. A form body is decoded when the content type
    /// says so.
    pub fn from_parts(
        method: Method,
        path: &str,
        raw_query: Option<&str>,
        headers: HeaderMap,
        body: Vec<u8>,
        base_url: &str,
    ) -> Self {
        let query = raw_query.map(parse_urlencoded).unwrap_or_default();
        let is_form = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        let form = if is_form {
            parse_urlencoded(&String::from_utf8_lossy(&body))
        } else {
            Vec::new()
        };
        Self {
            method,
            path: path.to_string(),
            query,
            form,
            headers,
            body,
            base_url: base_url.to_string(),
        }
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_form(mut self, name: &str, value: &str) -> Self {
        self.form.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_json_body(mut self, value: &serde_json::Value) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = value.to_string().into_bytes();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Request line target: path plus re-encoded query.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        format!("{}?{}", self.path, encode_pairs(&self.query))
    }

    /// Parameter from the query, falling back to the form body.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .chain(self.form.iter())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Bearer token from the Authorization header or the `access_token`
    /// parameter.
    pub fn bearer_token(&self) -> Option<String> {
        let from_header = self
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.strip_prefix("Bearer ")
                    .or_else(|| v.strip_prefix("bearer "))
            })
            .map(|t| t.trim().to_string());
        from_header.or_else(|| self.param("access_token").map(str::to_string))
    }

    /// Client credentials from HTTP basic authentication.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let encoded = self
            .headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (id, secret) = decoded.split_once(':')?;
        let id = urlencoding::decode(id).ok()?.into_owned();
        let secret = urlencoding::decode(secret).ok()?.into_owned();
        Some((id, secret))
    }

    /// Client id from basic authentication or the `client_id` parameter.
    pub fn client_id(&self) -> Option<String> {
        self.basic_auth()
            .map(|(id, _)| id)
            .or_else(|| self.param("client_id").map(str::to_string))
    }

    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        serde_json::from_slice(&self.body).map_err(|e| ActorError::Protocol(e.to_string()))
    }
}

fn parse_urlencoded(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Response produced by an actor.
#[derive(Debug, Clone)]
pub struct ActorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ActorResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(value.to_string())
    }

    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::json(StatusCode::OK, value)
    }

    pub fn redirect(location: &str) -> Self {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                let mut resp = Self::new(StatusCode::FOUND);
                resp.headers.insert(LOCATION, value);
                resp
            }
            Err(_) => Self::oauth_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Invalid redirect location",
            ),
        }
    }

    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(CONTENT_TYPE, "text/html; charset=UTF-8")
            .with_header(CACHE_CONTROL, "no-cache, no-store")
            .with_body(body.into())
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(CONTENT_TYPE, "text/plain; charset=UTF-8")
            .with_body(body.into())
    }

    pub fn empty_ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// OAuth 2.0 error object.
    pub fn oauth_error(status: StatusCode, error: &str, description: &str) -> Self {
        Self::json(
            status,
            &serde_json::json!({
                "error": error,
                "error_description": description,
            }),
        )
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Registered client as returned by dynamic registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
}

/// OpenID provider metadata
/// https://openid.net/specs/openid-connect-discovery-1_0.html
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modes_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_types_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_parameter_supported: Option<bool>,
}

/// Token endpoint success response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// String parameters attached to one actor by the test plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorParams(HashMap<String, String>);

impl ActorParams {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// `true` only for a case-insensitive "true" value.
    pub fn bool(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl From<HashMap<String, String>> for ActorParams {
    fn from(params: HashMap<String, String>) -> Self {
        Self(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths_by_side() {
        assert_eq!(
            Endpoint::from_path("/token-req", true),
            Some(Endpoint::Token)
        );
        assert_eq!(Endpoint::from_path("/token-req", false), None);
        assert_eq!(
            Endpoint::from_path("/callback", false),
            Some(Endpoint::Callback)
        );
        assert_eq!(Endpoint::from_path("/callback", true), None);
        assert_eq!(Endpoint::from_path("/jwks", false), Some(Endpoint::Jwks));
        assert_eq!(Endpoint::from_path("/nope", true), None);
        assert_eq!(
            Endpoint::from_path(Endpoint::Discovery.path(), true),
            Some(Endpoint::Discovery)
        );
    }

    #[test]
    fn test_form_body_is_decoded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let req = ActorRequest::from_parts(
            Method::POST,
            "/token-req",
            Some("x=1"),
            headers,
            b"grant_type=authorization_code&code=a%2Bb".to_vec(),
            "http://op.test/t1",
        );

        assert_eq!(req.param("code"), Some("a+b"));
        assert_eq!(req.param("x"), Some("1"));
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn test_basic_auth_and_client_id() {
        let encoded = STANDARD.encode("client%3A1:s3cret");
        let req = ActorRequest::post("/token-req")
            .with_header(AUTHORIZATION, &format!("Basic {encoded}"))
            .with_form("client_id", "ignored");

        assert_eq!(
            req.basic_auth(),
            Some(("client:1".to_string(), "s3cret".to_string()))
        );
        assert_eq!(req.client_id().as_deref(), Some("client:1"));

        let plain = ActorRequest::post("/token-req").with_form("client_id", "abc");
        assert_eq!(plain.client_id().as_deref(), Some("abc"));
    }

    #[test]
    fn test_bearer_token_sources() {
        let header = ActorRequest::get("/user-info").with_header(AUTHORIZATION, "Bearer tok");
        assert_eq!(header.bearer_token().as_deref(), Some("tok"));

        let query = ActorRequest::get("/user-info").with_query("access_token", "q");
        assert_eq!(query.bearer_token().as_deref(), Some("q"));
    }

    #[test]
    fn test_redirect_response() {
        let resp = ActorResponse::redirect("https://rp.test/cb?code=1");
        assert_eq!(resp.status, StatusCode::FOUND);
        assert_eq!(resp.location(), Some("https://rp.test/cb?code=1"));

        let bad = ActorResponse::redirect("bad\nlocation");
        assert_eq!(bad.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_metadata_tolerates_missing_optionals() {
        let md: ProviderMetadata = serde_json::from_str(
            r#"{
                "issuer": "https://op.test",
                "authorization_endpoint": "https://op.test/auth",
                "token_endpoint": "https://op.test/token",
                "jwks_uri": "https://op.test/jwks"
            }"#,
        )
        .unwrap();
        assert!(md.registration_endpoint.is_none());
        let json = serde_json::to_value(&md).unwrap();
        assert!(json.get("userinfo_endpoint").is_none());
    }

    #[test]
    fn test_params_bool() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), "True".to_string());
        map.insert("b".to_string(), "yes".to_string());
        let params = ActorParams::new(map);
        assert!(params.bool("a"));
        assert!(!params.bool("b"));
        assert!(!params.bool("c"));
    }
}
