//! Relying party under test, served by axum on an ephemeral port.
//!
//! The simulated providers live at hosts nothing resolves, so every
//! back-channel request (discovery, registration, token, keys) goes through
//! the harness dispatcher instead of the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use oidc_confusion::{ActorResponse, Harness};
use serde_json::{Value, json};
use url::Url;

use super::fixtures::CONTROLLER_URI;

#[derive(Debug, Clone, Default)]
pub struct MockRpOptions {
    /// Redeem a code with the provider of the most recently started login
    /// instead of the first pending one.
    pub follow_latest_login: bool,
    /// Fetch ID token keys from the `jku` header when one is present.
    pub honor_jku: bool,
}

#[derive(Debug, Clone)]
struct Login {
    metadata: Value,
    client_id: String,
    client_secret: String,
}

#[derive(Clone)]
pub struct MockRp {
    pub base: String,
    options: MockRpOptions,
    harness: Harness,
    pending: Arc<Mutex<Vec<Login>>>,
    user: Arc<Mutex<Option<String>>>,
    /// Token endpoints a code was sent to.
    pub token_requests: Arc<Mutex<Vec<String>>>,
    /// Key set URLs fetched to validate ID tokens.
    pub key_requests: Arc<Mutex<Vec<String>>>,
    /// Reasons of rejected logins.
    pub failures: Arc<Mutex<Vec<String>>>,
}

impl MockRp {
    pub async fn start(harness: Harness, options: MockRpOptions) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock RP");
        let addr = listener.local_addr().expect("No local address");
        let rp = MockRp {
            base: format!("http://{addr}"),
            options,
            harness,
            pending: Arc::default(),
            user: Arc::default(),
            token_requests: Arc::default(),
            key_requests: Arc::default(),
            failures: Arc::default(),
        };

        let app = Router::new()
            .route("/.professos", get(|| async { CONTROLLER_URI }))
            .route("/login", get(login))
            .route("/callback", get(callback))
            .route("/welcome", get(welcome))
            .route("/error", get(|| async { Html("Login failed") }))
            .with_state(rp.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock RP failed");
        });
        rp
    }

    fn redirect_uri(&self) -> String {
        format!("{}/callback", self.base)
    }

    async fn send(&self, request: http::Request<Vec<u8>>) -> Result<ActorResponse, String> {
        let uri = request.uri().to_string();
        let response = self
            .harness
            .dispatch(request)
            .await
            .map_err(|e| format!("{uri}: {e}"))?;
        if !response.status.is_success() {
            return Err(format!("{uri} answered {}", response.status));
        }
        Ok(response)
    }

    async fn fetch_json(&self, request: http::Request<Vec<u8>>) -> Result<Value, String> {
        let response = self.send(request).await?;
        serde_json::from_slice(&response.body).map_err(|e| format!("Invalid JSON: {e}"))
    }

    async fn get_json(&self, url: &str) -> Result<Value, String> {
        let request = http::Request::get(url)
            .body(Vec::new())
            .map_err(|e| e.to_string())?;
        self.fetch_json(request).await
    }

    /// Discover and register with `issuer`, returning the authentication
    /// request to send the browser to.
    async fn start_login(&self, issuer: &str) -> Result<String, String> {
        let issuer = issuer.trim().trim_end_matches('/');
        let metadata = self
            .get_json(&format!("{issuer}/.well-known/openid-configuration"))
            .await?;

        let registration_endpoint = metadata["registration_endpoint"]
            .as_str()
            .ok_or("No registration endpoint")?;
        let body = json!({ "client_name": "mock rp", "redirect_uris": [self.redirect_uri()] });
        let request = http::Request::post(registration_endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string().into_bytes())
            .map_err(|e| e.to_string())?;
        let client = self.fetch_json(request).await?;
        let client_id = client["client_id"].as_str().ok_or("No client_id")?.to_string();
        let client_secret = client["client_secret"].as_str().unwrap_or_default().to_string();

        let authorization_endpoint = metadata["authorization_endpoint"]
            .as_str()
            .ok_or("No authorization endpoint")?;
        let mut url = Url::parse(authorization_endpoint).map_err(|e| e.to_string())?;

        let mut pending = self.pending.lock().unwrap();
        let n = pending.len() + 1;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", "openid")
            .append_pair("state", &format!("state-{n}"))
            .append_pair("nonce", &format!("nonce-{n}"));
        pending.push(Login {
            metadata,
            client_id,
            client_secret,
        });
        Ok(url.to_string())
    }

    /// Redeem the code of the callback and validate the ID token, returning
    /// the user's name.
    async fn finish_login(&self, params: &HashMap<String, String>) -> Result<String, String> {
        let code = params.get("code").ok_or("No code in the response")?;
        let login = {
            let mut pending = self.pending.lock().unwrap();
            let login = if self.options.follow_latest_login {
                pending.last().cloned()
            } else {
                pending.first().cloned()
            };
            pending.clear();
            login
        }
        .ok_or("No pending login")?;

        let token_endpoint = login.metadata["token_endpoint"]
            .as_str()
            .ok_or("No token endpoint")?;
        self.token_requests
            .lock()
            .unwrap()
            .push(token_endpoint.to_string());
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", &self.redirect_uri())
            .finish();
        let credentials = STANDARD.encode(format!("{}:{}", login.client_id, login.client_secret));
        let request = http::Request::post(token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .body(form.into_bytes())
            .map_err(|e| e.to_string())?;
        let tokens = self.fetch_json(request).await?;
        let id_token = tokens["id_token"].as_str().ok_or("No ID token")?;
        self.validate(&login, id_token).await
    }

    async fn validate(&self, login: &Login, id_token: &str) -> Result<String, String> {
        let header = jsonwebtoken::decode_header(id_token).map_err(|e| e.to_string())?;
        let kid = header.kid.ok_or("ID token has no kid")?;
        let key_url = match header.jku.filter(|_| self.options.honor_jku) {
            Some(jku) => jku,
            None => login.metadata["jwks_uri"]
                .as_str()
                .ok_or("No jwks_uri")?
                .to_string(),
        };
        self.key_requests.lock().unwrap().push(key_url.clone());

        let key_set = self.get_json(&key_url).await?;
        let x = key_set["keys"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|key| key["kid"] == kid.as_str())
            .and_then(|key| key["x"].as_str())
            .ok_or_else(|| format!("Unknown key {kid}"))?;
        let key = DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?;
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let data = jsonwebtoken::decode::<Value>(id_token, &key, &validation)
            .map_err(|e| e.to_string())?;
        Ok(data.claims["name"].as_str().unwrap_or_default().to_string())
    }
}

async fn login(State(rp): State<MockRp>, Query(params): Query<HashMap<String, String>>) -> Response {
    let Some(issuer) = params.get("user") else {
        return Html("<form><input name=\"user\"></form>").into_response();
    };
    match rp.start_login(issuer).await {
        Ok(location) => Redirect::to(&location).into_response(),
        Err(reason) => {
            rp.failures.lock().unwrap().push(reason);
            Redirect::to("/error").into_response()
        }
    }
}

async fn callback(
    State(rp): State<MockRp>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match rp.finish_login(&params).await {
        Ok(name) => {
            *rp.user.lock().unwrap() = Some(name);
            Redirect::to("/welcome").into_response()
        }
        Err(reason) => {
            rp.failures.lock().unwrap().push(reason);
            Redirect::to("/error").into_response()
        }
    }
}

async fn welcome(State(rp): State<MockRp>) -> Response {
    match rp.user.lock().unwrap().clone() {
        Some(name) => Html(format!("Welcome {name}")).into_response(),
        None => Redirect::to("/login").into_response(),
    }
}
