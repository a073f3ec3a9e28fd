//! OpenID provider under test, served by axum on an ephemeral port.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use super::fixtures::CONTROLLER_URI;

#[derive(Debug, Clone, Default)]
pub struct MockOpOptions {
    /// Issue tokens for an already redeemed code.
    pub allow_code_reuse: bool,
    /// Redeem codes for any client, not only the one they were issued to.
    pub ignore_code_binding: bool,
    /// Answer every login with `error=access_denied`.
    pub deny_logins: bool,
    /// Grant token served at `/.professos`, `None` for no grant resource.
    pub grant: Option<String>,
}

impl MockOpOptions {
    pub fn granted() -> Self {
        Self {
            grant: Some(CONTROLLER_URI.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct IssuedCode {
    user: String,
    client_id: String,
}

#[derive(Clone)]
pub struct MockOp {
    pub base: String,
    options: MockOpOptions,
    codes: Arc<Mutex<HashMap<String, IssuedCode>>>,
    redeemed: Arc<Mutex<HashSet<String>>>,
    pub token_requests: Arc<Mutex<Vec<String>>>,
    pub registrations: Arc<Mutex<Vec<Value>>>,
}

impl MockOp {
    pub async fn start(options: MockOpOptions) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock OP");
        let addr = listener.local_addr().expect("No local address");
        let op = MockOp {
            base: format!("http://{addr}"),
            options,
            codes: Arc::default(),
            redeemed: Arc::default(),
            token_requests: Arc::default(),
            registrations: Arc::default(),
        };

        let app = Router::new()
            .route("/.professos", get(grant))
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/register", post(register))
            .route("/authorize", get(authorize))
            .route("/token", post(token))
            .route("/userinfo", get(userinfo))
            .with_state(op.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock OP failed");
        });
        op
    }
}

async fn grant(State(op): State<MockOp>) -> Response {
    match op.options.grant {
        Some(grant) => grant.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn discovery(State(op): State<MockOp>) -> Json<Value> {
    Json(json!({
        "issuer": op.base,
        "authorization_endpoint": format!("{}/authorize", op.base),
        "token_endpoint": format!("{}/token", op.base),
        "userinfo_endpoint": format!("{}/userinfo", op.base),
        "jwks_uri": format!("{}/jwks", op.base),
        "registration_endpoint": format!("{}/register", op.base),
    }))
}

async fn register(State(op): State<MockOp>, Json(body): Json<Value>) -> Json<Value> {
    let mut registrations = op.registrations.lock().unwrap();
    registrations.push(body.clone());
    let n = registrations.len();
    Json(json!({
        "client_id": format!("client-{n}"),
        "client_secret": format!("secret-{n}"),
        "redirect_uris": body["redirect_uris"],
    }))
}

async fn authorize(
    State(op): State<MockOp>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (Some(redirect_uri), Some(user)) = (params.get("redirect_uri"), params.get("user")) else {
        return Html("<form><input name=\"user\"></form>").into_response();
    };
    let state = params.get("state").cloned().unwrap_or_default();
    if op.options.deny_logins {
        return Redirect::to(&format!("{redirect_uri}?error=access_denied&state={state}"))
            .into_response();
    }

    let mut codes = op.codes.lock().unwrap();
    let code = format!("code-{}-{}", user, codes.len() + 1);
    codes.insert(
        code.clone(),
        IssuedCode {
            user: user.clone(),
            client_id: params.get("client_id").cloned().unwrap_or_default(),
        },
    );
    Redirect::to(&format!("{redirect_uri}?code={code}&state={state}")).into_response()
}

fn basic_client_id(headers: &HeaderMap) -> Option<String> {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let decoded = STANDARD.decode(value.strip_prefix("Basic ")?).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    decoded.split_once(':').map(|(id, _)| id.to_string())
}

async fn token(
    State(op): State<MockOp>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let invalid_grant =
        || (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))).into_response();
    let code = form.get("code").cloned().unwrap_or_default();
    op.token_requests.lock().unwrap().push(code.clone());

    let Some(issued) = op.codes.lock().unwrap().get(&code).cloned() else {
        return invalid_grant();
    };
    let client_id = basic_client_id(&headers).unwrap_or_default();
    if !op.options.ignore_code_binding && client_id != issued.client_id {
        return invalid_grant();
    }
    let first_use = op.redeemed.lock().unwrap().insert(code.clone());
    if !first_use && !op.options.allow_code_reuse {
        return invalid_grant();
    }

    Json(json!({
        "access_token": format!("at-{code}"),
        "token_type": "Bearer",
        "id_token": format!("eyJhbGciOiJub25lIn0.{}.", issued.user),
        "expires_in": 3600,
    }))
    .into_response()
}

async fn userinfo(State(op): State<MockOp>, headers: HeaderMap) -> Response {
    let code = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer at-"))
        .unwrap_or_default()
        .to_string();
    match op.codes.lock().unwrap().get(&code) {
        Some(issued) => Json(json!({
            "sub": format!("sub-{}", issued.user),
            "preferred_username": issued.user,
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
