//! Entry point for requests addressed to simulated actors.

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::StatusCode,
    response::Response,
};
use oidc_confusion::{ActorResponse, Harness};

use super::config::OIDC_CONFUSION_MAX_BODY_BYTES;
use super::error::IntoResponseError;

/// Every path not claimed by another router is an actor request.
pub(super) fn router(harness: Harness) -> Router {
    Router::new().fallback(dispatch).with_state(harness)
}

async fn dispatch(
    State(harness): State<Harness>,
    request: Request,
) -> Result<Response, (StatusCode, String)> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, *OIDC_CONFUSION_MAX_BODY_BYTES)
        .await
        .map_err(|e| (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()))?;

    tracing::debug!("Actor request {} {}", parts.method, parts.uri);
    let request = http::Request::from_parts(parts, body.to_vec());
    let response = harness.dispatch(request).await.into_response_error()?;
    Ok(into_response(response))
}

fn into_response(actor: ActorResponse) -> Response {
    let mut response = Response::new(Body::from(actor.body));
    *response.status_mut() = actor.status;
    *response.headers_mut() = actor.headers;
    response
}
