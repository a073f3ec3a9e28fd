//! Combined router for the control API and the simulated actors

use axum::Router;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use oidc_confusion::Harness;

use super::config::OIDC_CONFUSION_API_PREFIX;

/// Create the router serving the whole harness
///
/// The control API is nested under [`OIDC_CONFUSION_API_PREFIX`]; every other
/// request is dispatched to the actor registered for its host and path. Point
/// the controller and all four actor host names at this one listener.
pub fn oidc_confusion_router(harness: Harness) -> Router {
    oidc_confusion_router_no_trace(harness).layer(
        TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new()
                    .level(Level::INFO)
                    .include_headers(true),
            )
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            ),
    )
}

/// Same as [`oidc_confusion_router`] without the HTTP tracing middleware.
pub fn oidc_confusion_router_no_trace(harness: Harness) -> Router {
    Router::new()
        .nest(
            OIDC_CONFUSION_API_PREFIX.as_str(),
            super::control::router(harness.clone()),
        )
        .merge(super::dispatch::router(harness))
}
