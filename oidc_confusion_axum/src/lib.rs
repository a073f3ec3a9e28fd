//! oidc_confusion_axum - Axum integration for the oidc-confusion harness
//!
//! Two routers share one [`Harness`](oidc_confusion::Harness):
//! - the control API creating, configuring and running test objects
//! - the actor dispatcher answering every request addressed to a simulated
//!   OP or RP host

mod config;
mod control;
mod dispatch;
mod error;
mod router;

pub use config::{OIDC_CONFUSION_API_PREFIX, OIDC_CONFUSION_MAX_BODY_BYTES};
pub use error::IntoResponseError;
pub use router::{oidc_confusion_router, oidc_confusion_router_no_trace};

pub use oidc_confusion::{Harness, HarnessOptions};
