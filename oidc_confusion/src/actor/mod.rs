//! Ephemeral counterpart servers and simulated browsers.

mod behavior;
pub mod browser;
mod catalog;
mod env;
mod errors;
mod keys;
pub mod op;
pub mod rp;
mod types;

pub use behavior::{ActorInstance, BrowserBehavior, ServerBehavior};
pub use browser::{BrowserCookie, BrowserDriver, DriverFactory, NoBrowser, WebDriverFactory};
pub use catalog::{BehaviorCatalog, BrowserFactory, ServerFactory};
pub use env::ActorEnv;
pub use errors::ActorError;
pub use keys::{decode_claims_json, decode_header_json};
pub use types::{
    ActorParams, ActorRequest, ActorResponse, ClientInfo, Endpoint, IssuedTokens,
    ProviderMetadata,
};

#[cfg(test)]
pub(crate) use env::test_support;
