use thiserror::Error;

use crate::context::ContextError;
use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum ActorError {
    /// Bad or incompatible step parameters or test configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The target's current state does not allow running the step.
    #[error("Test not applicable: {0}")]
    NotApplicable(String),

    /// Unknown behavior identifier.
    #[error("Implementation load error: {0}")]
    ImplementationLoad(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Http error: {0}")]
    Http(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

impl ActorError {
    /// Errors that abort a step during preparation rather than during the run.
    pub fn is_preparation_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::NotApplicable(_) | Self::ImplementationLoad(_)
        )
    }
}

impl From<reqwest::Error> for ActorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ActorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ActorError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Crypto(err.to_string())
    }
}
