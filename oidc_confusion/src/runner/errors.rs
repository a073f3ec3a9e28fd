use thiserror::Error;

use crate::actor::ActorError;
use crate::registry::RegistryError;
use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum RunnerError {
    /// The step could not be prepared, nothing was sent to the target.
    #[error("Step preparation failed: {0}")]
    Preparation(ActorError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

impl RunnerError {
    /// Log the error and return self.
    pub fn log(self) -> Self {
        match &self {
            Self::Preparation(e) => tracing::warn!("Step preparation failed: {}", e),
            Self::Actor(e) if e.is_preparation_error() => {
                tracing::warn!("Step not applicable: {}", e)
            }
            Self::Actor(e) => tracing::error!("Actor error: {}", e),
            Self::Registry(e) => tracing::error!("Registry error: {}", e),
            Self::Utils(e) => tracing::error!("Utils error: {}", e),
        }
        self
    }

    /// Message recorded in the step log.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Preparation(_) => "Test step preparation failed",
            Self::Actor(e) if e.is_preparation_error() => "Test step not applicable",
            _ => "Error while running the test step",
        }
    }
}
