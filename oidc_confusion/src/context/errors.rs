use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Context value missing: {0}")]
    Missing(String),

    #[error("Invalid context parameter '{name}': {value}")]
    InvalidParameter { name: String, value: String },
}
