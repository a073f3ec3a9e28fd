use thiserror::Error;

use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum TestObjectError {
    #[error("Test object not found: {0}")]
    NotFound(String),

    #[error("No step named '{step}' in {plan}")]
    NoSuchStep { plan: String, step: String },

    #[error("Test object {test_id} is not a {expected} test")]
    WrongKind {
        test_id: String,
        expected: &'static str,
    },

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}
