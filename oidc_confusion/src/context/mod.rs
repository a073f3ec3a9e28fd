mod errors;
pub mod keys;
mod types;

pub use errors::ContextError;
pub use types::{ContextKey, ContextMap, StepContext, SuiteContext};
