//! Test step execution.

mod config;
mod errors;
mod executor;
mod grant;

pub use config::RunnerConfig;
pub use errors::RunnerError;
pub use executor::{StepExecutor, StepRun};
pub use grant::{grant_url, test_granted};

#[cfg(test)]
pub(crate) use config::test_support;
