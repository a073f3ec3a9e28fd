use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PlanError {
    #[error("Failed to parse test plan {plan}: {message}")]
    Parse { plan: String, message: String },

    #[error("Test plan {plan}, step {step}: unknown implementation '{implementation}'")]
    UnknownImplementation {
        plan: String,
        step: String,
        implementation: String,
    },

    #[error("Test plan {plan} is invalid: {message}")]
    Invalid { plan: String, message: String },
}
