//! Test objects: one user-visible run of a test plan against one target.

mod errors;
mod object;
mod registry;
mod types;

pub use errors::TestObjectError;
pub use object::TestObject;
pub use registry::TestObjectRegistry;
pub use types::{ExposedActor, ExposedEndpoints, StepResult, TestObjectExport, TestReport};
