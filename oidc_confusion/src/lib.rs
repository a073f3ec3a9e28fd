//! oidc_confusion - Orchestration core of an OpenID Connect protocol-confusion
//! testing harness
//!
//! The harness plays the counterpart of a system under test: two simulated
//! OpenID providers when a relying party is tested, two simulated relying
//! parties when a provider is tested, plus a simulated browser driving the
//! login. Each test step wires these actors up, lets them rendezvous through
//! a shared step context and reports a single verdict.

mod actor;
mod barrier;
mod config;
mod context;
mod harness;
mod logger;
mod plan;
mod registry;
mod route;
mod runner;
mod test_object;
mod types;
mod utils;
mod verdict;

pub use actor::{
    ActorError, ActorInstance, ActorRequest, ActorResponse, BehaviorCatalog, BrowserBehavior,
    BrowserCookie, BrowserDriver, BrowserFactory, DriverFactory, Endpoint, NoBrowser,
    ServerBehavior, ServerFactory, WebDriverFactory,
};
pub use actor::ActorEnv;
pub use actor::op::{KEY_CONFUSION_ITERATIONS, KeyConfusionOp, OpScenario, OpServer};
pub use barrier::{Barrier, BarrierError};
pub use config::{HOSTS, HostConfig, OIDC_CONFUSION_WEBDRIVER_URL, TIMEOUTS, Timeouts};
pub use harness::{Harness, HarnessOptions};
pub use logger::{LogContent, LogEntry, StepLogger};
pub use plan::{BehaviorSpec, PlanError, PlanKind, TestPlan, TestPlans, TestStep};
pub use registry::{InstanceRegistry, RegistryError};
pub use route::{ActorRoute, RouteError};
pub use runner::{RunnerConfig, RunnerError, StepExecutor, StepRun};
pub use test_object::{
    ExposedActor, ExposedEndpoints, StepResult, TestObject, TestObjectError, TestObjectExport,
    TestObjectRegistry, TestReport,
};
pub use types::{
    ENFORCE_REGISTRATION_PREFIX, OpTestConfig, Role, RoleSlot, RpTestConfig, TestConfig, TestId,
};
pub use utils::UtilError;
pub use verdict::{Verdict, worst};
