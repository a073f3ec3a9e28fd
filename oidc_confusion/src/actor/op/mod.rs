//! Simulated OpenID providers.

mod idp_confusion;
mod invalid_state;
mod key_confusion;
mod malicious_endpoint;
mod replay;
mod server;
mod session_key_confusion;
mod session_overwriting;
mod token_recipient;
mod userinfo_spoofing;

pub use idp_confusion::IdpConfusionOp;
pub use invalid_state::InvalidStateOp;
pub use key_confusion::{KEY_CONFUSION_ITERATIONS, KeyConfusionOp};
pub use malicious_endpoint::MaliciousEndpointOp;
pub use replay::ReplayOp;
pub use server::{DefaultOp, OpScenario, OpServer};
pub use session_key_confusion::SessionKeyConfusionOp;
pub use session_overwriting::SessionOverwritingOp;
pub use token_recipient::TokenRecipientConfusionOp;
pub use userinfo_spoofing::UserInfoIdSpoofingOp;
