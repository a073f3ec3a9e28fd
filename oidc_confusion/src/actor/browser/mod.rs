//! Simulated user agents driving the system under test.

mod driver;
mod idp_confusion;
mod information_leak;
mod invalid_state;
mod key_confusion;
mod op_code_reuse;
mod op_learning;
mod op_login;
mod op_rum;
mod rp_default;
mod rp_learning;
mod session;
mod session_key_confusion;
mod session_overwriting;
mod sub_claim_spoofing;
mod token_substitution;
mod webdriver;

pub use driver::{BrowserCookie, BrowserDriver, DriverFactory, NoBrowser};
pub use idp_confusion::IdpConfusionRpBrowser;
pub use information_leak::InformationLeakRpBrowser;
pub use invalid_state::InvalidStateRpBrowser;
pub use key_confusion::KeyConfusionRpBrowser;
pub use op_code_reuse::OpCodeReuseBrowser;
pub use op_learning::OpLearningBrowser;
pub use op_rum::OpRumBrowser;
pub use rp_default::DefaultRpBrowser;
pub use rp_learning::RpLearningBrowser;
pub use session_key_confusion::SessionKeyConfusionRpBrowser;
pub use session_overwriting::SessionOverwritingRpBrowser;
pub use sub_claim_spoofing::SubClaimSpoofingOpBrowser;
pub use token_substitution::TokenSubstitutionRpBrowser;
pub use webdriver::WebDriverFactory;

#[cfg(test)]
pub(crate) use driver::testing;
