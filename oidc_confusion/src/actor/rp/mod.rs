//! Simulated relying parties.

mod code_reuse;
mod pkce;
mod redirect_uri;
mod server;
mod sub_claim;

pub use code_reuse::CodeReuseRp;
pub use pkce::PkceRp;
pub use redirect_uri::RedirectUriManipulationRp;
pub use server::{AuthResponse, DefaultRp, RpScenario, RpServer};
pub use sub_claim::SubClaimSpoofingRp;
pub(crate) use sub_claim::{USER1_ID_TOKEN_VAR, USER1_SUB_VAR, USER2_SUB_VAR};
