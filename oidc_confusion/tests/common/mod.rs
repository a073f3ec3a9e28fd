pub mod fixtures;
pub mod in_process_browser;
pub mod mock_op;
pub mod mock_rp;

pub use fixtures::*;
pub use in_process_browser::InProcessBrowser;
pub use mock_op::{MockOp, MockOpOptions};
pub use mock_rp::{MockRp, MockRpOptions};
