pub mod frame;
pub mod mailbox;
pub mod metrics;

pub use frame::*;
pub use mailbox::*;
pub use metrics::*;
