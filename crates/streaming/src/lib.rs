pub mod cache;
pub mod error;
pub mod record;
pub mod request;
pub mod source;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::*;
pub use error::*;
pub use record::*;
pub use request::*;
pub use source::*;
