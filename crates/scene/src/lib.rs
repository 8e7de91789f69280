pub mod anchor;
pub mod coords;
pub mod host;
pub mod visibility;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use anchor::*;
pub use coords::*;
pub use host::*;
pub use visibility::*;
