pub mod composer;
pub mod renderer;
pub mod target;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use composer::*;
pub use renderer::*;
pub use target::*;
