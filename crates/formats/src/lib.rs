pub mod asset;
pub mod config;
pub mod glb;
pub mod material;

pub use asset::*;
pub use config::*;
pub use glb::*;
pub use material::*;
