//! Host-facing overlay layer: wires the asset cache, visibility manager,
//! and frame composer behind the map's custom-layer callbacks.

pub mod layer;
pub mod overlay;

pub use layer::*;
pub use overlay::*;
