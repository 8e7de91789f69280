pub mod geo;
pub mod mercator;
pub mod precision;

pub use geo::*;
pub use mercator::*;
pub use precision::*;
