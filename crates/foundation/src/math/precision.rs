//! Camera-relative precision.
//!
//! Projected map coordinates at high zoom need more significant digits than
//! `f32` offers. Everything is kept in `f64` on the CPU and expressed relative
//! to a camera origin before anything is narrowed for the GPU.

use glam::{DMat4, DVec3};

/// Camera-relative precision model.
///
/// Store a high-precision `origin` (the camera center in projected space) and
/// express world positions relative to it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraRelative {
    pub origin: DVec3,
}

impl CameraRelative {
    pub fn new(origin: DVec3) -> Self {
        Self { origin }
    }

    /// World-space point relative to the origin, still in `f64`.
    #[inline]
    pub fn relative(self, world: DVec3) -> DVec3 {
        world - self.origin
    }

    /// Translation that moves camera-relative positions back to world space.
    pub fn offset_matrix(self) -> DMat4 {
        DMat4::from_translation(self.origin)
    }
}
