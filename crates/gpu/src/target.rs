use std::sync::Arc;

use formats::{LightRig, PreparedAsset};
use foundation::ids::{AssetUrl, FeatureId};
use glam::Mat4;
use runtime::frame::Frame;

/// One model to draw this frame.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub feature_id: FeatureId,
    pub asset_url: AssetUrl,
    pub asset: Arc<PreparedAsset>,
    /// Asset-local space straight to the host's clip space.
    pub mvp: Mat4,
}

/// Receives the draws composed for a frame.
///
/// Calls arrive as `begin_frame`, any number of `draw`, then `end_frame`.
/// `release` is called once when the overlay is removed from the host.
pub trait DrawTarget {
    fn begin_frame(&mut self, _frame: Frame) {}

    fn draw(&mut self, command: &DrawCommand);

    fn end_frame(&mut self) {}

    fn release(&mut self) {}
}

/// A draw target the overlay builds for itself when it is attached.
pub trait OverlayBackend: DrawTarget + Sized {
    /// Rendering resources the host hands over on attach.
    type Context;

    fn attach(context: Self::Context, lights: &LightRig) -> Self;
}
