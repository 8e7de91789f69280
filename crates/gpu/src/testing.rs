//! Draw target that records instead of rendering.

use formats::LightRig;
use foundation::ids::{AssetUrl, FeatureId};
use glam::Mat4;
use runtime::frame::Frame;

use crate::target::{DrawCommand, DrawTarget, OverlayBackend};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub feature_id: FeatureId,
    pub asset_url: AssetUrl,
    pub mvp: Mat4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub frame: Frame,
    pub draws: Vec<RecordedDraw>,
    pub ended: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingTarget {
    pub frames: Vec<RecordedFrame>,
    pub released: bool,
    /// Lighting handed over on attach.
    pub lights: Option<LightRig>,
}

impl RecordingTarget {
    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }

    /// Feature ids drawn in the last frame.
    pub fn last_drawn(&self) -> Vec<&str> {
        self.last_frame()
            .map(|f| f.draws.iter().map(|d| d.feature_id.as_str()).collect())
            .unwrap_or_default()
    }
}

impl DrawTarget for RecordingTarget {
    fn begin_frame(&mut self, frame: Frame) {
        self.frames.push(RecordedFrame {
            frame,
            draws: Vec::new(),
            ended: false,
        });
    }

    fn draw(&mut self, command: &DrawCommand) {
        if let Some(frame) = self.frames.last_mut() {
            frame.draws.push(RecordedDraw {
                feature_id: command.feature_id.clone(),
                asset_url: command.asset_url.clone(),
                mvp: command.mvp,
            });
        }
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ended = true;
        }
    }

    fn release(&mut self) {
        self.released = true;
    }
}

impl OverlayBackend for RecordingTarget {
    type Context = ();

    fn attach(_context: (), lights: &LightRig) -> Self {
        Self {
            lights: Some(*lights),
            ..Self::default()
        }
    }
}
