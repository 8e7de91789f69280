use std::fmt;
use std::sync::Arc;

use scene::MapHost;

/// Identifier the host registers a custom layer under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(Arc<str>);

impl LayerId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the host composites the layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RenderingMode {
    /// Drawn into the host's pass, sharing its depth buffer.
    #[default]
    ThreeD,
    TwoD,
}

/// Per-frame arguments from the host's render callback.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct RenderArgs {
    /// Column-major projection from projected space to clip space.
    pub projection: Option<[f64; 16]>,
}

impl RenderArgs {
    pub fn new(projection: [f64; 16]) -> Self {
        Self {
            projection: Some(projection),
        }
    }
}

/// Callbacks a map host drives on a custom layer.
///
/// `on_add` comes first and at most once, `render` any number of times
/// after it, and `on_remove` last. `on_camera_settled` is driven by the
/// embedder from the host's move-end and terrain-change events.
pub trait CustomLayer {
    /// Rendering resources the host hands over on attach.
    type Context;

    fn id(&self) -> &LayerId;

    fn rendering_mode(&self) -> RenderingMode {
        RenderingMode::ThreeD
    }

    fn on_add(&mut self, host: &dyn MapHost, context: Self::Context);

    fn render(&mut self, host: &dyn MapHost, args: &RenderArgs);

    fn on_camera_settled(&mut self, host: &dyn MapHost);

    fn on_remove(&mut self, host: &dyn MapHost);
}
