use std::sync::Arc;

use formats::PreparedAsset;
use foundation::ids::AssetUrl;
use glam::Vec3;

use crate::error::AssetLoadError;

/// Load lifecycle of one asset URL.
///
/// `Pending` moves to `Ready` or `Failed` exactly once. Neither terminal state
/// is left again except by dropping the record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AssetRecord {
    url: AssetUrl,
    state: LoadState,
    asset: Option<Arc<PreparedAsset>>,
    origin_offset: Option<Vec3>,
    error: Option<String>,
}

impl AssetRecord {
    pub(crate) fn pending(url: AssetUrl) -> Self {
        Self {
            url,
            state: LoadState::Pending,
            asset: None,
            origin_offset: None,
            error: None,
        }
    }

    /// Applies a load result. Returns `false` (and changes nothing) unless the
    /// record was still pending.
    pub(crate) fn complete(&mut self, result: Result<PreparedAsset, AssetLoadError>) -> bool {
        if self.state != LoadState::Pending {
            return false;
        }
        match result {
            Ok(asset) => {
                self.origin_offset = Some(asset.origin_offset());
                self.asset = Some(Arc::new(asset));
                self.state = LoadState::Ready;
            }
            Err(err) => {
                self.error = Some(err.to_string());
                self.state = LoadState::Failed;
            }
        }
        true
    }

    pub fn url(&self) -> &AssetUrl {
        &self.url
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    /// Geometry, present only when `Ready`.
    pub fn asset(&self) -> Option<&Arc<PreparedAsset>> {
        self.asset.as_ref()
    }

    pub fn origin_offset(&self) -> Option<Vec3> {
        self.origin_offset
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
