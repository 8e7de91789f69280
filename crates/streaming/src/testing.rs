//! Test doubles for code that drives an [`AssetCache`](crate::AssetCache).

use std::sync::{Arc, Mutex, MutexGuard};

use formats::{DecodedScene, FlatMaterial, MeshPrimitive, PreparedAsset};
use foundation::ids::AssetUrl;

use crate::error::AssetLoadError;
use crate::request::{LoadRequest, LoadResult};
use crate::source::AssetSource;

#[derive(Debug, Default)]
struct Inner {
    requested: Vec<AssetUrl>,
    outstanding: Vec<LoadRequest>,
}

/// Source that records every request and completes only when told to.
///
/// Clones share state, so a test keeps one handle after giving another to
/// the cache.
#[derive(Debug, Clone, Default)]
pub struct ManualAssetSource {
    inner: Arc<Mutex<Inner>>,
}

impl ManualAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every URL ever passed to `load`, in order, duplicates included.
    pub fn requested(&self) -> Vec<AssetUrl> {
        self.lock().requested.clone()
    }

    /// Requests not yet completed.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.len()
    }

    /// Completes the oldest outstanding request for `url`.
    ///
    /// Returns `false` if there was none or the cache is gone.
    pub fn complete(&self, url: &AssetUrl, result: LoadResult) -> bool {
        let request = {
            let mut inner = self.lock();
            let Some(pos) = inner.outstanding.iter().position(|r| r.url() == url) else {
                return false;
            };
            inner.outstanding.remove(pos)
        };
        request.complete(result)
    }

    pub fn succeed(&self, url: &AssetUrl, asset: PreparedAsset) -> bool {
        self.complete(url, Ok(asset))
    }

    pub fn fail(&self, url: &AssetUrl, error: AssetLoadError) -> bool {
        self.complete(url, Err(error))
    }
}

impl AssetSource for ManualAssetSource {
    fn load(&self, request: LoadRequest) {
        let mut inner = self.lock();
        inner.requested.push(request.url().clone());
        inner.outstanding.push(request);
    }
}

/// A 2 x 2 x 1 m block authored off-center, already prepared.
pub fn block_asset() -> PreparedAsset {
    let positions = vec![
        [10.0, 10.0, 3.0],
        [12.0, 10.0, 3.0],
        [12.0, 12.0, 3.0],
        [10.0, 12.0, 4.0],
    ];
    let scene = DecodedScene {
        primitives: vec![MeshPrimitive::new(positions, vec![0, 1, 2, 0, 2, 3])],
    };
    PreparedAsset::prepare(scene, FlatMaterial::default())
}
