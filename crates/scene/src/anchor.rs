use foundation::ids::{AssetUrl, FeatureId};
use foundation::math::GeoAnchor;

use crate::coords::AnchorTransform;

/// A model placed at one geographic feature.
///
/// Holds the asset by URL only; geometry is looked up in the asset cache at
/// draw time, so any number of instances can share one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorInstance {
    pub(crate) feature_id: FeatureId,
    pub(crate) anchor: GeoAnchor,
    pub(crate) transform: AnchorTransform,
    pub(crate) visible: bool,
    pub(crate) asset_url: AssetUrl,
    /// Visibility update in which the feature was last returned by a query.
    pub(crate) last_seen: u64,
}

impl AnchorInstance {
    pub fn feature_id(&self) -> &FeatureId {
        &self.feature_id
    }

    pub fn anchor(&self) -> &GeoAnchor {
        &self.anchor
    }

    pub fn transform(&self) -> AnchorTransform {
        self.transform
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn asset_url(&self) -> &AssetUrl {
        &self.asset_url
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}
