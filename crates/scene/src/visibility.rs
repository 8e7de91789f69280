//! Decides which features have a model instance and whether it is shown.
//!
//! Runs on camera-settle, never per frame. Instances are retired leniently:
//! a feature missing from one viewport query keeps its instance (queries
//! drop features along tile seams while panning or rotating), and everything
//! is hidden only when zoom falls below the activation threshold. Memory
//! therefore grows with the distinct features seen in a session unless
//! `max_instances` bounds it.

use std::collections::BTreeMap;

use formats::{OverlayConfig, PropertyNames};
use foundation::ids::{AssetUrl, FeatureId};
use foundation::math::{GeoAnchor, LngLat};
use streaming::AssetCache;
use tracing::{debug, info};

use crate::anchor::AnchorInstance;
use crate::coords::anchor_transform;
use crate::host::{MapHost, RenderedFeature};

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityConfig {
    pub min_zoom: f64,
    pub query_layers: Vec<String>,
    pub properties: PropertyNames,
    pub max_instances: Option<usize>,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for VisibilityConfig {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            min_zoom: config.min_zoom,
            query_layers: config.query_layers.clone(),
            properties: config.properties.clone(),
            max_instances: config.max_instances,
        }
    }
}

/// What one update changed. Ids are in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityReport {
    pub created: Vec<FeatureId>,
    /// Already tracked features whose transform was recomputed.
    pub refreshed: Vec<FeatureId>,
    pub hidden: Vec<FeatureId>,
    pub evicted: Vec<FeatureId>,
}

impl VisibilityReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.refreshed.is_empty()
            && self.hidden.is_empty()
            && self.evicted.is_empty()
    }
}

/// A query result reduced to what an instance needs.
struct Candidate {
    id: FeatureId,
    url: AssetUrl,
    anchor: GeoAnchor,
}

fn candidate(feature: &RenderedFeature, names: &PropertyNames) -> Option<Candidate> {
    let url = feature.string_property(&names.mesh_url)?;
    let id = feature
        .id_property(&names.feature_id)
        .or_else(|| feature.id.clone().filter(|id| !id.is_empty()))?;

    let lng = feature
        .number_property(&names.longitude)
        .or(feature.geometry.map(|g| g.lng))?;
    let lat = feature
        .number_property(&names.latitude)
        .or(feature.geometry.map(|g| g.lat))?;
    let position = LngLat::new(lng, lat);
    if !position.is_finite() {
        return None;
    }

    Some(Candidate {
        id: FeatureId::from(id),
        url: AssetUrl::from(url),
        anchor: GeoAnchor::new(position, feature.number_property(&names.elevation)),
    })
}

#[derive(Debug)]
pub struct VisibilityManager {
    config: VisibilityConfig,
    instances: BTreeMap<FeatureId, AnchorInstance>,
    enabled: bool,
    /// Incremented on every update at or above the threshold.
    generation: u64,
}

impl VisibilityManager {
    pub fn new(config: VisibilityConfig) -> Self {
        Self {
            config,
            instances: BTreeMap::new(),
            enabled: true,
            generation: 0,
        }
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    pub fn update<H: MapHost + ?Sized>(
        &mut self,
        host: &H,
        cache: &mut AssetCache,
    ) -> VisibilityReport {
        let zoom = host.zoom();
        if !self.enabled || !(zoom >= self.config.min_zoom) {
            let hidden = self.hide_all();
            if !hidden.is_empty() {
                debug!(zoom, count = hidden.len(), "overlay below threshold, hiding instances");
            }
            return VisibilityReport {
                hidden,
                ..Default::default()
            };
        }

        self.generation += 1;
        let generation = self.generation;
        let mut report = VisibilityReport::default();

        for feature in host.query_rendered_features(&self.config.query_layers) {
            let Some(Candidate { id, url, anchor }) = candidate(&feature, &self.config.properties)
            else {
                continue;
            };
            // The same feature can come back once per tile it touches.
            if self
                .instances
                .get(id.as_str())
                .is_some_and(|i| i.last_seen == generation)
            {
                continue;
            }

            let transform = anchor_transform(host, &anchor);
            match self.instances.get_mut(id.as_str()) {
                Some(instance) => {
                    // Idempotent; only refetches after the record was dropped.
                    cache.resolve(&url);
                    if instance.asset_url != url {
                        debug!(feature = %id, from = %instance.asset_url, to = %url, "mesh url changed");
                        instance.asset_url = url;
                    }
                    instance.anchor = anchor;
                    instance.transform = transform;
                    instance.visible = true;
                    instance.last_seen = generation;
                    report.refreshed.push(id);
                }
                None => {
                    cache.resolve(&url);
                    self.instances.insert(
                        id.clone(),
                        AnchorInstance {
                            feature_id: id.clone(),
                            anchor,
                            transform,
                            visible: true,
                            asset_url: url,
                            last_seen: generation,
                        },
                    );
                    report.created.push(id);
                }
            }
        }

        report.evicted = self.enforce_cap(generation);
        if !report.created.is_empty() || !report.evicted.is_empty() {
            info!(
                zoom,
                created = report.created.len(),
                refreshed = report.refreshed.len(),
                evicted = report.evicted.len(),
                tracked = self.instances.len(),
                "visibility updated"
            );
        }
        report
    }

    /// Retires the least recently seen instances beyond `max_instances`.
    /// Instances seen in the current update are kept.
    fn enforce_cap(&mut self, generation: u64) -> Vec<FeatureId> {
        let Some(cap) = self.config.max_instances else {
            return Vec::new();
        };
        if self.instances.len() <= cap {
            return Vec::new();
        }
        let mut stale: Vec<(u64, FeatureId)> = self
            .instances
            .values()
            .filter(|i| i.last_seen != generation)
            .map(|i| (i.last_seen, i.feature_id.clone()))
            .collect();
        stale.sort();

        let excess = self.instances.len() - cap;
        let evicted: Vec<FeatureId> = stale.into_iter().take(excess).map(|(_, id)| id).collect();
        for id in &evicted {
            self.instances.remove(id.as_str());
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), cap, "evicted least recently seen instances");
        }
        evicted
    }

    fn hide_all(&mut self) -> Vec<FeatureId> {
        self.instances
            .values_mut()
            .filter(|i| i.visible)
            .map(|i| {
                i.visible = false;
                i.feature_id.clone()
            })
            .collect()
    }

    /// Switches the overlay on or off. Turning it off hides every instance
    /// at once; turning it on shows them again from the next update.
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<FeatureId> {
        self.enabled = enabled;
        if enabled { Vec::new() } else { self.hide_all() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stops tracking a feature. Its asset stays cached.
    pub fn retire(&mut self, feature_id: &str) -> Option<AnchorInstance> {
        self.instances.remove(feature_id)
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    pub fn get(&self, feature_id: &str) -> Option<&AnchorInstance> {
        self.instances.get(feature_id)
    }

    /// Tracked instances in feature id order.
    pub fn instances(&self) -> impl Iterator<Item = &AnchorInstance> {
        self.instances.values()
    }

    pub fn visible(&self) -> impl Iterator<Item = &AnchorInstance> {
        self.instances.values().filter(|i| i.visible)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{VisibilityConfig, VisibilityManager};
    use crate::host::RenderedFeature;
    use crate::testing::{FakeHost, mesh_feature};
    use foundation::ids::FeatureId;
    use foundation::math::LngLat;
    use pretty_assertions::assert_eq;
    use streaming::testing::{ManualAssetSource, block_asset};
    use streaming::{AssetCache, LoadState};

    fn ids(names: &[&str]) -> Vec<FeatureId> {
        names.iter().copied().map(FeatureId::from).collect()
    }

    fn setup() -> (VisibilityManager, AssetCache, ManualAssetSource) {
        let source = ManualAssetSource::new();
        (
            VisibilityManager::new(VisibilityConfig::default()),
            AssetCache::new(source.clone()),
            source,
        )
    }

    #[test]
    fn below_threshold_nothing_loads_or_shows() {
        let (mut vis, mut cache, source) = setup();
        let mut host = FakeHost::new(14.9);
        host.features = vec![mesh_feature("F1", "a.bin", 6.86, 45.92)];

        let report = vis.update(&host, &mut cache);
        assert!(report.is_empty());
        assert!(vis.is_empty());
        assert!(source.requested().is_empty());
        assert_eq!(host.queries.get(), 0);
    }

    #[test]
    fn activation_creates_instance_and_requests_asset() {
        let (mut vis, mut cache, source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![mesh_feature("F1", "a.bin", 6.86, 45.92)];

        let report = vis.update(&host, &mut cache);
        assert_eq!(report.created, ids(&["F1"]));
        assert_eq!(cache.state("a.bin"), Some(LoadState::Pending));

        let instance = vis.get("F1").unwrap();
        assert!(instance.is_visible());
        assert_eq!(instance.asset_url().as_str(), "a.bin");
        assert_eq!(source.requested().len(), 1);
    }

    #[test]
    fn zoom_out_hides_without_forgetting() {
        let (mut vis, mut cache, source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![mesh_feature("F1", "a.bin", 6.86, 45.92)];
        vis.update(&host, &mut cache);
        source.succeed(&"a.bin".into(), block_asset());
        cache.apply_completions(16);

        host.zoom = 10.0;
        let report = vis.update(&host, &mut cache);
        assert_eq!(report.hidden, ids(&["F1"]));
        assert!(!vis.get("F1").unwrap().is_visible());
        assert_eq!(cache.state("a.bin"), Some(LoadState::Ready));

        host.zoom = 16.0;
        let report = vis.update(&host, &mut cache);
        assert_eq!(report.refreshed, ids(&["F1"]));
        assert!(vis.get("F1").unwrap().is_visible());
        assert_eq!(source.requested().len(), 1);
    }

    #[test]
    fn missing_from_one_query_keeps_instance_visible() {
        let (mut vis, mut cache, _source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![
            mesh_feature("F1", "a.bin", 6.86, 45.92),
            mesh_feature("F2", "b.bin", 6.87, 45.93),
        ];
        vis.update(&host, &mut cache);

        host.features.truncate(1);
        let report = vis.update(&host, &mut cache);
        assert!(report.hidden.is_empty());
        assert!(vis.get("F2").unwrap().is_visible());
        assert_eq!(vis.len(), 2);
    }

    #[test]
    fn shared_asset_is_resolved_once() {
        let (mut vis, mut cache, source) = setup();
        let mut host = FakeHost::new(17.0);
        host.features = vec![
            mesh_feature("F1", "a.bin", 6.86, 45.92),
            mesh_feature("F2", "a.bin", 6.90, 45.95),
        ];
        vis.update(&host, &mut cache);

        assert_eq!(source.requested().len(), 1);
        assert_eq!(cache.len(), 1);
        let t1 = vis.get("F1").unwrap().transform();
        let t2 = vis.get("F2").unwrap().transform();
        assert_ne!(t1.position, t2.position);
    }

    #[test]
    fn precise_properties_override_tile_geometry() {
        let (mut vis, mut cache, _source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![
            RenderedFeature::point(LngLat::new(6.86, 45.92))
                .with_id("host-7")
                .with_property("mesh_url", "a.bin")
                .with_property("lon", 6.861234)
                .with_property("elevation_m", 1500.0),
            // No mesh reference: ignored.
            RenderedFeature::point(LngLat::new(6.0, 45.0)).with_property("id", "F9"),
        ];
        vis.update(&host, &mut cache);

        assert_eq!(vis.len(), 1);
        let instance = vis.get("host-7").unwrap();
        assert_eq!(instance.anchor().position, LngLat::new(6.861234, 45.92));
        assert_eq!(instance.anchor().elevation_m, Some(1500.0));
    }

    #[test]
    fn duplicate_tile_hits_count_once() {
        let (mut vis, mut cache, _source) = setup();
        let mut host = FakeHost::new(16.0);
        let f = mesh_feature("F1", "a.bin", 6.86, 45.92);
        host.features = vec![f.clone(), f];

        let report = vis.update(&host, &mut cache);
        assert_eq!(report.created, ids(&["F1"]));
        assert!(report.refreshed.is_empty());
    }

    #[test]
    fn changed_mesh_url_repoints_instance() {
        let (mut vis, mut cache, source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![mesh_feature("F1", "a.bin", 6.86, 45.92)];
        vis.update(&host, &mut cache);

        host.features = vec![mesh_feature("F1", "a-v2.bin", 6.86, 45.92)];
        vis.update(&host, &mut cache);
        assert_eq!(vis.get("F1").unwrap().asset_url().as_str(), "a-v2.bin");
        assert_eq!(source.requested().len(), 2);
    }

    #[test]
    fn cap_evicts_least_recently_seen() {
        let source = ManualAssetSource::new();
        let mut cache = AssetCache::new(source);
        let mut vis = VisibilityManager::new(VisibilityConfig {
            max_instances: Some(2),
            ..Default::default()
        });
        let mut host = FakeHost::new(16.0);

        host.features = vec![mesh_feature("A", "a.bin", 6.80, 45.90)];
        vis.update(&host, &mut cache);
        host.features = vec![mesh_feature("B", "b.bin", 6.81, 45.90)];
        vis.update(&host, &mut cache);
        host.features = vec![mesh_feature("C", "c.bin", 6.82, 45.90)];
        let report = vis.update(&host, &mut cache);

        assert_eq!(report.evicted, ids(&["A"]));
        let tracked: Vec<_> = vis.instances().map(|i| i.feature_id().clone()).collect();
        assert_eq!(tracked, ids(&["B", "C"]));
        // Eviction never touches the cache.
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn cap_never_evicts_what_is_on_screen() {
        let mut cache = AssetCache::new(ManualAssetSource::new());
        let mut vis = VisibilityManager::new(VisibilityConfig {
            max_instances: Some(1),
            ..Default::default()
        });
        let mut host = FakeHost::new(16.0);
        host.features = vec![
            mesh_feature("A", "a.bin", 6.80, 45.90),
            mesh_feature("B", "b.bin", 6.81, 45.90),
        ];
        let report = vis.update(&host, &mut cache);
        assert!(report.evicted.is_empty());
        assert_eq!(vis.len(), 2);
    }

    #[test]
    fn disabling_hides_and_stops_loading() {
        let (mut vis, mut cache, source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![mesh_feature("F1", "a.bin", 6.86, 45.92)];
        vis.update(&host, &mut cache);

        assert_eq!(vis.set_enabled(false), ids(&["F1"]));
        host.features.push(mesh_feature("F2", "b.bin", 6.87, 45.92));
        let report = vis.update(&host, &mut cache);
        assert!(report.is_empty());
        assert_eq!(source.requested().len(), 1);

        vis.set_enabled(true);
        let report = vis.update(&host, &mut cache);
        assert_eq!(report.created, ids(&["F2"]));
    }

    #[test]
    fn retire_leaves_cache_alone() {
        let (mut vis, mut cache, _source) = setup();
        let mut host = FakeHost::new(16.0);
        host.features = vec![mesh_feature("F1", "a.bin", 6.86, 45.92)];
        vis.update(&host, &mut cache);

        assert!(vis.retire("F1").is_some());
        assert!(vis.retire("F1").is_none());
        assert_eq!(cache.state("a.bin"), Some(LoadState::Pending));
    }
}
