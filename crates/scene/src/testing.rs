//! In-memory map host for exercising the overlay without a real map.

use std::cell::Cell;

use foundation::math::LngLat;

use crate::host::{MapHost, RenderedFeature};

/// Scriptable host. Tests mutate the public fields between callbacks.
#[derive(Debug, Clone)]
pub struct FakeHost {
    pub zoom: f64,
    pub center: LngLat,
    /// Returned by every rendered-feature query, whatever the layers.
    pub features: Vec<RenderedFeature>,
    /// Terrain sample returned for any position.
    pub terrain_elevation: Option<f64>,
    pub exaggeration: f64,
    pub queries: Cell<usize>,
    pub repaints: Cell<usize>,
}

impl FakeHost {
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            center: LngLat::new(6.86, 45.92),
            features: Vec::new(),
            terrain_elevation: None,
            exaggeration: 1.0,
            queries: Cell::new(0),
            repaints: Cell::new(0),
        }
    }

    /// Returns and resets the repaint counter.
    pub fn take_repaints(&self) -> usize {
        self.repaints.replace(0)
    }
}

impl MapHost for FakeHost {
    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn center(&self) -> LngLat {
        self.center
    }

    fn query_rendered_features(&self, _layers: &[String]) -> Vec<RenderedFeature> {
        self.queries.set(self.queries.get() + 1);
        self.features.clone()
    }

    fn sample_terrain_elevation(&self, _position: LngLat) -> Option<f64> {
        self.terrain_elevation
    }

    fn terrain_exaggeration(&self) -> f64 {
        self.exaggeration
    }

    fn trigger_repaint(&self) {
        self.repaints.set(self.repaints.get() + 1);
    }
}

/// A point feature with an `id` and a `mesh_url` property.
pub fn mesh_feature(id: &str, mesh_url: &str, lng: f64, lat: f64) -> RenderedFeature {
    RenderedFeature::point(LngLat::new(lng, lat))
        .with_property("id", id)
        .with_property("mesh_url", mesh_url)
}
