//! Boundary with the map that hosts the overlay.

use foundation::math::{LngLat, MercatorCoordinate};
use glam::DVec3;
use serde_json::{Map, Value};

/// One feature as returned by the host's rendered-feature query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedFeature {
    /// Host-assigned feature id, if any.
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    /// Point geometry. Tile geometry is quantized, so precise coordinates in
    /// the properties win when present.
    pub geometry: Option<LngLat>,
}

impl RenderedFeature {
    pub fn point(position: LngLat) -> Self {
        Self {
            geometry: Some(position),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Non-empty string property.
    pub fn string_property(&self, key: &str) -> Option<&str> {
        match self.properties.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Finite numeric property. Numeric strings are accepted.
    pub fn number_property(&self, key: &str) -> Option<f64> {
        let v = match self.properties.get(key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        v.is_finite().then_some(v)
    }

    /// String or integer id property.
    pub fn id_property(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// What the overlay needs from the hosting map.
///
/// Projection defaults follow the host's Web-Mercator space; hosts with a
/// different native space override `project` and `units_per_meter`
/// together.
pub trait MapHost {
    fn zoom(&self) -> f64;

    /// Geographic camera center.
    fn center(&self) -> LngLat;

    fn query_rendered_features(&self, layers: &[String]) -> Vec<RenderedFeature>;

    fn project(&self, position: LngLat, elevation_m: f64) -> DVec3 {
        MercatorCoordinate::from_lng_lat(position, elevation_m).as_dvec3()
    }

    /// Projected units per meter at a projected point.
    fn units_per_meter(&self, projected: DVec3) -> f64 {
        MercatorCoordinate::from(projected).units_per_meter()
    }

    /// Live terrain height, already exaggerated. `None` without terrain data.
    fn sample_terrain_elevation(&self, _position: LngLat) -> Option<f64> {
        None
    }

    fn terrain_exaggeration(&self) -> f64 {
        1.0
    }

    fn trigger_repaint(&self);
}
