//! Coordinate transformer: geographic anchors to the host's projected space.
//!
//! Stateless. Every call reads the host's current terrain, so results change
//! as terrain tiles stream in and must not be cached across updates.

use foundation::math::GeoAnchor;
use glam::DVec3;

use crate::host::MapHost;

/// Where an anchor sits in projected space and how large a meter is there.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnchorTransform {
    pub position: DVec3,
    pub units_per_meter: f64,
}

/// Ground elevation for an anchor, in meters as the host displays them.
///
/// A live terrain sample is used as-is. Without one, the stored elevation is
/// scaled by the terrain exaggeration. Without either, zero.
pub fn resolve_elevation<H: MapHost + ?Sized>(host: &H, anchor: &GeoAnchor) -> f64 {
    if let Some(sample) = host
        .sample_terrain_elevation(anchor.position)
        .filter(|s| s.is_finite())
    {
        return sample;
    }
    match anchor.elevation_m.filter(|e| e.is_finite()) {
        Some(stored) => {
            let exaggeration = host.terrain_exaggeration();
            let exaggeration = if exaggeration.is_finite() { exaggeration } else { 1.0 };
            stored * exaggeration
        }
        None => 0.0,
    }
}

pub fn anchor_transform<H: MapHost + ?Sized>(host: &H, anchor: &GeoAnchor) -> AnchorTransform {
    let elevation = resolve_elevation(host, anchor);
    let position = host.project(anchor.position, elevation);
    AnchorTransform {
        position,
        units_per_meter: host.units_per_meter(position),
    }
}
