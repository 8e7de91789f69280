//! Web-Mercator projection in the host map's normalized units.
//!
//! The projected space spans `[0, 1]` on both horizontal axes: `x` grows
//! eastward from the antimeridian and `y` grows southward from the top of the
//! Mercator square. Altitude is expressed in the same units, scaled by the
//! Earth circumference at the point's latitude, so a unit cube stays a cube
//! in projected space.

use glam::DVec3;

use super::LngLat;

/// Mean Earth radius used by the host map (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;
/// Equatorial circumference for [`EARTH_RADIUS_M`] (meters).
pub const EARTH_CIRCUMFERENCE_M: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS_M;
/// Latitude limit of the Mercator square (degrees).
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_129;

/// Circumference of the parallel at `lat_deg` (meters).
pub fn circumference_at_latitude(lat_deg: f64) -> f64 {
    EARTH_CIRCUMFERENCE_M * lat_deg.to_radians().cos()
}

pub fn mercator_x_from_lng(lng_deg: f64) -> f64 {
    (180.0 + lng_deg) / 360.0
}

pub fn mercator_y_from_lat(lat_deg: f64) -> f64 {
    let lat = lat_deg.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let k = (std::f64::consts::FRAC_PI_4 + lat * std::f64::consts::PI / 360.0)
        .tan()
        .ln();
    (180.0 - k.to_degrees()) / 360.0
}

pub fn mercator_z_from_altitude(altitude_m: f64, lat_deg: f64) -> f64 {
    altitude_m / circumference_at_latitude(lat_deg)
}

pub fn lng_from_mercator_x(x: f64) -> f64 {
    x * 360.0 - 180.0
}

pub fn lat_from_mercator_y(y: f64) -> f64 {
    let y2 = 180.0 - y * 360.0;
    360.0 / std::f64::consts::PI * y2.to_radians().exp().atan() - 90.0
}

/// A point in the host map's projected space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MercatorCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MercatorCoordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_lng_lat(position: LngLat, altitude_m: f64) -> Self {
        Self {
            x: mercator_x_from_lng(position.lng),
            y: mercator_y_from_lat(position.lat),
            z: mercator_z_from_altitude(altitude_m, position.lat),
        }
    }

    pub fn to_lng_lat(self) -> LngLat {
        LngLat::new(lng_from_mercator_x(self.x), lat_from_mercator_y(self.y))
    }

    /// Projected units spanned by one meter at this coordinate's latitude.
    pub fn units_per_meter(self) -> f64 {
        1.0 / circumference_at_latitude(lat_from_mercator_y(self.y))
    }

    pub fn as_dvec3(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

impl From<DVec3> for MercatorCoordinate {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}
