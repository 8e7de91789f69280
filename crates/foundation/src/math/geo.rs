/// Geographic position in degrees (WGS84 longitude, latitude).
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_finite(self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

/// A geographic point at which a model is placed.
///
/// `elevation_m` is the stored ground elevation shipped with the feature. It
/// is only a fallback: live terrain samples take priority when available.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct GeoAnchor {
    pub position: LngLat,
    pub elevation_m: Option<f64>,
}

impl GeoAnchor {
    pub fn new(position: LngLat, elevation_m: Option<f64>) -> Self {
        Self {
            position,
            elevation_m,
        }
    }
}
