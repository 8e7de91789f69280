use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Linear RGB color, serialized as `#rrggbb`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([1.0, 1.0, 1.0]);

    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xff) as f32 / 255.0;
        let g = ((hex >> 8) & 0xff) as f32 / 255.0;
        let b = (hex & 0xff) as f32 / 255.0;
        Rgb([r, g, b])
    }

    pub fn to_hex(self) -> u32 {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (c(self.0[0]) << 16) | (c(self.0[1]) << 8) | c(self.0[2])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a color like #9a9a9a, got {0:?}")]
pub struct ParseRgbError(String);

impl TryFrom<String> for Rgb {
    type Error = ParseRgbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.strip_prefix('#').unwrap_or(&value);
        if digits.len() != 6 {
            return Err(ParseRgbError(value));
        }
        u32::from_str_radix(digits, 16)
            .map(Rgb::from_hex)
            .map_err(|_| ParseRgbError(value))
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        format!("#{:06x}", c.to_hex())
    }
}

/// Uniform material applied to every primitive of a loaded asset.
///
/// Source materials of scanned meshes are inconsistent, so they are replaced
/// wholesale with a flat-shaded surface.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatMaterial {
    pub color: Rgb,
    pub roughness: f32,
    pub metalness: f32,
    pub double_sided: bool,
}

impl Default for FlatMaterial {
    fn default() -> Self {
        Self {
            color: Rgb::from_hex(0x9a9a9a),
            roughness: 0.4,
            metalness: 0.15,
            double_sided: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientLight {
    pub color: Rgb,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Rgb::WHITE,
            intensity: 0.6,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalLight {
    pub color: Rgb,
    pub intensity: f32,
    /// Position of the light relative to the lit point, in asset space (Z up).
    pub position: [f32; 3],
}

impl DirectionalLight {
    /// Unit vector pointing from the surface toward the light.
    pub fn direction(&self) -> [f32; 3] {
        let [x, y, z] = self.position;
        let len = (x * x + y * y + z * z).sqrt();
        if len <= f32::EPSILON {
            return [0.0, 0.0, 1.0];
        }
        [x / len, y / len, z / len]
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Rgb::WHITE,
            intensity: 0.8,
            position: [0.0, -70.0, 100.0],
        }
    }
}

/// Base scene lighting shared by every overlay model.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LightRig {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
}
