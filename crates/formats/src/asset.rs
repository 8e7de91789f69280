use foundation::bounds::Aabb3;
use glam::Vec3;

use crate::material::FlatMaterial;

/// One triangle-list primitive, positions in asset-local space (Z up, meters).
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPrimitive {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// Whether per-primitive frustum culling may be applied by a renderer.
    ///
    /// Local-space bounds become meaningless once the mesh is placed in map
    /// space, so prepared assets always clear this.
    pub frustum_culled: bool,
}

impl MeshPrimitive {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            frustum_culled: true,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Aabb3 {
        Aabb3::from_points(self.positions.iter().copied().map(Vec3::from))
    }
}

/// Geometry as authored, flattened out of its scene graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedScene {
    pub primitives: Vec<MeshPrimitive>,
}

impl DecodedScene {
    pub fn bounds(&self) -> Aabb3 {
        self.primitives
            .iter()
            .fold(Aabb3::empty(), |acc, p| acc.union(p.bounds()))
    }

    /// Normalizes the origin and applies the material override.
    pub fn into_prepared(self, material: FlatMaterial) -> PreparedAsset {
        PreparedAsset::prepare(self, material)
    }
}

/// Render-ready asset.
///
/// The origin offset is computed exactly once, here: the mesh is shifted so
/// its horizontal bounding-box center sits at local `(0, 0)` and its lowest
/// point rests on `z = 0`. There is no way to re-normalize a prepared asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAsset {
    primitives: Vec<MeshPrimitive>,
    origin_offset: Vec3,
    bounds: Aabb3,
    material: FlatMaterial,
}

impl PreparedAsset {
    pub fn prepare(scene: DecodedScene, material: FlatMaterial) -> Self {
        let authored = scene.bounds();
        let origin_offset = if authored.is_empty() {
            Vec3::ZERO
        } else {
            authored.footprint_offset()
        };

        let mut primitives = scene.primitives;
        for prim in &mut primitives {
            for p in &mut prim.positions {
                *p = (Vec3::from(*p) + origin_offset).to_array();
            }
            prim.frustum_culled = false;
        }

        let bounds = primitives
            .iter()
            .fold(Aabb3::empty(), |acc, p| acc.union(p.bounds()));

        Self {
            primitives,
            origin_offset,
            bounds,
            material,
        }
    }

    pub fn primitives(&self) -> &[MeshPrimitive] {
        &self.primitives
    }

    /// Translation that was applied to the authored geometry.
    pub fn origin_offset(&self) -> Vec3 {
        self.origin_offset
    }

    /// Bounds after normalization.
    pub fn bounds(&self) -> Aabb3 {
        self.bounds
    }

    pub fn material(&self) -> &FlatMaterial {
        &self.material
    }

    pub fn vertex_count(&self) -> usize {
        self.primitives.iter().map(|p| p.positions.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(MeshPrimitive::triangle_count).sum()
    }

    /// Approximate CPU footprint of the geometry in bytes.
    pub fn byte_size(&self) -> usize {
        self.primitives
            .iter()
            .map(|p| p.positions.len() * 12 + p.indices.len() * 4)
            .sum()
    }
}
