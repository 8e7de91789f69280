//! glTF 2.0 decoding (binary `.glb` or self-contained JSON).
//!
//! Only geometry is kept: node transforms are baked into vertex positions and
//! every triangle-list primitive becomes one [`MeshPrimitive`]. Source
//! materials, textures and animations are ignored.

use glam::{Mat4, Vec3};
use gltf::mesh::Mode;
use thiserror::Error;
use tracing::debug;

use crate::asset::{DecodedScene, MeshPrimitive, PreparedAsset};
use crate::material::FlatMaterial;

/// Node hierarchies deeper than this are treated as malformed.
pub const MAX_NODE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum AssetDecodeError {
    #[error("glTF parse error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("asset has no scene")]
    NoScene,
    #[error("asset has no triangle geometry")]
    NoGeometry,
    #[error("node hierarchy deeper than {MAX_NODE_DEPTH}")]
    TooDeep,
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Decodes glTF bytes into flattened geometry.
pub fn decode_gltf(bytes: &[u8]) -> Result<DecodedScene, AssetDecodeError> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
    let buffers = gltf::import_buffers(&document, None, blob)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(AssetDecodeError::NoScene)?;

    let mut out = DecodedScene::default();
    for node in scene.nodes() {
        collect_node(&node, Mat4::IDENTITY, 0, &buffers, &mut out)?;
    }

    if out.primitives.is_empty() {
        return Err(AssetDecodeError::NoGeometry);
    }
    debug!(primitives = out.primitives.len(), "decoded glTF scene");
    Ok(out)
}

/// Decodes and prepares an asset in one step.
pub fn prepare_glb(bytes: &[u8], material: FlatMaterial) -> Result<PreparedAsset, AssetDecodeError> {
    decode_gltf(bytes).map(|scene| PreparedAsset::prepare(scene, material))
}

fn collect_node(
    node: &gltf::Node<'_>,
    parent: Mat4,
    depth: usize,
    buffers: &[gltf::buffer::Data],
    out: &mut DecodedScene,
) -> Result<(), AssetDecodeError> {
    if depth >= MAX_NODE_DEPTH {
        return Err(AssetDecodeError::TooDeep);
    }
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                debug!(mode = ?primitive.mode(), "skipping non-triangle primitive");
                continue;
            }
            let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions
                .map(|p| world.transform_point3(Vec3::from(p)).to_array())
                .collect();

            let mut indices: Vec<u32> = match reader.read_indices() {
                Some(idx) => idx.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(AssetDecodeError::IndexOutOfRange {
                    index,
                    vertex_count: positions.len(),
                });
            }
            // Drop a trailing partial triangle.
            indices.truncate(indices.len() - indices.len() % 3);
            if indices.is_empty() {
                continue;
            }

            out.primitives.push(MeshPrimitive::new(positions, indices));
        }
    }

    for child in node.children() {
        collect_node(&child, world, depth + 1, buffers, out)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{glb, gltf_json, offset_block};
    use super::{AssetDecodeError, decode_gltf, prepare_glb};
    use crate::material::FlatMaterial;
    use glam::Vec3;
    use pretty_assertions::assert_eq;

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn decodes_binary_container() {
        let scene = decode_gltf(&glb(&TRIANGLE, Some(&[0, 1, 2]))).unwrap();
        assert_eq!(scene.primitives.len(), 1);
        assert_eq!(scene.primitives[0].positions, TRIANGLE.to_vec());
        assert_eq!(scene.primitives[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn bakes_node_hierarchy_into_positions() {
        let bytes = gltf_json(&TRIANGLE, Some(&[0, 1, 2]), 4, [10.0, 0.0, 5.0], 2.0);
        let scene = decode_gltf(&bytes).unwrap();
        assert_eq!(
            scene.primitives[0].positions,
            vec![[10.0, 0.0, 5.0], [12.0, 0.0, 5.0], [10.0, 2.0, 5.0]]
        );
    }

    #[test]
    fn synthesizes_indices_for_unindexed_primitives() {
        let bytes = gltf_json(&TRIANGLE, None, 4, [0.0; 3], 1.0);
        let scene = decode_gltf(&bytes).unwrap();
        assert_eq!(scene.primitives[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn line_only_assets_have_no_geometry() {
        let bytes = gltf_json(&TRIANGLE, None, 1, [0.0; 3], 1.0);
        assert!(matches!(
            decode_gltf(&bytes),
            Err(AssetDecodeError::NoGeometry)
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            decode_gltf(b"<html>404</html>"),
            Err(AssetDecodeError::Gltf(_))
        ));
    }

    #[test]
    fn prepared_block_rests_on_its_footprint_center() {
        let asset = prepare_glb(&offset_block(), FlatMaterial::default()).unwrap();
        assert_eq!(asset.origin_offset(), Vec3::new(-101.0, -201.0, -50.0));
        assert_eq!(asset.bounds().min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(asset.bounds().max, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(asset.triangle_count(), 2);
    }
}
