//! Frame composer: per-instance matrices, relative to the camera.
//!
//! Projected coordinates of a point at zoom 18 differ from their neighbours
//! in the eighth significant digit, beyond what `f32` holds. Matrices are
//! composed in `f64` around the camera's projected position and only the
//! final model-view-projection is narrowed.

use foundation::math::CameraRelative;
use glam::{DMat4, DVec3, Mat4};
use runtime::frame::Frame;
use scene::{AnchorInstance, AnchorTransform, MapHost};
use streaming::{AssetCache, LoadState};
use tracing::{debug, warn};

use crate::target::{DrawCommand, DrawTarget};

/// Per-frame camera state supplied by the host.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameContext {
    /// Projected space to clip space. `None` until the host has one.
    pub projection: Option<DMat4>,
    /// Camera center in projected space; origin for relative composition.
    pub camera_center: DVec3,
}

impl FrameContext {
    pub fn new(projection: Option<DMat4>, camera_center: DVec3) -> Self {
        Self {
            projection,
            camera_center,
        }
    }

    /// Builds a context from the host's column-major matrix and its current
    /// center. Matrices with non-finite entries count as missing.
    pub fn from_host<H: MapHost + ?Sized>(host: &H, projection: Option<&[f64; 16]>) -> Self {
        let projection = projection
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .map(DMat4::from_cols_array);
        Self {
            projection,
            camera_center: host.project(host.center(), 0.0),
        }
    }
}

/// Model matrix relative to the camera: translate to the anchor, then scale
/// meters to projected units with Y flipped (asset Y is north, projected Y is
/// south).
pub fn relative_model_matrix(transform: &AnchorTransform, camera: CameraRelative) -> DMat4 {
    let s = transform.units_per_meter;
    DMat4::from_translation(camera.relative(transform.position))
        * DMat4::from_scale(DVec3::new(s, -s, s))
}

/// `projection * camera_offset * model`, narrowed to `f32` at the end.
pub fn instance_mvp(projection: DMat4, camera_center: DVec3, transform: &AnchorTransform) -> Mat4 {
    let camera = CameraRelative::new(camera_center);
    (projection * camera.offset_matrix() * relative_model_matrix(transform, camera)).as_mat4()
}

/// Summary of one composed frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub drawn: usize,
    /// Visible instances whose asset is still loading.
    pub waiting: usize,
    /// Nothing was drawn because the host had no projection yet.
    pub skipped: bool,
}

#[derive(Debug, Default)]
pub struct FrameComposer {
    /// Consecutive frames skipped for lack of a projection.
    missing_projection: u64,
}

impl FrameComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw<'a, T>(
        &mut self,
        frame: Frame,
        ctx: &FrameContext,
        instances: impl IntoIterator<Item = &'a AnchorInstance>,
        cache: &AssetCache,
        target: &mut T,
    ) -> FrameOutcome
    where
        T: DrawTarget + ?Sized,
    {
        let Some(projection) = ctx.projection else {
            self.missing_projection += 1;
            if self.missing_projection == 1 {
                warn!(frame = frame.index, "no projection from host, skipping overlay frame");
            } else {
                debug!(
                    frame = frame.index,
                    streak = self.missing_projection,
                    "still no projection"
                );
            }
            return FrameOutcome {
                skipped: true,
                ..Default::default()
            };
        };
        if self.missing_projection > 0 {
            debug!(skipped = self.missing_projection, "projection available");
            self.missing_projection = 0;
        }

        let mut outcome = FrameOutcome::default();
        target.begin_frame(frame);
        for instance in instances.into_iter().filter(|i| i.is_visible()) {
            let Some(record) = cache.get(instance.asset_url().as_str()) else {
                continue;
            };
            match (record.state(), record.asset()) {
                (LoadState::Ready, Some(asset)) => {
                    target.draw(&DrawCommand {
                        feature_id: instance.feature_id().clone(),
                        asset_url: instance.asset_url().clone(),
                        asset: asset.clone(),
                        mvp: instance_mvp(projection, ctx.camera_center, &instance.transform()),
                    });
                    outcome.drawn += 1;
                }
                (LoadState::Pending, _) => outcome.waiting += 1,
                _ => {}
            }
        }
        target.end_frame();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameComposer, FrameContext, instance_mvp};
    use crate::testing::RecordingTarget;
    use foundation::math::{LngLat, MercatorCoordinate};
    use glam::{DMat4, DVec3, DVec4, Vec4};
    use pretty_assertions::assert_eq;
    use runtime::frame::Frame;
    use scene::testing::{FakeHost, mesh_feature};
    use scene::{AnchorTransform, VisibilityConfig, VisibilityManager};
    use streaming::testing::{ManualAssetSource, block_asset};
    use streaming::AssetCache;

    fn transform_at(lng: f64, lat: f64, elevation: f64) -> AnchorTransform {
        let c = MercatorCoordinate::from_lng_lat(LngLat::new(lng, lat), elevation);
        AnchorTransform {
            position: c.as_dvec3(),
            units_per_meter: c.units_per_meter(),
        }
    }

    /// Stand-in for a host matrix at zoom ~20: scales projected units to
    /// roughly pixels around the camera.
    fn host_projection(camera: DVec3) -> DMat4 {
        let world_size = 512.0 * 2f64.powi(20);
        DMat4::from_scale(DVec3::splat(world_size / 1000.0)) * DMat4::from_translation(-camera)
    }

    #[test]
    fn mvp_places_asset_origin_at_anchor() {
        let camera = MercatorCoordinate::from_lng_lat(LngLat::new(6.86, 45.92), 0.0).as_dvec3();
        let projection = host_projection(camera);
        let t = transform_at(6.8601, 45.9201, 1200.0);

        let mvp = instance_mvp(projection, camera, &t);
        let expected = projection * DVec4::from((t.position, 1.0));
        let got = mvp * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((got.as_dvec4() - expected).abs().max_element() < 1e-3);
    }

    #[test]
    fn one_meter_north_moves_toward_smaller_y() {
        let camera = MercatorCoordinate::from_lng_lat(LngLat::new(6.86, 45.92), 0.0).as_dvec3();
        let projection = DMat4::from_translation(-camera);
        let t = transform_at(6.86, 45.92, 0.0);
        let mvp = instance_mvp(projection, camera, &t);

        let origin = mvp * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let north = mvp * Vec4::new(0.0, 1.0, 0.0, 1.0);
        let up = mvp * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert!(north.y < origin.y);
        assert!(up.z > origin.z);
        assert!(((north.y - origin.y).abs() as f64 - t.units_per_meter).abs() < 1e-12);
    }

    #[test]
    fn relative_composition_resolves_centimeters_at_high_zoom() {
        let camera = MercatorCoordinate::from_lng_lat(LngLat::new(2.6345, 48.4467), 0.0).as_dvec3();
        let projection = host_projection(camera);
        let t = transform_at(2.63451, 48.44671, 80.0);
        let mvp = instance_mvp(projection, camera, &t);

        let local = DVec3::new(0.03, 0.0, 0.0);
        let reference = projection
            * DVec4::from((t.position + DVec3::new(local.x * t.units_per_meter, 0.0, 0.0), 1.0));
        let rtc = (mvp * Vec4::new(local.x as f32, 0.0, 0.0, 1.0)).as_dvec4();
        // A pixel is ~1e-3 units of this projection; stay well below it.
        assert!((rtc - reference).abs().max_element() < 1e-4);

        // Narrowing the absolute model matrix first loses the 3 cm entirely.
        let s = t.units_per_meter;
        let naive_model = (DMat4::from_translation(t.position)
            * DMat4::from_scale(DVec3::new(s, -s, s)))
        .as_mat4();
        let naive = (projection.as_mat4() * naive_model * Vec4::new(0.03, 0.0, 0.0, 1.0)).as_dvec4();
        assert!((naive - reference).abs().max_element() > 1e-3);
    }

    #[test]
    fn missing_projection_skips_whole_frame() {
        let mut composer = FrameComposer::new();
        let cache = AssetCache::new(ManualAssetSource::new());
        let mut target = RecordingTarget::default();
        let ctx = FrameContext::new(None, DVec3::ZERO);

        let outcome = composer.draw(Frame::new(0), &ctx, [], &cache, &mut target);
        assert!(outcome.skipped);
        assert!(target.frames.is_empty());
    }

    #[test]
    fn non_finite_host_matrix_counts_as_missing() {
        let host = FakeHost::new(16.0);
        let mut m = [0.0; 16];
        m[0] = f64::NAN;
        assert_eq!(FrameContext::from_host(&host, Some(&m)).projection, None);
        assert_eq!(FrameContext::from_host(&host, None).projection, None);
        let identity = DMat4::IDENTITY.to_cols_array();
        assert_eq!(
            FrameContext::from_host(&host, Some(&identity)).projection,
            Some(DMat4::IDENTITY)
        );
    }

    #[test]
    fn draws_only_visible_ready_instances() {
        let source = ManualAssetSource::new();
        let mut cache = AssetCache::new(source.clone());
        let mut vis = VisibilityManager::new(VisibilityConfig::default());
        let mut host = FakeHost::new(16.0);
        host.features = vec![
            mesh_feature("F1", "a.bin", 6.86, 45.92),
            mesh_feature("F2", "b.bin", 6.87, 45.92),
            mesh_feature("F3", "c.bin", 6.88, 45.92),
        ];
        vis.update(&host, &mut cache);
        source.succeed(&"a.bin".into(), block_asset());
        source.fail(&"c.bin".into(), streaming::AssetLoadError::Worker("gone".into()));
        cache.apply_completions(16);

        let mut composer = FrameComposer::new();
        let mut target = RecordingTarget::default();
        let ctx = FrameContext::from_host(&host, Some(&DMat4::IDENTITY.to_cols_array()));
        let outcome = composer.draw(Frame::new(1), &ctx, vis.instances(), &cache, &mut target);

        assert_eq!(
            outcome,
            super::FrameOutcome {
                drawn: 1,
                waiting: 1,
                skipped: false
            }
        );
        assert_eq!(target.frames.len(), 1);
        assert_eq!(target.frames[0].draws[0].feature_id.as_str(), "F1");

        host.zoom = 10.0;
        vis.update(&host, &mut cache);
        let outcome = composer.draw(Frame::new(2), &ctx, vis.instances(), &cache, &mut target);
        assert_eq!(outcome.drawn, 0);
    }
}
