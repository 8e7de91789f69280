//! The overlay layer and its lifecycle.
//!
//! `Uninitialized -> Attached -> Detached`. Collaborators exist only while
//! attached; callbacks arriving in any other state are logged and ignored.

use formats::{ConfigError, OverlayConfig};
use foundation::ids::FeatureId;
use gpu::{DrawTarget, FrameComposer, FrameContext, OverlayBackend};
use runtime::frame::Frame;
use runtime::metrics::{Counter, Metrics, MetricsSnapshot};
use scene::{AnchorInstance, MapHost, VisibilityConfig, VisibilityManager, VisibilityReport};
use streaming::{AssetCache, AssetRecord, AssetSource, HttpAssetSource};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::layer::{CustomLayer, LayerId, RenderArgs};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerState {
    Uninitialized,
    Attached,
    Detached,
}

/// Everything that only exists between `on_add` and `on_remove`.
struct Attached<B> {
    backend: B,
    cache: AssetCache,
    visibility: VisibilityManager,
    composer: FrameComposer,
    frame: Frame,
}

enum Lifecycle<B> {
    Uninitialized { source: Box<dyn AssetSource> },
    Attached(Box<Attached<B>>),
    /// The backend is kept so the embedder can reclaim it.
    Detached { backend: Option<B> },
}

/// Georeferenced model overlay, driven by a map host.
pub struct OverlayLayer<B: DrawTarget> {
    id: LayerId,
    config: OverlayConfig,
    lifecycle: Lifecycle<B>,
    enabled: bool,
    metrics: Metrics,
}

impl<B: DrawTarget> std::fmt::Debug for OverlayLayer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayLayer")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("enabled", &self.enabled)
            .field("instances", &self.attached().map_or(0, |a| a.visibility.len()))
            .field("assets", &self.attached().map_or(0, |a| a.cache.len()))
            .finish()
    }
}

impl<B: DrawTarget> OverlayLayer<B> {
    /// Fails if `config` does not validate.
    pub fn new(
        config: OverlayConfig,
        source: impl AssetSource + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: LayerId::new(config.layer_id.as_str()),
            config,
            lifecycle: Lifecycle::Uninitialized {
                source: Box::new(source),
            },
            enabled: true,
            metrics: Metrics::new(),
        })
    }

    /// Loads assets over HTTP on `runtime`, prepared with the configured
    /// material.
    pub fn with_http(config: OverlayConfig, runtime: Handle) -> Result<Self, ConfigError> {
        let source = HttpAssetSource::new(runtime, config.material);
        Self::new(config, source)
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn state(&self) -> LayerState {
        match self.lifecycle {
            Lifecycle::Uninitialized { .. } => LayerState::Uninitialized,
            Lifecycle::Attached(_) => LayerState::Attached,
            Lifecycle::Detached { .. } => LayerState::Detached,
        }
    }

    fn attached(&self) -> Option<&Attached<B>> {
        match &self.lifecycle {
            Lifecycle::Attached(a) => Some(a.as_ref()),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Shows or hides the whole overlay. Disabling hides every instance
    /// immediately; enabling re-runs visibility for the current camera.
    pub fn set_enabled(&mut self, host: &dyn MapHost, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        info!(layer = %self.id, enabled, "overlay toggled");
        let Lifecycle::Attached(attached) = &mut self.lifecycle else {
            return;
        };
        let hidden = attached.visibility.set_enabled(enabled);
        if enabled {
            self.settle(host);
        } else if !hidden.is_empty() {
            host.trigger_repaint();
        }
    }

    /// Drops failed asset records and re-runs visibility so the features
    /// that referenced them request their assets again.
    pub fn retry_failed_assets(&mut self, host: &dyn MapHost) -> usize {
        let Lifecycle::Attached(attached) = &mut self.lifecycle else {
            return 0;
        };
        let retried = attached.cache.retry_failed();
        if !retried.is_empty() {
            info!(layer = %self.id, count = retried.len(), "retrying failed assets");
            self.settle(host);
        }
        retried.len()
    }

    /// Stops tracking a feature. A load it started still completes into the
    /// cache and can back a later instance.
    pub fn retire(&mut self, feature_id: &str) -> Option<AnchorInstance> {
        let Lifecycle::Attached(attached) = &mut self.lifecycle else {
            return None;
        };
        let retired = attached.visibility.retire(feature_id);
        if retired.is_some() {
            debug!(layer = %self.id, feature = feature_id, "instance retired");
        }
        retired
    }

    pub fn instance(&self, feature_id: &str) -> Option<&AnchorInstance> {
        self.attached()?.visibility.get(feature_id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &AnchorInstance> {
        self.attached()
            .into_iter()
            .flat_map(|a| a.visibility.instances())
    }

    /// Ids of the instances currently shown, in id order.
    pub fn visible_features(&self) -> Vec<FeatureId> {
        self.instances()
            .filter(|i| i.is_visible())
            .map(|i| i.feature_id().clone())
            .collect()
    }

    pub fn asset(&self, url: &str) -> Option<&AssetRecord> {
        self.attached()?.cache.get(url)
    }

    pub fn backend(&self) -> Option<&B> {
        match &self.lifecycle {
            Lifecycle::Attached(a) => Some(&a.backend),
            Lifecycle::Detached { backend } => backend.as_ref(),
            Lifecycle::Uninitialized { .. } => None,
        }
    }

    /// Takes the backend back after `on_remove`.
    pub fn into_backend(self) -> Option<B> {
        match self.lifecycle {
            Lifecycle::Attached(a) => Some(a.backend),
            Lifecycle::Detached { backend } => backend,
            Lifecycle::Uninitialized { .. } => None,
        }
    }

    /// Layer counters with the asset cache's folded in, plus current gauges.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut metrics = self.metrics.clone();
        if let Some(a) = self.attached() {
            metrics.merge(a.cache.metrics());
            metrics.set_gauge("instances_tracked", a.visibility.len() as i64);
            metrics.set_gauge("instances_visible", a.visibility.visible().count() as i64);
            metrics.set_gauge("assets_ready", a.cache.ready_count() as i64);
            metrics.set_gauge("assets_pending", a.cache.pending_count() as i64);
            metrics.set_gauge("assets_failed", a.cache.failed_count() as i64);
            let bytes: usize = a
                .cache
                .records()
                .filter_map(|r| r.asset())
                .map(|asset| asset.byte_size())
                .sum();
            metrics.set_gauge("asset_bytes", bytes as i64);
        }
        metrics.snapshot()
    }

    fn settle(&mut self, host: &dyn MapHost) -> Option<VisibilityReport> {
        let Lifecycle::Attached(attached) = &mut self.lifecycle else {
            return None;
        };
        let report = attached.visibility.update(host, &mut attached.cache);

        self.metrics.inc(Counter::VisibilityUpdates);
        self.metrics.add(Counter::InstancesCreated, report.created.len() as u64);
        self.metrics.add(Counter::InstancesEvicted, report.evicted.len() as u64);
        if !report.is_empty() {
            host.trigger_repaint();
        }
        Some(report)
    }

    fn log_ignored(&self, callback: &str) {
        warn!(layer = %self.id, state = ?self.state(), callback, "callback ignored in this state");
    }
}

impl<B: OverlayBackend> CustomLayer for OverlayLayer<B> {
    type Context = B::Context;

    fn id(&self) -> &LayerId {
        &self.id
    }

    fn on_add(&mut self, host: &dyn MapHost, context: B::Context) {
        let source = match std::mem::replace(
            &mut self.lifecycle,
            Lifecycle::Detached { backend: None },
        ) {
            Lifecycle::Uninitialized { source } => source,
            other => {
                self.lifecycle = other;
                self.log_ignored("on_add");
                return;
            }
        };

        let mut visibility = VisibilityManager::new(VisibilityConfig::from(&self.config));
        visibility.set_enabled(self.enabled);
        self.lifecycle = Lifecycle::Attached(Box::new(Attached {
            backend: B::attach(context, &self.config.lighting),
            cache: AssetCache::with_source(source),
            visibility,
            composer: FrameComposer::new(),
            frame: Frame::default(),
        }));
        info!(
            layer = %self.id,
            min_zoom = self.config.min_zoom,
            query_layers = ?self.config.query_layers,
            "overlay attached"
        );

        // The host may already be at an active zoom.
        self.settle(host);
    }

    fn render(&mut self, host: &dyn MapHost, args: &RenderArgs) {
        let Lifecycle::Attached(attached) = &mut self.lifecycle else {
            self.log_ignored("render");
            return;
        };
        let attached = &mut **attached;
        attached.frame = attached.frame.next();
        let frame = attached.frame;

        let transitioned = attached
            .cache
            .apply_completions(self.config.max_completions_per_frame);
        for url in &transitioned {
            debug!(frame = frame.index, url = %url, state = ?attached.cache.state(url.as_str()), "asset settled");
        }

        let ctx = FrameContext::from_host(host, args.projection.as_ref());
        let outcome = attached.composer.draw(
            frame,
            &ctx,
            attached.visibility.instances(),
            &attached.cache,
            &mut attached.backend,
        );

        if outcome.skipped {
            self.metrics.inc(Counter::FramesSkipped);
        } else {
            self.metrics.inc(Counter::FramesDrawn);
            self.metrics.add(Counter::DrawCalls, outcome.drawn as u64);
        }

        // Completions arrive off-thread and cannot wake the host themselves;
        // keep frames coming while any load is unsettled.
        if !transitioned.is_empty()
            || attached.cache.queued_completions() > 0
            || attached.cache.pending_count() > 0
        {
            host.trigger_repaint();
        }
    }

    fn on_camera_settled(&mut self, host: &dyn MapHost) {
        if self.settle(host).is_none() {
            self.log_ignored("on_camera_settled");
        }
    }

    fn on_remove(&mut self, _host: &dyn MapHost) {
        let previous = std::mem::replace(&mut self.lifecycle, Lifecycle::Detached { backend: None });
        match previous {
            Lifecycle::Attached(attached) => {
                let Attached {
                    mut backend,
                    mut cache,
                    mut visibility,
                    ..
                } = *attached;
                backend.release();
                let records = cache.release();
                visibility.clear();
                info!(layer = %self.id, records, "overlay detached");
                self.lifecycle = Lifecycle::Detached {
                    backend: Some(backend),
                };
            }
            Lifecycle::Uninitialized { .. } => {
                debug!(layer = %self.id, "removed before attach");
            }
            Lifecycle::Detached { backend } => {
                self.lifecycle = Lifecycle::Detached { backend };
                self.log_ignored("on_remove");
            }
        }
    }
}
