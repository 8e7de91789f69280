use std::collections::BTreeMap;
use std::sync::Arc;

use formats::PreparedAsset;
use foundation::ids::AssetUrl;
use runtime::mailbox::Mailbox;
use runtime::metrics::{Counter, Metrics};
use tracing::{debug, info, warn};

use crate::record::{AssetRecord, LoadState};
use crate::request::{LoadCompletion, LoadRequest};
use crate::source::AssetSource;

/// Deduplicating store of loaded assets, keyed by source URL.
///
/// - `resolve` is idempotent: the first call for a URL creates a `Pending`
///   record and starts exactly one load, later calls return that record.
/// - Load results are queued in a mailbox and applied only by
///   [`AssetCache::apply_completions`], so records are mutated from the
///   thread that owns the cache.
/// - Records are never evicted implicitly. Failed records stay put so
///   repeated resolution does not refetch.
pub struct AssetCache {
    source: Box<dyn AssetSource>,
    records: BTreeMap<AssetUrl, AssetRecord>,
    completions: Mailbox<LoadCompletion>,
    metrics: Metrics,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("records", &self.records.len())
            .field("queued_completions", &self.completions.len())
            .finish_non_exhaustive()
    }
}

impl AssetCache {
    pub fn new(source: impl AssetSource + 'static) -> Self {
        Self::with_source(Box::new(source))
    }

    pub fn with_source(source: Box<dyn AssetSource>) -> Self {
        Self {
            source,
            records: BTreeMap::new(),
            completions: Mailbox::new(),
            metrics: Metrics::new(),
        }
    }

    /// Returns the record for `url`, starting a load if none exists.
    pub fn resolve(&mut self, url: &AssetUrl) -> &AssetRecord {
        self.records.entry(url.clone()).or_insert_with(|| {
            info!(url = %url, "asset load started");
            self.metrics.inc(Counter::LoadsStarted);
            self.source
                .load(LoadRequest::new(url.clone(), self.completions.sender()));
            AssetRecord::pending(url.clone())
        })
    }

    pub fn get(&self, url: &str) -> Option<&AssetRecord> {
        self.records.get(url)
    }

    pub fn state(&self, url: &str) -> Option<LoadState> {
        self.records.get(url).map(AssetRecord::state)
    }

    /// Geometry for `url` if its record is `Ready`.
    pub fn ready_asset(&self, url: &str) -> Option<&Arc<PreparedAsset>> {
        self.records.get(url).and_then(AssetRecord::asset)
    }

    /// Applies up to `limit` queued load results in arrival order.
    ///
    /// Returns the URLs whose record changed state. Results for URLs with no
    /// record, or whose record is no longer pending, are dropped.
    pub fn apply_completions(&mut self, limit: usize) -> Vec<AssetUrl> {
        let mut transitioned = Vec::new();
        for LoadCompletion { url, result } in self.completions.drain(limit) {
            let Some(record) = self.records.get_mut(url.as_str()) else {
                debug!(url = %url, "discarding completion for released asset");
                self.metrics.inc(Counter::CompletionsDiscarded);
                continue;
            };
            let failure = result.as_ref().err().map(ToString::to_string);
            if !record.complete(result) {
                debug!(url = %url, state = ?record.state(), "discarding duplicate completion");
                self.metrics.inc(Counter::CompletionsDiscarded);
                continue;
            }
            match failure {
                None => {
                    let asset = record.asset().map(|a| (a.vertex_count(), a.triangle_count()));
                    if let Some((vertices, triangles)) = asset {
                        info!(url = %url, vertices, triangles, "asset ready");
                    }
                    self.metrics.inc(Counter::LoadsSucceeded);
                }
                Some(error) => {
                    warn!(url = %url, %error, "asset load failed");
                    self.metrics.inc(Counter::LoadsFailed);
                }
            }
            transitioned.push(url);
        }
        transitioned
    }

    /// Load results waiting to be applied.
    pub fn queued_completions(&self) -> usize {
        self.completions.len()
    }

    pub fn pending_count(&self) -> usize {
        self.count_in(LoadState::Pending)
    }

    pub fn ready_count(&self) -> usize {
        self.count_in(LoadState::Ready)
    }

    pub fn failed_count(&self) -> usize {
        self.count_in(LoadState::Failed)
    }

    fn count_in(&self, state: LoadState) -> usize {
        self.records.values().filter(|r| r.state() == state).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
        self.records.values()
    }

    /// Forgets every failed record so the next `resolve` fetches again.
    ///
    /// Never called by the cache itself.
    pub fn retry_failed(&mut self) -> Vec<AssetUrl> {
        let failed: Vec<AssetUrl> = self
            .records
            .values()
            .filter(|r| r.state() == LoadState::Failed)
            .map(|r| r.url().clone())
            .collect();
        for url in &failed {
            self.records.remove(url.as_str());
        }
        if !failed.is_empty() {
            info!(count = failed.len(), "cleared failed assets for retry");
        }
        failed
    }

    /// Drops every record and every queued result. Loads still in flight
    /// complete into the mailbox and are discarded on the next apply.
    pub fn release(&mut self) -> usize {
        let released = self.records.len();
        self.records.clear();
        let dropped = self.completions.drain(usize::MAX).len();
        self.metrics.add(Counter::CompletionsDiscarded, dropped as u64);
        debug!(released, dropped, "asset cache released");
        released
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::AssetCache;
    use crate::error::AssetLoadError;
    use crate::record::LoadState;
    use crate::testing::{ManualAssetSource, block_asset};
    use formats::AssetDecodeError;
    use foundation::ids::AssetUrl;
    use pretty_assertions::assert_eq;
    use runtime::metrics::Counter;

    fn cache() -> (AssetCache, ManualAssetSource) {
        let source = ManualAssetSource::new();
        (AssetCache::new(source.clone()), source)
    }

    /// Forgets every request it is handed.
    struct ForgetfulSource;

    impl crate::source::AssetSource for ForgetfulSource {
        fn load(&self, request: crate::request::LoadRequest) {
            drop(request);
        }
    }

    #[test]
    fn dropped_request_settles_as_failed() {
        let mut cache = AssetCache::new(ForgetfulSource);
        let url = AssetUrl::from("a.glb");
        cache.resolve(&url);

        assert_eq!(cache.apply_completions(16), vec![url.clone()]);
        assert_eq!(cache.state("a.glb"), Some(LoadState::Failed));
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(
            cache.get("a.glb").and_then(|r| r.error()),
            Some("load worker failed: request dropped")
        );
    }

    #[test]
    fn resolve_is_idempotent() {
        let (mut cache, source) = cache();
        let url = AssetUrl::from("https://cdn/a.glb");

        for _ in 0..5 {
            assert_eq!(cache.resolve(&url).state(), LoadState::Pending);
        }
        assert_eq!(source.requested(), vec![url.clone()]);
        assert_eq!(cache.len(), 1);

        assert!(source.succeed(&url, block_asset()));
        assert_eq!(cache.apply_completions(16), vec![url.clone()]);
        for _ in 0..3 {
            assert_eq!(cache.resolve(&url).state(), LoadState::Ready);
        }
        assert_eq!(source.requested().len(), 1);
        assert_eq!(cache.metrics().counter(Counter::LoadsStarted), 1);
    }

    #[test]
    fn nothing_changes_until_completions_are_applied() {
        let (mut cache, source) = cache();
        let url = AssetUrl::from("a.bin");
        cache.resolve(&url);
        source.succeed(&url, block_asset());

        assert_eq!(cache.state("a.bin"), Some(LoadState::Pending));
        assert_eq!(cache.queued_completions(), 1);
        cache.apply_completions(1);
        assert_eq!(cache.state("a.bin"), Some(LoadState::Ready));

        let record = cache.get("a.bin").unwrap();
        let asset = record.asset().unwrap();
        assert_eq!(record.origin_offset(), Some(asset.origin_offset()));
        assert!(cache.ready_asset("a.bin").is_some());
    }

    #[test]
    fn failed_records_stay_and_are_not_refetched() {
        let (mut cache, source) = cache();
        let url = AssetUrl::from("broken.glb");
        cache.resolve(&url);
        source.fail(&url, AssetLoadError::Decode(AssetDecodeError::NoGeometry));
        cache.apply_completions(16);

        let record = cache.resolve(&url);
        assert_eq!(record.state(), LoadState::Failed);
        assert!(record.asset().is_none());
        assert!(record.error().unwrap().contains("no triangle geometry"));
        assert_eq!(source.requested().len(), 1);
        assert_eq!(cache.failed_count(), 1);
    }

    #[test]
    fn retry_failed_allows_one_new_fetch() {
        let (mut cache, source) = cache();
        let url = AssetUrl::from("flaky.glb");
        cache.resolve(&url);
        source.fail(&url, AssetLoadError::Worker("boom".into()));
        cache.apply_completions(16);

        assert_eq!(cache.retry_failed(), vec![url.clone()]);
        assert!(cache.get(url.as_str()).is_none());
        cache.resolve(&url);
        cache.resolve(&url);
        assert_eq!(source.requested(), vec![url.clone(), url]);
    }

    #[test]
    fn apply_respects_limit_and_arrival_order() {
        let (mut cache, source) = cache();
        let urls: Vec<AssetUrl> = ["c", "a", "b"].into_iter().map(AssetUrl::from).collect();
        for url in &urls {
            cache.resolve(url);
        }
        for url in &urls {
            source.succeed(url, block_asset());
        }

        assert_eq!(cache.apply_completions(2), urls[..2].to_vec());
        assert_eq!(cache.queued_completions(), 1);
        assert_eq!(cache.apply_completions(2), urls[2..].to_vec());
    }

    #[test]
    fn completion_after_release_is_discarded() {
        let (mut cache, source) = cache();
        let url = AssetUrl::from("late.glb");
        cache.resolve(&url);
        assert_eq!(cache.release(), 1);

        assert!(source.succeed(&url, block_asset()));
        assert!(cache.apply_completions(16).is_empty());
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().counter(Counter::CompletionsDiscarded), 1);
    }
}
