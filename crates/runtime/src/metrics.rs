use std::collections::BTreeMap;

/// Overlay counters.
///
/// Declaration order is the snapshot order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    LoadsStarted,
    LoadsSucceeded,
    LoadsFailed,
    CompletionsDiscarded,
    InstancesCreated,
    InstancesEvicted,
    VisibilityUpdates,
    FramesDrawn,
    FramesSkipped,
    DrawCalls,
}

impl Counter {
    pub fn name(self) -> &'static str {
        match self {
            Counter::LoadsStarted => "loads_started",
            Counter::LoadsSucceeded => "loads_succeeded",
            Counter::LoadsFailed => "loads_failed",
            Counter::CompletionsDiscarded => "completions_discarded",
            Counter::InstancesCreated => "instances_created",
            Counter::InstancesEvicted => "instances_evicted",
            Counter::VisibilityUpdates => "visibility_updates",
            Counter::FramesDrawn => "frames_drawn",
            Counter::FramesSkipped => "frames_skipped",
            Counter::DrawCalls => "draw_calls",
        }
    }
}

/// Deterministic counter aggregation.
///
/// Metrics must not depend on wall-clock time or unordered iteration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<Counter, u64>,
    gauges: BTreeMap<&'static str, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub gauges: Vec<(&'static str, i64)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters.get(&counter).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: Counter, by: u64) {
        if by == 0 {
            return;
        }
        *self.counters.entry(counter).or_insert(0) += by;
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    pub fn set_gauge(&mut self, name: &'static str, value: i64) {
        self.gauges.insert(name, value);
    }

    /// Adds every counter of `other` into `self`. Gauges of `other` win.
    pub fn merge(&mut self, other: &Metrics) {
        for (&counter, &value) in &other.counters {
            self.add(counter, value);
        }
        for (&name, &value) in &other.gauges {
            self.gauges.insert(name, value);
        }
    }

    /// Returns a stable, sorted snapshot suitable for logs/debug UI.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (k.name(), *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}
