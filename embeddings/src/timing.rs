//! Named timers for long-running operations.
//!
//! Purely observational: recording a measurement never changes the outcome
//! of the operation being measured.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

/// Accumulated measurements for one timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Number of recorded runs.
    pub count: u64,

    /// Sum of all recorded durations.
    pub total: Duration,
}

impl TimerStats {
    /// Mean duration per run.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Registry of named timers, shared between the worker and the cache.
#[derive(Debug, Default)]
pub struct Timings {
    store: Mutex<BTreeMap<String, TimerStats>>,
}

impl Timings {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, TimerStats>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one run of `name`.
    pub fn record(&self, name: &str, duration: Duration) {
        let mut store = self.lock();
        let stats = store.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.total += duration;
    }

    /// Time a closure under `name`.
    pub fn track<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    /// Time a future under `name`.
    pub async fn track_async<F: Future>(&self, name: &str, future: F) -> F::Output {
        let start = Instant::now();
        let result = future.await;
        self.record(name, start.elapsed());
        result
    }

    /// Stats for `name`, if it was ever recorded.
    pub fn stats(&self, name: &str) -> Option<TimerStats> {
        self.lock().get(name).copied()
    }

    /// Number of recorded runs of `name`.
    pub fn count(&self, name: &str) -> u64 {
        self.stats(name).map_or(0, |s| s.count)
    }

    /// Forget everything recorded under `name`.
    pub fn reset(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Snapshot of every timer.
    pub fn snapshot(&self) -> BTreeMap<String, TimerStats> {
        self.lock().clone()
    }

    /// Log the stats for `name`.
    pub fn report(&self, name: &str) {
        match self.stats(name) {
            Some(stats) => info!(
                timer = name,
                count = stats.count,
                "total={:?} avg={:?}",
                stats.total,
                stats.average()
            ),
            None => info!(timer = name, "no recordings"),
        }
    }

    /// Log the stats for every timer.
    pub fn report_all(&self) {
        for (name, stats) in self.snapshot() {
            info!(
                timer = %name,
                count = stats.count,
                "total={:?} avg={:?}",
                stats.total,
                stats.average()
            );
        }
    }
}
