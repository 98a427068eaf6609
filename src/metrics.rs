//! Run metrics.
//!
//! A [`MetricsCollector`] is a cheap-to-clone handle onto shared counters and stage
//! timings. The engine records into it from every worker; the runner exports it as
//! JSON next to the report.
//!
//! Names are dotted paths:
//!
//! | metric                               | meaning                                   |
//! |--------------------------------------|-------------------------------------------|
//! | `rows_extracted.<event>`             | rows in the raw dataset                   |
//! | `rows_persisted.<event>`             | rows written by the sink                  |
//! | `cache_hits.<event>`                 | extraction served without a network call  |
//! | `parse_failures.<event>.<column>`    | cells turned into the unparseable marker  |
//! | `rows_filtered.<event>`              | rows removed by a declared filter         |
//! | `pipelines_failed` / `pipelines_ok`  | final states                              |
//! | `stage_ms.<event>.<stage>` (timing)  | wall time spent in a stage                |
//!
//! # Example
//!
//! ```
//! use pixelbeam::metrics::MetricsCollector;
//! use std::time::Duration;
//!
//! let metrics = MetricsCollector::new();
//! metrics.increment_counter("rows_extracted.battles", 120);
//! metrics.record_timing("stage_ms.battles.extract", Duration::from_millis(42));
//! assert_eq!(metrics.counter("rows_extracted.battles"), 120);
//! ```

use crate::io::atomic::write_atomic;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

/// Thread-safe container for run counters and timings.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

#[derive(Debug, Default)]
struct MetricsCollectorInner {
    counters: BTreeMap<String, u64>,
    timings: BTreeMap<String, Duration>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsCollectorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the start of the run.
    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    /// Record the end of the run.
    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Run duration, once both ends are recorded.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to a counter, creating it at zero.
    pub fn increment_counter(&self, name: &str, value: u64) {
        *self.lock().counters.entry(name.to_string()).or_default() += value;
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().counters.insert(name.to_string(), value);
    }

    /// Current value of a counter; zero if never touched.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    /// Add `elapsed` to a timing.
    pub fn record_timing(&self, name: &str, elapsed: Duration) {
        *self.lock().timings.entry(name.to_string()).or_default() += elapsed;
    }

    #[must_use]
    pub fn timing(&self, name: &str) -> Option<Duration> {
        self.lock().timings.get(name).copied()
    }

    /// Time `f` under `name`.
    pub fn time<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record_timing(name, start.elapsed());
        out
    }

    /// Everything as one JSON object: `{counters, timings_ms, execution_time_ms?}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let timings: serde_json::Map<String, Value> = inner
            .timings
            .iter()
            .map(|(k, d)| (k.clone(), json!(d.as_millis())))
            .collect();
        let mut out = json!({
            "counters": inner.counters,
            "timings_ms": timings,
        });
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time)
            && let Some(obj) = out.as_object_mut()
        {
            obj.insert(
                "execution_time_ms".to_string(),
                json!(end.duration_since(start).as_millis()),
            );
        }
        out
    }

    /// Log a one-line summary per counter at `info`.
    pub fn log_summary(&self) {
        let inner = self.lock();
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            info!(elapsed_ms = end.duration_since(start).as_millis(), "run finished");
        }
        for (name, value) in &inner.counters {
            info!(metric = %name, value, "counter");
        }
    }

    /// Write [`MetricsCollector::to_json`] to `path`, pretty-printed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json();
        write_atomic(path, |w| {
            serde_json::to_writer_pretty(&mut *w, &json)
                .with_context(|| format!("serialize metrics to {}", path.display()))
        })
    }

    /// Copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.lock().counters.clone()
    }
}
