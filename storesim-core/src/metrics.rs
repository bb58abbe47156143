//! Thread-safe aggregation of workload statistics.
//!
//! The [`MetricsAggregator`] is shared by all workers. Every finished operation is reported via
//! [`record`](MetricsAggregator::record), which bumps a set of atomic counters and appends the
//! latency to a bounded sample window. [`snapshot_and_reset_window`] derives a
//! [`RuntimeMetricsSnapshot`] from that state.
//!
//! There are two kinds of counters:
//!  - *Totals* count all operations since startup and are never reset.
//!  - *Windowed* counts are swapped to zero on every snapshot. Polled once per second, they read as
//!    per-second rates. Polling at any other cadence skews these rates.
//!
//! The latency window is independent of the windowed counters. It always holds the most recent
//! [`LATENCY_WINDOW_SIZE`] samples and is not cleared by snapshots.
//!
//! [`snapshot_and_reset_window`]: MetricsAggregator::snapshot_and_reset_window

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::config::{Configuration, TuningTable, TuningValue};
use crate::engine::Operation;

/// The maximum number of latency samples kept for percentile estimation.
pub const LATENCY_WINDOW_SIZE: usize = 10_000;

/// Number of live keys that make up one simulated cached segment.
const KEYS_PER_CACHED_SEGMENT: u64 = 100_000;

/// Collects counters and latencies reported by workers.
#[derive(Debug)]
pub struct MetricsAggregator {
    config: Arc<Configuration>,
    started_at: Instant,

    totals: OperationCounters,
    window: OperationCounters,

    filter_hits: AtomicU64,
    filter_misses: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_loads: AtomicU64,

    key_count: AtomicU64,

    latencies: LatencyWindow,
}

impl MetricsAggregator {
    /// Creates an empty aggregator. Uptime is measured from this call.
    pub fn new(config: Arc<Configuration>) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            totals: OperationCounters::default(),
            window: OperationCounters::default(),
            filter_hits: AtomicU64::new(0),
            filter_misses: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_loads: AtomicU64::new(0),
            key_count: AtomicU64::new(0),
            latencies: LatencyWindow::new(LATENCY_WINDOW_SIZE),
        }
    }

    /// Records a finished operation.
    ///
    /// `filter_hit` and `cache_hit` report the outcome of the two simulated lookup layers. A cache
    /// miss also counts as a cache load.
    pub fn record(&self, op: Operation, latency_micros: u64, filter_hit: bool, cache_hit: bool) {
        self.totals.increment(op);
        self.window.increment(op);

        if filter_hit {
            self.filter_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.filter_misses.fetch_add(1, Ordering::Relaxed);
        }

        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
            self.cache_loads.fetch_add(1, Ordering::Relaxed);
        }

        self.latencies.push(latency_micros);
    }

    /// Publishes the current number of live keys for inclusion in snapshots.
    pub fn set_key_count(&self, keys: u64) {
        self.key_count.store(keys, Ordering::Relaxed);
    }

    /// Returns the latency samples currently in the window, oldest first.
    pub fn latency_samples(&self) -> Vec<u64> {
        self.latencies.samples()
    }

    /// Takes a snapshot of all statistics and resets the windowed counters.
    ///
    /// The windowed counters are swapped out atomically, so events recorded concurrently are
    /// attributed to either this snapshot or the next one, but never lost or counted twice.
    pub fn snapshot_and_reset_window(&self) -> RuntimeMetricsSnapshot {
        let window = self.window.take();
        let totals = self.totals.load();
        let latency = LatencyStats::compute(self.latencies.samples());

        let filter_hits = self.filter_hits.load(Ordering::Relaxed);
        let filter_misses = self.filter_misses.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let key_count = self.key_count.load(Ordering::Relaxed);

        let tuning = self.config.tuning();
        let cache_max = tuning.max_number_of_segments_in_cache.max(0) as u64;
        let cache_current = cache_max.min((key_count / KEYS_PER_CACHED_SEGMENT).max(1));
        let cache_fill = (cache_current as f64 * 100.0 / cache_max.max(1) as f64).min(100.0);

        RuntimeMetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs().max(1),

            total_ops: totals.total,
            total_reads: totals.read,
            total_writes: totals.write,
            total_deletes: totals.delete,

            ops_per_second: window.total,
            reads_per_second: window.read,
            writes_per_second: window.write,
            deletes_per_second: window.delete,

            avg_latency_ms: latency.mean_micros / 1000.0,
            p50_latency_ms: latency.p50_micros as f64 / 1000.0,
            p95_latency_ms: latency.p95_micros as f64 / 1000.0,
            p99_latency_ms: latency.p99_micros as f64 / 1000.0,

            key_count,
            bloom_index_size_bytes: tuning.bloom_filter_index_size_in_bytes.max(0) as u64,
            bloom_filter_hits: filter_hits,
            bloom_filter_misses: filter_misses,
            bloom_hit_ratio: hit_ratio(filter_hits, filter_misses),

            registry_cache_hits: cache_hits,
            registry_cache_misses: cache_misses,
            registry_cache_loads: self.cache_loads.load(Ordering::Relaxed),
            // The simulated registry never evicts.
            registry_cache_evictions: 0,
            registry_cache_current: cache_current,
            registry_cache_max: cache_max,
            registry_cache_hit_ratio: hit_ratio(cache_hits, cache_misses),
            registry_cache_fill: cache_fill,

            node_config: self.config.export(),
        }
    }
}

/// Returns `hits` as a percentage of all observations, `0` if there are none.
fn hit_ratio(hits: u64, misses: u64) -> f64 {
    hits as f64 * 100.0 / (hits + misses).max(1) as f64
}

/// An immutable point-in-time view of the workload statistics.
///
/// Serializes with the camelCase field names expected by the monitoring console.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMetricsSnapshot {
    /// Seconds since the aggregator was created, at least `1`.
    pub uptime_seconds: u64,

    /// All operations since startup.
    pub total_ops: u64,
    /// All read operations since startup.
    #[serde(rename = "totalGte")]
    pub total_reads: u64,
    /// All write operations since startup.
    #[serde(rename = "totalPut")]
    pub total_writes: u64,
    /// All delete operations since startup.
    pub total_deletes: u64,

    /// Operations since the previous snapshot.
    pub ops_per_second: u64,
    /// Read operations since the previous snapshot.
    #[serde(rename = "gtePerSecond")]
    pub reads_per_second: u64,
    /// Write operations since the previous snapshot.
    #[serde(rename = "putPerSecond")]
    pub writes_per_second: u64,
    /// Delete operations since the previous snapshot.
    pub deletes_per_second: u64,

    /// Mean latency over the sample window, in milliseconds.
    pub avg_latency_ms: f64,
    /// Median latency over the sample window, in milliseconds.
    pub p50_latency_ms: f64,
    /// 95th percentile latency over the sample window, in milliseconds.
    pub p95_latency_ms: f64,
    /// 99th percentile latency over the sample window, in milliseconds.
    pub p99_latency_ms: f64,

    /// Number of live keys in the store when the snapshot was taken.
    pub key_count: u64,
    /// Configured size of the simulated Bloom filter index.
    pub bloom_index_size_bytes: u64,
    /// Simulated filter hits since startup.
    pub bloom_filter_hits: u64,
    /// Simulated filter misses since startup.
    pub bloom_filter_misses: u64,
    /// Filter hits in percent.
    pub bloom_hit_ratio: f64,

    /// Simulated registry cache hits since startup.
    pub registry_cache_hits: u64,
    /// Simulated registry cache misses since startup.
    pub registry_cache_misses: u64,
    /// Simulated registry cache loads since startup.
    pub registry_cache_loads: u64,
    /// Simulated registry cache evictions since startup.
    pub registry_cache_evictions: u64,
    /// Estimated number of cached segments.
    pub registry_cache_current: u64,
    /// Capacity of the segment cache.
    pub registry_cache_max: u64,
    /// Registry cache hits in percent.
    pub registry_cache_hit_ratio: f64,
    /// Estimated segment cache fill in percent, at most `100`.
    pub registry_cache_fill: f64,

    /// The reportable tuning parameters.
    pub node_config: TuningTable<TuningValue>,
}

#[derive(Debug, Default)]
struct OperationCounters {
    total: AtomicU64,
    read: AtomicU64,
    write: AtomicU64,
    delete: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct OperationCounts {
    total: u64,
    read: u64,
    write: u64,
    delete: u64,
}

impl OperationCounters {
    fn increment(&self, op: Operation) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match op {
            Operation::Read => &self.read,
            Operation::Write => &self.write,
            Operation::Delete => &self.delete,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> OperationCounts {
        OperationCounts {
            total: self.total.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
            write: self.write.load(Ordering::Relaxed),
            delete: self.delete.load(Ordering::Relaxed),
        }
    }

    fn take(&self) -> OperationCounts {
        OperationCounts {
            total: self.total.swap(0, Ordering::Relaxed),
            read: self.read.swap(0, Ordering::Relaxed),
            write: self.write.swap(0, Ordering::Relaxed),
            delete: self.delete.swap(0, Ordering::Relaxed),
        }
    }
}

/// Fixed-capacity FIFO of latency samples.
///
/// Backed by a ring buffer behind a mutex, so the capacity is never exceeded even under
/// contention. The critical section is a single store.
#[derive(Debug)]
struct LatencyWindow {
    ring: Mutex<Ring>,
}

#[derive(Debug)]
struct Ring {
    samples: Box<[u64]>,
    /// Position of the next write, which is also the oldest sample once the ring is full.
    head: usize,
    len: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        let ring = Ring {
            samples: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        };

        Self {
            ring: Mutex::new(ring),
        }
    }

    fn push(&self, sample: u64) {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = ring.samples.len();
        if capacity == 0 {
            return;
        }

        let head = ring.head;
        ring.samples[head] = sample;
        ring.head = (head + 1) % capacity;
        ring.len = (ring.len + 1).min(capacity);
    }

    fn samples(&self) -> Vec<u64> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.len < ring.samples.len() {
            return ring.samples[..ring.len].to_vec();
        }

        let (newer, older) = ring.samples.split_at(ring.head);
        let mut samples = Vec::with_capacity(ring.len);
        samples.extend_from_slice(older);
        samples.extend_from_slice(newer);
        samples
    }
}

/// Latency statistics over a set of samples, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct LatencyStats {
    mean_micros: f64,
    p50_micros: u64,
    p95_micros: u64,
    p99_micros: u64,
}

impl LatencyStats {
    fn compute(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_unstable();
        let sum: u128 = samples.iter().map(|&s| s as u128).sum();

        Self {
            mean_micros: sum as f64 / samples.len() as f64,
            p50_micros: percentile(&samples, 0.50),
            p95_micros: percentile(&samples, 0.95),
            p99_micros: percentile(&samples, 0.99),
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    let rank = (p * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use super::*;

    fn aggregator() -> MetricsAggregator {
        let config = Configuration::defaults(4, 1000, 0.6, 0.3, 0.1);
        MetricsAggregator::new(Arc::new(config))
    }

    #[test]
    fn window_is_bounded() {
        let metrics = aggregator();
        for latency in 1..=10_001 {
            metrics.record(Operation::Read, latency, true, true);
        }

        let samples = metrics.latency_samples();
        assert_eq!(samples.len(), LATENCY_WINDOW_SIZE);
        assert_eq!(samples.iter().min(), Some(&2));
        assert_eq!(samples.first(), Some(&2));
        assert_eq!(samples.last(), Some(&10_001));
    }

    #[test]
    fn window_survives_snapshots() {
        let metrics = aggregator();
        metrics.record(Operation::Write, 1500, true, true);

        let first = metrics.snapshot_and_reset_window();
        let second = metrics.snapshot_and_reset_window();
        assert_eq!(first.p50_latency_ms, 1.5);
        assert_eq!(second.p50_latency_ms, 1.5);
    }

    #[test]
    fn snapshot_resets_only_window() {
        let metrics = aggregator();
        for _ in 0..100 {
            metrics.record(Operation::Write, 10, true, true);
        }

        let first = metrics.snapshot_and_reset_window();
        assert_eq!(first.writes_per_second, 100);
        assert_eq!(first.ops_per_second, 100);
        assert_eq!(first.total_writes, 100);

        let second = metrics.snapshot_and_reset_window();
        assert_eq!(second.writes_per_second, 0);
        assert_eq!(second.ops_per_second, 0);
        assert_eq!(second.total_writes, 100);
        assert_eq!(second.total_ops, 100);
    }

    #[test]
    fn counts_per_operation() {
        let metrics = aggregator();
        metrics.record(Operation::Read, 1, true, true);
        metrics.record(Operation::Read, 1, false, true);
        metrics.record(Operation::Write, 1, true, true);
        metrics.record(Operation::Delete, 1, false, false);

        let snapshot = metrics.snapshot_and_reset_window();
        assert_eq!(snapshot.total_ops, 4);
        assert_eq!(snapshot.total_reads, 2);
        assert_eq!(snapshot.total_writes, 1);
        assert_eq!(snapshot.total_deletes, 1);
        assert_eq!(snapshot.reads_per_second, 2);
        assert_eq!(snapshot.deletes_per_second, 1);

        assert_eq!(snapshot.bloom_filter_hits, 2);
        assert_eq!(snapshot.bloom_filter_misses, 2);
        assert_eq!(snapshot.bloom_hit_ratio, 50.0);

        assert_eq!(snapshot.registry_cache_hits, 3);
        assert_eq!(snapshot.registry_cache_misses, 1);
        assert_eq!(snapshot.registry_cache_loads, 1);
        assert_eq!(snapshot.registry_cache_hit_ratio, 75.0);
    }

    #[test]
    fn empty_snapshot() {
        let metrics = aggregator();
        let snapshot = metrics.snapshot_and_reset_window();

        assert_eq!(snapshot.uptime_seconds, 1);
        assert_eq!(snapshot.total_ops, 0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
        assert_eq!(snapshot.p99_latency_ms, 0.0);
        assert_eq!(snapshot.bloom_hit_ratio, 0.0);
        assert_eq!(snapshot.registry_cache_hit_ratio, 0.0);
        assert_eq!(snapshot.bloom_index_size_bytes, 134_217_728);
        assert_eq!(snapshot.node_config.len(), 25);
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let metrics = aggregator();
        for latency in (1..=100).rev() {
            metrics.record(Operation::Read, latency * 1000, true, true);
        }

        let snapshot = metrics.snapshot_and_reset_window();
        assert_eq!(snapshot.p50_latency_ms, 50.0);
        assert_eq!(snapshot.p95_latency_ms, 95.0);
        assert_eq!(snapshot.p99_latency_ms, 99.0);
        assert_eq!(snapshot.avg_latency_ms, 50.5);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let metrics = aggregator();
        for latency in [7, 3, 900, 12, 12, 40_000, 5, 1, 0, 88] {
            metrics.record(Operation::Delete, latency, false, false);
        }

        let snapshot = metrics.snapshot_and_reset_window();
        assert!(snapshot.p50_latency_ms <= snapshot.p95_latency_ms);
        assert!(snapshot.p95_latency_ms <= snapshot.p99_latency_ms);
    }

    #[test]
    fn percentile_of_single_sample() {
        assert_eq!(percentile(&[42], 0.5), 42);
        assert_eq!(percentile(&[42], 0.99), 42);
        assert_eq!(percentile(&[], 0.5), 0);
        assert_eq!(percentile(&[1, 2], 0.0), 1);
    }

    #[test]
    fn hit_ratio_without_observations() {
        assert_eq!(hit_ratio(0, 0), 0.0);
        assert_eq!(hit_ratio(5, 0), 100.0);
        assert_eq!(hit_ratio(0, 5), 0.0);
        assert_eq!(hit_ratio(1, 3), 25.0);
    }

    #[test]
    fn cache_fill_estimate() {
        let metrics = aggregator();

        metrics.set_key_count(0);
        let snapshot = metrics.snapshot_and_reset_window();
        assert_eq!(snapshot.registry_cache_max, 16);
        assert_eq!(snapshot.registry_cache_current, 1);
        assert_eq!(snapshot.registry_cache_fill, 6.25);

        metrics.set_key_count(800_000);
        let snapshot = metrics.snapshot_and_reset_window();
        assert_eq!(snapshot.key_count, 800_000);
        assert_eq!(snapshot.registry_cache_current, 8);
        assert_eq!(snapshot.registry_cache_fill, 50.0);

        metrics.set_key_count(100_000_000);
        let snapshot = metrics.snapshot_and_reset_window();
        assert_eq!(snapshot.registry_cache_current, 16);
        assert_eq!(snapshot.registry_cache_fill, 100.0);
    }

    #[test]
    fn concurrent_recording_is_exact() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 5_000;

        let metrics = aggregator();
        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for i in 0..PER_THREAD {
                        metrics.record(Operation::Write, i, i % 2 == 0, true);
                    }
                });
            }
        });

        let snapshot = metrics.snapshot_and_reset_window();
        assert_eq!(snapshot.total_writes, THREADS * PER_THREAD);
        assert_eq!(snapshot.writes_per_second, THREADS * PER_THREAD);
        assert_eq!(
            snapshot.bloom_filter_hits + snapshot.bloom_filter_misses,
            THREADS * PER_THREAD
        );
        assert_eq!(metrics.latency_samples().len(), LATENCY_WINDOW_SIZE);
    }

    #[test]
    fn snapshots_during_recording_lose_nothing() {
        const THREADS: u64 = 4;
        const PER_THREAD: u64 = 50_000;

        let metrics = aggregator();
        let recording = AtomicBool::new(true);
        let ops = [Operation::Read, Operation::Write, Operation::Delete];

        let snapshots = thread::scope(|s| {
            let snapshotter = s.spawn(|| {
                let mut snapshots = Vec::new();
                while recording.load(Ordering::Acquire) {
                    snapshots.push(metrics.snapshot_and_reset_window());
                }
                snapshots
            });

            let recorders = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        for i in 0..PER_THREAD {
                            let op = ops[(i % 3) as usize];
                            metrics.record(op, i % 100, true, true);
                        }
                    })
                })
                .collect::<Vec<_>>();

            for recorder in recorders {
                recorder.join().unwrap();
            }
            recording.store(false, Ordering::Release);
            snapshotter.join().unwrap()
        });

        let last = metrics.snapshot_and_reset_window();
        let windowed = |field: fn(&RuntimeMetricsSnapshot) -> u64| {
            snapshots.iter().chain([&last]).map(field).sum::<u64>()
        };

        assert_eq!(last.total_ops, THREADS * PER_THREAD);
        assert_eq!(windowed(|s| s.ops_per_second), last.total_ops);
        assert_eq!(windowed(|s| s.reads_per_second), last.total_reads);
        assert_eq!(windowed(|s| s.writes_per_second), last.total_writes);
        assert_eq!(windowed(|s| s.deletes_per_second), last.total_deletes);
        assert_eq!(
            last.total_reads + last.total_writes + last.total_deletes,
            last.total_ops
        );
    }

    #[test]
    fn snapshot_serializes_with_wire_names() {
        let metrics = aggregator();
        metrics.record(Operation::Read, 1000, true, false);

        let json = serde_json::to_value(metrics.snapshot_and_reset_window()).unwrap();
        assert_eq!(json["totalGte"], 1);
        assert_eq!(json["gtePerSecond"], 1);
        assert_eq!(json["totalPut"], 0);
        assert_eq!(json["registryCacheLoads"], 1);
        assert_eq!(json["p99LatencyMs"], 1.0);
        assert_eq!(json["nodeConfig"]["maxNumberOfSegmentsInCache"], 16);
    }
}
