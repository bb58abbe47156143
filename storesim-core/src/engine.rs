//! The concurrent workload engine.
//!
//! The [`WorkloadEngine`] runs a fixed pool of OS threads, one per configured worker. Every worker
//! loops until the engine is stopped:
//!
//!  1. Draw a uniform sample and classify it as an [`Operation`] using the configured ratios.
//!  2. Execute the operation against the [`SharedStore`], picking existing keys with the
//!     [`SkewedKeySelector`] and fresh payloads from the [payload generator](crate::payload).
//!  3. Report the wall-clock latency and the simulated filter/cache outcome to the
//!     [`MetricsAggregator`].
//!
//! Store operations cannot fail. A panicking worker terminates only itself and is reported when the
//! engine is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::keys::SkewedKeySelector;
use crate::metrics::{MetricsAggregator, RuntimeMetricsSnapshot};
use crate::payload;
use crate::store::{SharedStore, ValueRecord};

/// How long [`WorkloadEngine::stop`] waits for workers to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Probability that a read is served by the simulated registry cache.
const READ_CACHE_HIT_PROBABILITY: f64 = 0.97;
/// Probability that a delete is served by the simulated registry cache.
const DELETE_CACHE_HIT_PROBABILITY: f64 = 0.95;

/// The class of a single workload operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// Look up an existing key.
    Read,
    /// Insert a payload under a freshly allocated key.
    Write,
    /// Remove an existing key.
    Delete,
}

impl Operation {
    /// Classifies a uniform sample in `[0, 1)` according to the operation mix.
    ///
    /// The sample is compared against the cumulative thresholds `read_ratio` and
    /// `read_ratio + write_ratio`. Everything above is a delete.
    pub fn choose(config: &Configuration, sample: f64) -> Self {
        if sample < config.read_ratio() {
            Operation::Read
        } else if sample < config.read_ratio() + config.write_ratio() {
            Operation::Write
        } else {
            Operation::Delete
        }
    }
}

/// Lifecycle of a [`WorkloadEngine`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineState {
    /// Created, but no workers have been spawned yet.
    NotStarted,
    /// Workers are executing operations.
    Running,
    /// Workers have been asked to exit.
    Stopping,
    /// All workers have exited or have been abandoned.
    Stopped,
}

/// Drives the worker pool against a shared store.
#[derive(Debug)]
pub struct WorkloadEngine {
    worker: Arc<Worker>,
    inner: Mutex<Pool>,
}

#[derive(Debug)]
struct Pool {
    state: EngineState,
    handles: Vec<JoinHandle<()>>,
    exits: Option<Receiver<()>>,
}

impl WorkloadEngine {
    /// Creates an engine. No threads are spawned before [`start`](Self::start).
    pub fn new(
        config: Arc<Configuration>,
        store: Arc<SharedStore>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        let worker = Worker {
            config,
            store,
            metrics,
            selector: SkewedKeySelector::default(),
            running: AtomicBool::new(false),
        };

        Self {
            worker: Arc::new(worker),
            inner: Mutex::new(Pool {
                state: EngineState::NotStarted,
                handles: Vec::new(),
                exits: None,
            }),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    /// Spawns one worker thread per configured thread.
    ///
    /// Returns [`Error::AlreadyStarted`] unless the engine is in its initial state.
    pub fn start(&self) -> Result<()> {
        let mut pool = self.lock();
        if pool.state != EngineState::NotStarted {
            return Err(Error::AlreadyStarted);
        }

        let threads = self.worker.config.threads();
        let (exit_tx, exit_rx) = mpsc::channel();
        self.worker.running.store(true, Ordering::Release);

        for index in 0..threads {
            let spawned = thread::Builder::new()
                .name(format!("workload-{index}"))
                .spawn(worker_main(Arc::clone(&self.worker), exit_tx.clone()));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(err) => {
                    // Leave the engine stoppable with the workers that did start.
                    pool.state = EngineState::Running;
                    pool.exits = Some(exit_rx);
                    return Err(Error::WorkerSpawn(err));
                }
            }
        }

        pool.state = EngineState::Running;
        pool.exits = Some(exit_rx);
        tracing::info!(threads, "workload engine started");

        Ok(())
    }

    /// Stops the engine, waiting up to [`DEFAULT_STOP_TIMEOUT`] for workers to exit.
    pub fn stop(&self) {
        self.stop_with_timeout(DEFAULT_STOP_TIMEOUT);
    }

    /// Stops the engine, waiting up to `timeout` for workers to exit.
    ///
    /// Workers finish their current operation and then leave their loop. Workers that have not
    /// exited when the timeout elapses are detached and no longer tracked. Calling this on an
    /// engine that was never started returns immediately.
    pub fn stop_with_timeout(&self, timeout: Duration) {
        let (handles, exits) = {
            let mut pool = self.lock();
            match pool.state {
                EngineState::NotStarted => {
                    pool.state = EngineState::Stopped;
                    return;
                }
                EngineState::Stopping | EngineState::Stopped => return,
                EngineState::Running => (),
            }

            pool.state = EngineState::Stopping;
            self.worker.running.store(false, Ordering::Release);
            (std::mem::take(&mut pool.handles), pool.exits.take())
        };

        // The pool is unlocked while waiting, so `state()` does not block on slow workers.
        tracing::info!("stopping workload engine");

        let mut exited = 0;
        if let Some(exits) = exits {
            let deadline = Instant::now() + timeout;
            while exited < handles.len() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match exits.recv_timeout(remaining) {
                    Ok(()) => exited += 1,
                    Err(_) => break,
                }
            }
        }

        // Exit notifications fire just before a thread terminates, so joining is short.
        let all_exited = exited == handles.len();
        let mut detached = 0;
        for handle in handles {
            if !all_exited && !handle.is_finished() {
                detached += 1;
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("workload worker terminated with a panic");
            }
        }

        if detached > 0 {
            tracing::warn!(
                detached,
                ?timeout,
                "workload workers did not exit in time, detaching"
            );
        }

        self.lock().state = EngineState::Stopped;
        tracing::info!("workload engine stopped");
    }

    /// Publishes the store size to the metrics and returns a fresh snapshot.
    ///
    /// This resets the windowed counters, see [`MetricsAggregator::snapshot_and_reset_window`].
    pub fn snapshot_and_reset_window(&self) -> RuntimeMetricsSnapshot {
        let metrics = &self.worker.metrics;
        metrics.set_key_count(self.worker.store.size());
        metrics.snapshot_and_reset_window()
    }

    /// The store the workers operate on.
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.worker.store
    }

    /// The aggregator the workers report to.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.worker.metrics
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pool> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkloadEngine {
    fn drop(&mut self) {
        // Detached workers hold their own reference and exit on their next iteration.
        self.worker.running.store(false, Ordering::Release);
    }
}

/// State shared by all worker threads.
#[derive(Debug)]
struct Worker {
    config: Arc<Configuration>,
    store: Arc<SharedStore>,
    metrics: Arc<MetricsAggregator>,
    selector: SkewedKeySelector,
    running: AtomicBool,
}

impl Worker {
    fn run(&self) {
        let mut rng = SmallRng::seed_from_u64(rand::random());
        while self.running.load(Ordering::Acquire) {
            self.step(&mut rng);
        }
    }

    /// Executes and records a single operation.
    fn step<R: Rng>(&self, rng: &mut R) {
        let op = Operation::choose(&self.config, rng.random());

        let start = Instant::now();
        let (filter_hit, cache_hit) = match op {
            Operation::Read => self.read(rng),
            Operation::Write => self.write(rng),
            Operation::Delete => self.delete(rng),
        };
        let latency_micros = start.elapsed().as_micros() as u64;

        self.metrics
            .record(op, latency_micros, filter_hit, cache_hit);
    }

    fn read<R: Rng>(&self, rng: &mut R) -> (bool, bool) {
        if self.store.is_empty() {
            return (false, false);
        }

        let key = self.pick_key(rng);
        let found = self.store.get(key).is_some();
        (found, rng.random_bool(READ_CACHE_HIT_PROBABILITY))
    }

    fn write<R: Rng>(&self, rng: &mut R) -> (bool, bool) {
        let key = self.store.allocate_key();
        let record = ValueRecord::new(1, payload::generate(rng));
        self.store.put(key, record);

        // A fresh write always passes both lookup layers.
        (true, true)
    }

    fn delete<R: Rng>(&self, rng: &mut R) -> (bool, bool) {
        if self.store.is_empty() {
            return (false, false);
        }

        let key = self.pick_key(rng);
        let existed = self.store.delete(key).is_some();
        (existed, rng.random_bool(DELETE_CACHE_HIT_PROBABILITY))
    }

    fn pick_key<R: Rng>(&self, rng: &mut R) -> u64 {
        let upper_bound = self.store.next_key().max(1);
        self.selector.next_key(rng, upper_bound)
    }
}

/// Returns the body of a worker thread.
///
/// The exit notifier is created only once the thread runs. A closure dropped by a failed spawn
/// never reports an exit.
fn worker_main(worker: Arc<Worker>, exits: Sender<()>) -> impl FnOnce() + Send + 'static {
    move || {
        let _exited = ExitNotifier(exits);
        worker.run();
    }
}

/// Signals the engine when a worker thread exits, including by panic.
struct ExitNotifier(Sender<()>);

impl Drop for ExitNotifier {
    fn drop(&mut self) {
        self.0.send(()).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(threads: usize, read: f64, write: f64, delete: f64) -> WorkloadEngine {
        let config = Arc::new(Configuration::defaults(threads, 1000, read, write, delete));
        config.validate().unwrap();
        let store = Arc::new(SharedStore::new(0));
        let metrics = Arc::new(MetricsAggregator::new(Arc::clone(&config)));
        WorkloadEngine::new(config, store, metrics)
    }

    #[test]
    fn choose_uses_cumulative_thresholds() {
        let config = Configuration::defaults(1, 0, 0.6, 0.3, 0.1);
        assert_eq!(Operation::choose(&config, 0.0), Operation::Read);
        assert_eq!(Operation::choose(&config, 0.59), Operation::Read);
        assert_eq!(Operation::choose(&config, 0.6), Operation::Write);
        assert_eq!(Operation::choose(&config, 0.89), Operation::Write);
        assert_eq!(Operation::choose(&config, 0.9), Operation::Delete);
        assert_eq!(Operation::choose(&config, 0.999), Operation::Delete);

        let config = Configuration::defaults(1, 0, 0.0, 1.0, 0.0);
        assert_eq!(Operation::choose(&config, 0.0), Operation::Write);
        assert_eq!(Operation::choose(&config, 0.999), Operation::Write);
    }

    #[test]
    fn stop_without_start_returns_immediately() {
        let engine = engine(4, 0.6, 0.3, 0.1);
        assert_eq!(engine.state(), EngineState::NotStarted);

        let start = Instant::now();
        engine.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(engine.state(), EngineState::Stopped);

        // Stopping twice is harmless.
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn start_is_not_reentrant() {
        let engine = engine(1, 0.6, 0.3, 0.1);
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert!(matches!(engine.start(), Err(Error::AlreadyStarted)));

        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(matches!(engine.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn write_only_workload_allocates_distinct_keys() {
        let engine = engine(4, 0.0, 1.0, 0.0);
        engine.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        engine.stop();

        let snapshot = engine.snapshot_and_reset_window();
        let store = engine.store();
        assert!(snapshot.total_writes > 0);
        assert_eq!(snapshot.total_ops, snapshot.total_writes);
        assert_eq!(store.size(), snapshot.total_writes);
        assert_eq!(store.next_key(), snapshot.total_writes);
        assert_eq!(snapshot.key_count, store.size());
        assert_eq!(snapshot.bloom_hit_ratio, 100.0);
        assert_eq!(snapshot.registry_cache_hit_ratio, 100.0);
    }

    #[test]
    fn reads_on_empty_store_miss() {
        let engine = engine(2, 1.0, 0.0, 0.0);
        engine.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        engine.stop();

        let snapshot = engine.snapshot_and_reset_window();
        assert!(snapshot.total_reads > 0);
        assert_eq!(snapshot.bloom_filter_hits, 0);
        assert_eq!(snapshot.registry_cache_hits, 0);
        assert_eq!(snapshot.key_count, 0);
    }

    #[test]
    fn mixed_workload_counts_add_up() {
        let engine = engine(4, 0.6, 0.3, 0.1);
        engine.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        engine.stop();

        let snapshot = engine.snapshot_and_reset_window();
        assert!(snapshot.total_ops > 0);
        assert_eq!(
            snapshot.total_ops,
            snapshot.total_reads + snapshot.total_writes + snapshot.total_deletes
        );
        assert_eq!(snapshot.ops_per_second, snapshot.total_ops);
        assert!(snapshot.p50_latency_ms <= snapshot.p95_latency_ms);
        assert!(snapshot.p95_latency_ms <= snapshot.p99_latency_ms);

        // Every live key was allocated by a write.
        let store = engine.store();
        assert!(store.size() <= snapshot.total_writes);
        assert_eq!(store.next_key(), snapshot.total_writes);

        // Workers are gone, so nothing is recorded anymore.
        let after = engine.snapshot_and_reset_window();
        assert_eq!(after.ops_per_second, 0);
        assert_eq!(after.total_ops, snapshot.total_ops);
    }

    #[test]
    fn unspawned_worker_reports_no_exit() {
        let engine = engine(1, 0.6, 0.3, 0.1);

        let (exit_tx, exit_rx) = mpsc::channel();
        drop(worker_main(Arc::clone(&engine.worker), exit_tx));
        assert!(matches!(
            exit_rx.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        ));

        // A worker that actually ran reports exactly one exit.
        let (exit_tx, exit_rx) = mpsc::channel();
        worker_main(Arc::clone(&engine.worker), exit_tx)();
        assert_eq!(exit_rx.try_recv(), Ok(()));
        assert!(exit_rx.try_recv().is_err());
    }

    #[test]
    fn state_is_readable_while_stopping() {
        let engine = engine(1, 0.6, 0.3, 0.1);

        // A worker that never reports its exit and outlives the stop timeout.
        let (_exit_tx, exit_rx) = mpsc::channel::<()>();
        let sleeper = thread::spawn(|| thread::sleep(Duration::from_millis(800)));
        {
            let mut pool = engine.lock();
            pool.state = EngineState::Running;
            pool.handles.push(sleeper);
            pool.exits = Some(exit_rx);
        }

        thread::scope(|s| {
            let stopping = s.spawn(|| engine.stop_with_timeout(Duration::from_millis(400)));
            thread::sleep(Duration::from_millis(100));

            let start = Instant::now();
            assert_eq!(engine.state(), EngineState::Stopping);
            assert!(start.elapsed() < Duration::from_millis(100));

            stopping.join().unwrap();
        });

        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn deletes_remove_seeded_keys() {
        let engine = engine(1, 0.0, 0.0, 1.0);
        let store = Arc::clone(engine.store());
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..10 {
            let key = store.allocate_key();
            store.put(key, ValueRecord::new(1, payload::generate(&mut rng)));
        }

        for _ in 0..1_000 {
            engine.worker.step(&mut rng);
        }

        assert!(store.is_empty());
        let snapshot = engine.snapshot_and_reset_window();
        assert_eq!(snapshot.total_deletes, 1_000);
        assert_eq!(snapshot.bloom_filter_hits, 10);
        assert_eq!(snapshot.bloom_filter_misses, 990);
    }
}
