use std::sync::Arc;

use storesim_core::{MetricsAggregator, RuntimeMetricsSnapshot, WorkloadEngine};
use tokio::sync::watch;

use crate::config::Config;
use crate::exporter::PrometheusExporter;
use crate::recovery::{self, RunnerState};

/// Shared reference to the runner [state](State).
pub type ServiceState = Arc<State>;

/// Everything the runner shares between the workload, the poller and HTTP handlers.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The runner configuration.
    pub config: Config,
    /// The workload engine. It is created but not started by [`State::new`].
    pub engine: WorkloadEngine,
    /// Prometheus gauges for the `/metrics` endpoint.
    pub exporter: PrometheusExporter,
    snapshot: watch::Sender<Option<Arc<RuntimeMetricsSnapshot>>>,
}

impl State {
    /// Validates the workload configuration and restores the store from the data directory.
    pub fn new(config: Config) -> anyhow::Result<ServiceState> {
        let workload = Arc::new(config.workload_configuration()?);
        let (store, _) = recovery::restore(&config.data_dir);
        let metrics = Arc::new(MetricsAggregator::new(Arc::clone(&workload)));
        let engine = WorkloadEngine::new(workload, store, metrics);
        let exporter = PrometheusExporter::new()?;
        let (snapshot, _) = watch::channel(None);

        Ok(Arc::new(Self {
            config,
            engine,
            exporter,
            snapshot,
        }))
    }

    /// Takes a snapshot from the engine and publishes it to all readers.
    ///
    /// This resets the per-second window, so it should be called once per second.
    pub fn poll(&self) -> Arc<RuntimeMetricsSnapshot> {
        let snapshot = Arc::new(self.engine.snapshot_and_reset_window());
        self.exporter.update(&snapshot);
        self.snapshot.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// The most recently published snapshot, if any.
    pub fn latest_snapshot(&self) -> Option<Arc<RuntimeMetricsSnapshot>> {
        self.snapshot.borrow().clone()
    }

    /// Stops the workload and saves the runner state.
    ///
    /// This blocks for up to the configured stop timeout. Failing to save the state is logged
    /// and otherwise ignored.
    pub fn shutdown(&self) {
        self.engine.stop_with_timeout(self.config.stop_timeout);

        let state = RunnerState::capture(self.engine.store());
        match recovery::save(&self.config.data_dir, &state) {
            Ok(()) => tracing::info!(
                recovered_keys = state.recovered_keys,
                next_key = state.next_key,
                "saved runner state"
            ),
            Err(err) => tracing::warn!(
                error = &err as &dyn std::error::Error,
                "failed to save runner state"
            ),
        }
    }
}
