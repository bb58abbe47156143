//! The workload core of the storage simulator.
//!
//! This crate drives a synthetic read/write/delete workload against an in-memory key space and
//! derives latency and throughput statistics from it. It stands in for a real storage engine, so
//! that the behavior of the surrounding tooling can be observed under tunable load.
//!
//! The main entry point is the [`WorkloadEngine`], which owns a fixed pool of OS worker threads.
//! Each worker repeatedly picks an [`Operation`] according to the configured mix, executes it
//! against the [`SharedStore`], and reports the timing to the [`MetricsAggregator`]:
//!
//! ```
//! use std::sync::Arc;
//!
//! use storesim_core::{Configuration, MetricsAggregator, SharedStore, WorkloadEngine};
//!
//! let config = Arc::new(Configuration::defaults(2, 1_000, 0.6, 0.3, 0.1));
//! config.validate().unwrap();
//!
//! let store = Arc::new(SharedStore::new(0));
//! let metrics = Arc::new(MetricsAggregator::new(Arc::clone(&config)));
//! let engine = WorkloadEngine::new(config, store, metrics);
//!
//! engine.start().unwrap();
//! let snapshot = engine.snapshot_and_reset_window();
//! engine.stop();
//! # let _ = snapshot;
//! ```
//!
//! *Read* and *delete* operations pick their keys with a [`SkewedKeySelector`], which concentrates
//! traffic on low (older) keys to model a hot/cold access pattern.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod payload;
pub mod store;

pub use crate::config::{Configuration, TuningParameter, TuningValue};
pub use crate::engine::{EngineState, Operation, WorkloadEngine};
pub use crate::error::{Error, Result};
pub use crate::keys::SkewedKeySelector;
pub use crate::metrics::{MetricsAggregator, RuntimeMetricsSnapshot};
pub use crate::store::{SharedStore, ValueRecord};
