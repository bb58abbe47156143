//! The storesim runner.
//!
//! This builds on top of [`storesim_core`] and runs a [`WorkloadEngine`] as a long-lived process.
//! While the workload runs, the latest statistics are exposed over `HTTP` for monitoring tools and
//! printed to the console periodically. The number of live keys survives restarts through a small
//! state file in the data directory.
//!
//! [`WorkloadEngine`]: storesim_core::WorkloadEngine

pub mod cli;
pub mod config;
pub mod console;
pub mod endpoints;
pub mod error;
pub mod exporter;
pub mod healthcheck;
pub mod observability;
pub mod recovery;
pub mod runner;
pub mod state;
pub mod web;
