//! Test utilities for the storesim runner.
//!
//! This crate provides utilities to facilitate end-to-end testing of the runner. See the modules
//! for all available utilities.

pub mod server;
pub mod tracing;
