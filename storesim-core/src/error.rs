use thiserror::Error;

/// Errors that can occur while setting up or controlling a workload.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation mix does not add up to `1.0`.
    #[error("invalid configuration: operation ratios must sum to 1.0, got {sum}")]
    InvalidConfiguration {
        /// The actual sum of the read, write and delete ratios.
        sum: f64,
    },

    /// The engine was asked to start while it was not in its initial state.
    #[error("workload engine has already been started")]
    AlreadyStarted,

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn workload worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Result type for workload operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
