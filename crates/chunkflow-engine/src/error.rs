//! Error types for the chunkflow runtime.

use thiserror::Error;

/// Errors surfaced by the runtime pipeline and its MySQL collaborators.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid or incomplete run configuration.
    #[error("config error: {msg}")]
    Config {
        /// What was wrong with the configuration.
        msg: String,
    },

    /// Statement or table metadata could not be understood.
    #[error("introspection error: {msg}")]
    Introspection {
        /// Parser or metadata detail.
        msg: String,
    },

    /// A connection to the source server could not be established.
    #[error("connection error: {msg}")]
    Connection {
        /// Driver-level detail.
        msg: String,
    },

    /// A boundary fetch failed or the boundary stream was malformed.
    #[error("boundary read failed: {msg}")]
    Read {
        /// Driver-level or pipeline detail.
        msg: String,
    },

    /// A chunk statement failed, including after retries.
    #[error("write failed: {msg}")]
    Write {
        /// The original statement error.
        msg: String,
    },

    /// A replica could not be polled for lag.
    #[error("replica {host} poll failed: {msg}")]
    ReplicaPoll {
        /// Replica host name.
        host: String,
        /// Driver-level detail.
        msg: String,
    },

    /// The run was interrupted before the terminal boundary.
    #[error("interrupted")]
    Interrupted,
}

impl From<chunkflow_core::CoreError> for EngineError {
    fn from(err: chunkflow_core::CoreError) -> Self {
        EngineError::Introspection {
            msg: err.to_string(),
        }
    }
}
