//! Error types for the core crate.

use thiserror::Error;

/// Errors produced while selecting a chunking key.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The table exposes no primary or unique key usable for chunking.
    #[error("no primary or unique key available for chunking")]
    NoUsableKey,

    /// A forced chunking column set matched no primary or unique key.
    #[error("forced chunking columns [{columns}] do not match any primary or unique key")]
    ForcedKeyMismatch {
        /// The comma-joined column list the caller forced.
        columns: String,
    },
}
