//! Error types.

use thiserror::Error;

/// Error type.
///
/// Recoverable errors only exist at the rebuild-pipeline boundary; everything
/// past a validly constructed component is covered by assertions instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Rebuild configuration rejected before any thread is spawned.
    #[error("invalid rebuild config: {0}")]
    InvalidConfig(String),

    /// Staged content does not match the declared sample length.
    #[error("staging length mismatch: expected {expected} samples, got {got}")]
    StagingLength { expected: usize, got: usize },

    /// The rebuild worker is not running.
    #[error("rebuild worker not running")]
    WorkerStopped,
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
