//! Error types for the tollgate engine.

use thiserror::Error;

/// Main error type for tollgate operations.
///
/// Running out of quota is not an error: that is a normal admission
/// outcome reported through [`crate::gate::Admission::Rejected`]. The
/// variants here cover failures that prevent an admission decision from
/// being made at all.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration rejected at load or construction time
    #[error("configuration error: {0}")]
    Config(String),

    /// A counter store call failed; the admission check is aborted
    #[error("counter store error: {0}")]
    Store(String),

    /// I/O errors (configuration file loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tollgate operations.
pub type Result<T> = std::result::Result<T, GateError>;
