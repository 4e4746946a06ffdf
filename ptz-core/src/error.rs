//! Error types for the tracking engine.

use thiserror::Error;

/// Configuration validation failures, raised at engine construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

/// Closed error kinds the engine can encounter during a tick.
///
/// Local recovery is the default: only `PermanentDispatch` and an explicit
/// user `stop()` leave `Error`/`Idle` respectively. The track store itself
/// never fails — it degrades to "no tracks" instead of returning an
/// error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A detection was out of range or non-finite; the item is dropped and
    /// a counter incremented, but the tick continues.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A camera-driver call failed in a way that is safe to retry on the
    /// next tick (network timeout, 5xx). No state change.
    #[error("transient dispatch failure: {0}")]
    TransientDispatch(String),

    /// A camera-driver call failed in a way that is not safe to retry
    /// (auth failure, protocol error). Transitions the session to `Error`.
    #[error("permanent dispatch failure: {0}")]
    PermanentDispatch(String),

    /// An internal invariant was violated (history mismatch, negative
    /// `dt`). The offending frame is dropped; the tick never crashes.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<ptz_env::DriverError> for EngineError {
    fn from(err: ptz_env::DriverError) -> Self {
        match err {
            ptz_env::DriverError::Transient(msg) => Self::TransientDispatch(msg),
            ptz_env::DriverError::Permanent(msg) => Self::PermanentDispatch(msg),
        }
    }
}
