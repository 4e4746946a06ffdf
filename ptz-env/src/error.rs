//! Error types for the PTZ environment abstraction.

use thiserror::Error;

/// Errors that can occur while dispatching a command to the camera driver.
///
/// Mirrors the engine's `TransientDispatch` / `PermanentDispatch` split:
/// transient failures are retried on the next tick with no state change,
/// permanent ones must drive the session to `Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Network timeout, 5xx, connection reset — safe to retry.
    #[error("transient dispatch failure: {0}")]
    Transient(String),

    /// Auth failure, protocol error — not safe to retry.
    #[error("permanent dispatch failure: {0}")]
    Permanent(String),
}

impl DriverError {
    /// Creates a transient failure.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates a permanent failure.
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Whether the engine should retry on the next tick rather than escalate.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
