//! Camera driver abstraction for the PTZ tracking engine.

use async_trait::async_trait;
use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque token identifying a camera-side stored preset orientation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetToken(pub String);

impl PresetToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Display for PresetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Abstraction for the capability set a PTZ camera exposes over its
/// ONVIF-style control interface.
///
/// # Implementations
///
/// - **Production**: a networked ONVIF client (out of scope for this
///   repo beyond this trait boundary; the transport is an external
///   collaborator).
/// - **Simulation**: `ptz-sim`'s `RecordingCameraDriver`, a deterministic
///   test double that records every dispatched command.
///
/// # Packet flow
///
/// ```text
/// Dispatcher                 CameraDriver                  Camera
///   |                           |                            |
///   |-- continuous_move() ----->|                            |
///   |                           |-- ONVIF SOAP request ----->|
///   |                           |<----------- ack/err -------|
///   |<-- Result<(), DriverError>|                            |
/// ```
#[async_trait]
pub trait CameraDriver: Send + Sync + 'static {
    /// Issues a continuous pan/tilt move. `pan`/`tilt` are in `[-1, 1]`.
    async fn continuous_move(&self, pan: f64, tilt: f64) -> Result<(), DriverError>;

    /// Issues an absolute zoom move. `zoom` is in `[0, 1]`.
    async fn absolute_move(&self, zoom: f64) -> Result<(), DriverError>;

    /// Requests a move to a named preset. Preempts continuous moves for
    /// the duration of the transit.
    async fn goto_preset(&self, token: &PresetToken) -> Result<(), DriverError>;

    /// Stops pan/tilt and/or zoom motion.
    async fn stop(&self, pan_tilt: bool, zoom: bool) -> Result<(), DriverError>;
}

/// Lets callers hold on to a shared reference to a driver (e.g. a test
/// double they want to inspect after handing it to the engine) while
/// the engine still owns a `CameraDriver` value.
#[async_trait]
impl<T: CameraDriver + ?Sized> CameraDriver for Arc<T> {
    async fn continuous_move(&self, pan: f64, tilt: f64) -> Result<(), DriverError> {
        (**self).continuous_move(pan, tilt).await
    }

    async fn absolute_move(&self, zoom: f64) -> Result<(), DriverError> {
        (**self).absolute_move(zoom).await
    }

    async fn goto_preset(&self, token: &PresetToken) -> Result<(), DriverError> {
        (**self).goto_preset(token).await
    }

    async fn stop(&self, pan_tilt: bool, zoom: bool) -> Result<(), DriverError> {
        (**self).stop(pan_tilt, zoom).await
    }
}
