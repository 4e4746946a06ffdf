//! Core environment context trait for the PTZ tracking engine.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for time and scheduling.
///
/// This trait abstracts the "real world" so the dispatcher's ~30 Hz tick
/// loop can run against a real clock in production and a virtual clock in
/// deterministic scenario tests.
///
/// # Implementations
///
/// - **Production**: [`crate::tokio_impl::TokioClock`] — wraps `tokio::time`.
/// - **Simulation**: `ptz-sim`'s `VirtualClock` — a manually-advanced clock.
#[async_trait]
pub trait EngineClock: Send + Sync + 'static {
    /// Returns the monotonic time since the clock was created.
    ///
    /// Used for dwell timers, switch-interval debouncing, and track ages.
    fn now(&self) -> Duration;

    /// Returns wall-clock time, used only for externally-visible timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production this wraps `tokio::time::sleep`; in simulation it
    /// advances the virtual clock without actually waiting.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task (the dispatcher's tick worker).
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
