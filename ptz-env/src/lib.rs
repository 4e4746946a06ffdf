//! PTZ environment abstraction.
//!
//! This crate provides the "sans-IO" abstraction allowing the tracking
//! engine in `ptz-core` to run against either a production camera/clock
//! or a deterministic simulation:
//!
//! - Time (`now()`, `sleep()`, `spawn()`) — [`EngineClock`]
//! - The camera's move/zoom/preset/stop surface — [`CameraDriver`]
//!
//! # Example
//!
//! ```ignore
//! use ptz_env::{EngineClock, CameraDriver, TokioClock};
//!
//! async fn tick<C: EngineClock, D: CameraDriver>(clock: &C, driver: &D) {
//!     driver.continuous_move(0.1, -0.05).await.ok();
//!     clock.sleep(std::time::Duration::from_millis(33)).await;
//! }
//! ```

mod camera;
mod clock;
mod error;
mod tokio_impl;

pub use camera::{CameraDriver, PresetToken};
pub use clock::EngineClock;
pub use error::DriverError;
pub use tokio_impl::TokioClock;
