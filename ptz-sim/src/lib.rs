//! Deterministic scenario harness for the PTZ tracking engine.
//!
//! Drives a `ptz_core::Engine` against a virtual clock and a recording
//! camera driver instead of real time and hardware, so the six
//! scenarios in `runner` run exactly the same way on every invocation.

mod clock;
mod driver;
pub mod scenarios;
mod runner;

pub use clock::VirtualClock;
pub use driver::{RecordedCommand, RecordingCameraDriver};
pub use runner::{run, ScenarioResult};
pub use scenarios::ScenarioId;
