//! Multi-object PTZ tracking engine.
//!
//! Maintains tracked objects from detector bounding boxes, scores and
//! selects which object to follow, alternates between primary and
//! secondary targets with hysteresis, predicts short-term motion, and
//! dispatches pan/tilt/zoom commands to an external camera driver at
//! roughly 30Hz.
//!
//! ```ignore
//! use std::sync::Arc;
//! use ptz_core::{Config, Engine};
//! use ptz_env::TokioClock;
//!
//! # async fn run(driver: impl ptz_env::CameraDriver + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(Config::standard(), driver, TokioClock::shared())?;
//! engine.start();
//! engine.submit_detections(vec![]).await?;
//! let status = engine.get_status().await;
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod associator;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod predictor;
pub mod scorer;
pub mod selector;
pub mod telemetry;
pub mod track;

pub use config::{
    AlternationConfig, Config, DispatchConfig, FilteringConfig, MotionConfig, PriorityWeights, ZoomConfig,
};
pub use engine::{Engine, SelectorModeSnapshot, StatusSnapshot};
pub use error::{ConfigError, EngineError};
pub use geometry::{Detection, PixelBox};
pub use ptz_env::PresetToken;
pub use selector::SelectorMode;
pub use telemetry::{Event, SessionState, Stats};
pub use track::{Track, TrackId, TrackSnapshot, TrackStore};
