//! Motion predictor (C6).
//!
//! A thin wrapper over [`geometry::predict`] that applies the
//! configured prediction horizon and the confidence discount for an
//! extrapolated (as opposed to observed) position.

use crate::config::MotionConfig;
use crate::geometry;
use crate::track::Track;
use nalgebra::Vector2;

/// A predicted target position, with its associated confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub position: Vector2<f64>,
    pub confidence: f64,
}

fn clamp_unit_square(pos: Vector2<f64>) -> Vector2<f64> {
    Vector2::new(pos.x.clamp(0.0, 1.0), pos.y.clamp(0.0, 1.0))
}

/// Predicts where `track` will be `config.prediction_horizon` seconds
/// ahead of its last observation, or returns its last observed position
/// unchanged if prediction is disabled or the track is not moving. Never
/// mutates the track store.
pub fn predict_position(track: &Track, config: &MotionConfig) -> Prediction {
    if !config.prediction || !track.is_moving() {
        return Prediction {
            position: track.last_position(),
            confidence: track.average_confidence(),
        };
    }

    let predicted = geometry::predict(track.last_position(), track.velocity(), config.prediction_horizon);
    Prediction {
        position: clamp_unit_square(predicted),
        confidence: track.average_confidence() * geometry::PREDICTION_CONFIDENCE_FACTOR,
    }
}
