//! Engine configuration.
//!
//! An immutable-per-session record of every recognised option, plus the
//! four named presets.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Alternation (target scheduling) options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlternationConfig {
    pub enabled: bool,
    pub primary_dwell: f64,
    pub secondary_dwell: f64,
    pub min_switch_interval: f64,
    pub max_switch_interval: f64,
}

impl Default for AlternationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_dwell: 5.0,
            secondary_dwell: 3.0,
            min_switch_interval: 1.0,
            max_switch_interval: 30.0,
        }
    }
}

/// Priority-scoring weights (need not sum to 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub w_conf: f64,
    pub w_move: f64,
    pub w_size: f64,
    pub w_prox: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            w_conf: 0.4,
            w_move: 0.3,
            w_size: 0.2,
            w_prox: 0.1,
        }
    }
}

/// Auto-zoom options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    pub enabled: bool,
    pub target_ratio: f64,
    pub zoom_speed: f64,
    pub min_level: f64,
    pub max_level: f64,
    /// Fraction of `target_ratio` defining the no-change deadband, e.g.
    /// `0.2` means `±20%` of `target_ratio`.
    pub deadband_fraction: f64,
    /// Minimum change magnitude to actually dispatch a zoom command.
    pub hysteresis: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_ratio: 0.25,
            zoom_speed: 0.3,
            min_level: 0.0,
            max_level: 1.0,
            deadband_fraction: 0.2,
            hysteresis: 0.05,
        }
    }
}

/// Detection filtering and track-capacity options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilteringConfig {
    pub min_confidence: f64,
    pub min_size: f64,
    pub max_size: f64,
    pub max_objects: usize,
    pub object_timeout: f64,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_size: 0.01,
            max_size: 0.8,
            max_objects: 3,
            object_timeout: 3.0,
        }
    }
}

/// Motion control options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    pub max_pan: f64,
    pub max_tilt: f64,
    pub smoothing: f64,
    pub prediction: bool,
    pub prediction_horizon: f64,
    pub adaptive_gain: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            max_pan: 0.8,
            max_tilt: 0.8,
            smoothing: 0.5,
            prediction: true,
            prediction_horizon: 0.1,
            adaptive_gain: true,
        }
    }
}

/// Per-call camera-driver timeout options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout for `absolute_move`/`goto_preset` calls, which settle slower
    /// than a continuous-move nudge.
    pub absolute_move_timeout: f64,
    /// Timeout for `continuous_move` calls, dispatched at ~30Hz.
    pub continuous_move_timeout: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            absolute_move_timeout: 10.0,
            continuous_move_timeout: 1.0,
        }
    }
}

/// Full, immutable-per-session engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    pub alternation: AlternationConfig,
    pub priority: PriorityWeights,
    pub zoom: ZoomConfig,
    pub filtering: FilteringConfig,
    pub motion: MotionConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Default configuration, equivalent to [`Config::standard`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Balanced defaults suitable for general-purpose single-camera
    /// tracking.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Shorter dwells and a higher movement weight — reacts faster.
    pub fn fast() -> Self {
        Self {
            alternation: AlternationConfig {
                primary_dwell: 2.5,
                secondary_dwell: 1.5,
                min_switch_interval: 0.5,
                max_switch_interval: 15.0,
                ..Default::default()
            },
            priority: PriorityWeights {
                w_conf: 0.25,
                w_move: 0.45,
                w_size: 0.2,
                w_prox: 0.1,
            },
            ..Default::default()
        }
    }

    /// Longer dwells, higher confidence weight, at most two objects.
    pub fn precise() -> Self {
        Self {
            alternation: AlternationConfig {
                primary_dwell: 10.0,
                secondary_dwell: 6.0,
                min_switch_interval: 2.0,
                max_switch_interval: 60.0,
                ..Default::default()
            },
            priority: PriorityWeights {
                w_conf: 0.55,
                w_move: 0.2,
                w_size: 0.15,
                w_prox: 0.1,
            },
            filtering: FilteringConfig {
                max_objects: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Alternation disabled, tracks exactly one object.
    pub fn single() -> Self {
        Self {
            alternation: AlternationConfig {
                enabled: false,
                ..Default::default()
            },
            filtering: FilteringConfig {
                max_objects: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validates cross-field invariants individual fields can't enforce
    /// alone (positive dwell times, sane pan/tilt/zoom bounds, and so on).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alternation.primary_dwell <= 0.0 || self.alternation.secondary_dwell <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "dwell times must be positive".into(),
            ));
        }
        if self.alternation.min_switch_interval > self.alternation.max_switch_interval {
            return Err(ConfigError::InvalidValue(
                "min_switch_interval must not exceed max_switch_interval".into(),
            ));
        }
        if self.zoom.min_level > self.zoom.max_level {
            return Err(ConfigError::InvalidValue(
                "zoom min_level must not exceed max_level".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.zoom.target_ratio) {
            return Err(ConfigError::InvalidValue(
                "target_ratio must be within [0, 1]".into(),
            ));
        }
        if self.filtering.max_objects == 0 || self.filtering.max_objects > 10 {
            return Err(ConfigError::InvalidValue(
                "max_objects must be in 1..=10".into(),
            ));
        }
        if self.filtering.min_size > self.filtering.max_size {
            return Err(ConfigError::InvalidValue(
                "min_size must not exceed max_size".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.motion.smoothing) {
            return Err(ConfigError::InvalidValue(
                "smoothing must be within [0, 1]".into(),
            ));
        }
        if self.dispatch.absolute_move_timeout <= 0.0 || self.dispatch.continuous_move_timeout <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "dispatch timeouts must be positive".into(),
            ));
        }
        Ok(())
    }
}
