//! PTZ controller (C7).
//!
//! Converts a target position/size into pan/tilt/zoom commands: an
//! offset-from-centre law for pan/tilt, a deadband+hysteresis law for
//! zoom, and exponential smoothing across ticks so commands don't jitter
//! frame to frame.

use crate::config::{MotionConfig, ZoomConfig};
use crate::geometry;
use nalgebra::Vector2;

/// One tick's worth of camera commands. `zoom` is `None` when the zoom
/// law decided no change clears its hysteresis band — the dispatcher
/// must not call `absolute_move` in that case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: Option<f64>,
}

impl ControlCommand {
    pub fn is_zero_motion(&self) -> bool {
        self.pan == 0.0 && self.tilt == 0.0 && self.zoom.is_none()
    }
}

/// How far the zoom target steps toward (or away from) the far end of
/// its range on each tick the object sits outside the deadband.
const ZOOM_TARGET_STEP: f64 = 0.1;

/// Stateful pan/tilt/zoom controller, one per engine session.
pub struct Controller {
    motion: MotionConfig,
    zoom: ZoomConfig,
    smoothed_pan: f64,
    smoothed_tilt: f64,
    zoom_level: f64,
    /// Where the deadband check wants the commanded zoom to end up;
    /// `zoom_level` slews toward this by `zoom_speed` each tick rather
    /// than jumping to it directly.
    target_zoom: f64,
    /// `zoom_level` the last time a zoom command was actually dispatched.
    /// `zoom_level` itself keeps slewing every tick regardless of whether
    /// a command clears the hysteresis gate, so it still converges to
    /// `target_zoom` rather than stalling just short of it.
    last_dispatched_zoom: f64,
}

impl Controller {
    pub fn new(motion: MotionConfig, zoom: ZoomConfig) -> Self {
        let zoom_level = (zoom.min_level + zoom.max_level) / 2.0;
        Self {
            motion,
            zoom,
            smoothed_pan: 0.0,
            smoothed_tilt: 0.0,
            zoom_level,
            target_zoom: zoom_level,
            last_dispatched_zoom: zoom_level,
        }
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    /// Computes this tick's command for a target at `position` with mean
    /// box area `area_ratio`, both already a prediction-adjusted value
    /// from C6 if prediction is enabled.
    pub fn compute(&mut self, position: Vector2<f64>, area_ratio: f64) -> ControlCommand {
        let offset = position - geometry::FRAME_CENTRE;
        let gain = if self.motion.adaptive_gain {
            1.0 + geometry::centre_distance(position)
        } else {
            1.0
        };

        // Tilt is negated relative to pan: image-Y grows downward while
        // camera tilt grows upward.
        let raw_pan = (offset.x * 2.0 * gain).clamp(-self.motion.max_pan, self.motion.max_pan);
        let raw_tilt = (-offset.y * 2.0 * gain).clamp(-self.motion.max_tilt, self.motion.max_tilt);

        let alpha = self.motion.smoothing;
        self.smoothed_pan = alpha * self.smoothed_pan + (1.0 - alpha) * raw_pan;
        self.smoothed_tilt = alpha * self.smoothed_tilt + (1.0 - alpha) * raw_tilt;

        let zoom = if self.zoom.enabled {
            self.compute_zoom(area_ratio)
        } else {
            None
        };

        ControlCommand {
            pan: self.smoothed_pan,
            tilt: self.smoothed_tilt,
            zoom,
        }
    }

    /// Two-stage zoom law: the target level steps by `ZOOM_TARGET_STEP`
    /// toward closer/wider depending on which side of the deadband the
    /// object's area ratio falls on (held steady inside the deadband),
    /// then the commanded level slews toward that target by `zoom_speed`
    /// — a fraction of the remaining error, not an absolute step — so a
    /// single out-of-band reading doesn't snap the zoom all at once.
    fn compute_zoom(&mut self, area_ratio: f64) -> Option<f64> {
        let target = self.zoom.target_ratio;
        let lower = target * (1.0 - self.zoom.deadband_fraction);
        let upper = target * (1.0 + self.zoom.deadband_fraction);

        if area_ratio < lower {
            self.target_zoom = (self.target_zoom + ZOOM_TARGET_STEP).clamp(self.zoom.min_level, self.zoom.max_level);
        } else if area_ratio > upper {
            self.target_zoom = (self.target_zoom - ZOOM_TARGET_STEP).clamp(self.zoom.min_level, self.zoom.max_level);
        }

        let error = self.target_zoom - self.zoom_level;
        self.zoom_level = (self.zoom_level + error * self.zoom.zoom_speed).clamp(self.zoom.min_level, self.zoom.max_level);

        if (self.zoom_level - self.last_dispatched_zoom).abs() < self.zoom.hysteresis {
            return None;
        }
        self.last_dispatched_zoom = self.zoom_level;
        Some(self.zoom_level)
    }

    /// Resets smoothing state and returns the all-stop command. No
    /// further motion commands are dispatched after this until the next
    /// target acquisition.
    pub fn stop(&mut self) -> ControlCommand {
        self.smoothed_pan = 0.0;
        self.smoothed_tilt = 0.0;
        ControlCommand {
            pan: 0.0,
            tilt: 0.0,
            zoom: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_target_yields_zero_pan_tilt() {
        let mut controller = Controller::new(MotionConfig::default(), ZoomConfig::default());
        let cmd = controller.compute(geometry::FRAME_CENTRE, 0.25);
        assert_eq!(cmd.pan, 0.0);
        assert_eq!(cmd.tilt, 0.0);
    }

    #[test]
    fn off_centre_target_commands_nonzero_pan_tilt() {
        let mut controller = Controller::new(MotionConfig::default(), ZoomConfig::default());
        let cmd = controller.compute(Vector2::new(0.9, 0.5), 0.25);
        assert!(cmd.pan > 0.0);
        assert_eq!(cmd.tilt, 0.0);
    }

    #[test]
    fn tilt_is_negated_relative_to_image_y() {
        // A target below frame centre (larger cy) must tilt the camera up,
        // i.e. a negative tilt command.
        let mut controller = Controller::new(MotionConfig::default(), ZoomConfig::default());
        let cmd = controller.compute(Vector2::new(0.5, 0.9), 0.25);
        assert!(cmd.tilt < 0.0);
        assert_eq!(cmd.pan, 0.0);
    }

    #[test]
    fn pan_tilt_are_clamped_to_configured_maxima() {
        let motion = MotionConfig {
            max_pan: 0.2,
            max_tilt: 0.2,
            smoothing: 0.0,
            ..Default::default()
        };
        let mut controller = Controller::new(motion, ZoomConfig::default());
        let cmd = controller.compute(Vector2::new(1.0, 1.0), 0.25);
        assert!((cmd.pan - 0.2).abs() < 1e-9);
        assert!((cmd.tilt - 0.2).abs() < 1e-9);
    }

    #[test]
    fn smoothing_damps_a_sudden_jump() {
        let motion = MotionConfig {
            smoothing: 0.9,
            adaptive_gain: false,
            ..Default::default()
        };
        let mut controller = Controller::new(motion, ZoomConfig::default());
        controller.compute(geometry::FRAME_CENTRE, 0.25);
        let cmd = controller.compute(Vector2::new(0.9, 0.5), 0.25);
        // Heavy smoothing (alpha=0.9) keeps the first reaction small.
        assert!(cmd.pan.abs() < 0.1);
    }

    #[test]
    fn zoom_increases_when_object_smaller_than_target_ratio() {
        // The target level steps toward the far end every tick the
        // object stays undersized, but the commanded level only slews a
        // fraction of the remaining error per tick, so it takes a few
        // ticks before the cumulative move clears the dispatch
        // hysteresis.
        let mut controller = Controller::new(MotionConfig::default(), ZoomConfig::default());
        let before = controller.zoom_level();
        let mut dispatched = None;
        for _ in 0..10 {
            if let Some(level) = controller.compute(geometry::FRAME_CENTRE, 0.01).zoom {
                dispatched = Some(level);
                break;
            }
        }
        let dispatched = dispatched.expect("zoom should eventually clear the hysteresis gate");
        assert!(dispatched > before);
    }

    #[test]
    fn zoom_target_steps_every_tick_even_when_no_command_dispatches_yet() {
        let mut controller = Controller::new(MotionConfig::default(), ZoomConfig::default());
        controller.compute(geometry::FRAME_CENTRE, 0.01);
        let level_after_one_tick = controller.zoom_level();
        controller.compute(geometry::FRAME_CENTRE, 0.01);
        let level_after_two_ticks = controller.zoom_level();
        assert!(level_after_two_ticks >= level_after_one_tick);
    }

    #[test]
    fn zoom_within_deadband_issues_no_command() {
        let zoom = ZoomConfig {
            target_ratio: 0.25,
            deadband_fraction: 0.5,
            ..Default::default()
        };
        let mut controller = Controller::new(MotionConfig::default(), zoom);
        let cmd = controller.compute(geometry::FRAME_CENTRE, 0.25);
        assert!(cmd.zoom.is_none());
    }

    #[test]
    fn stop_resets_smoothing_and_returns_zero_command() {
        let mut controller = Controller::new(MotionConfig::default(), ZoomConfig::default());
        controller.compute(Vector2::new(0.9, 0.9), 0.01);
        let cmd = controller.stop();
        assert!(cmd.is_zero_motion());
        let next = controller.compute(geometry::FRAME_CENTRE, 0.25);
        assert_eq!(next.pan, 0.0);
        assert_eq!(next.tilt, 0.0);
    }
}
