//! Geometry primitives (C1).
//!
//! Pure functions over normalised `[0,1]^2` coordinates: centre-distance,
//! area, pixel back-conversion, and a linear motion extrapolator. Nothing
//! in this module touches the track store or the clock.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Frame centre in normalised coordinates.
pub const FRAME_CENTRE: Vector2<f64> = Vector2::new(0.5, 0.5);

/// A single detector observation for one frame.
///
/// `cx, cy` are the box centre and `w, h` the box width/height, all in the
/// normalised unit square. `frame_w`/`frame_h` are the source frame's pixel
/// dimensions, carried only for back-conversion. `t` must be monotonic
/// non-decreasing within one detection stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f64,
    pub class_tag: String,
    pub frame_w: u32,
    pub frame_h: u32,
    pub t: f64,
}

impl Detection {
    /// Centre position as a vector, for distance/velocity math.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.cx, self.cy)
    }

    /// Box area in normalised units, `w * h`.
    pub fn area(&self) -> f64 {
        area(self.w, self.h)
    }

    /// Whether every field is within the invariants required of a valid
    /// detection: `0 <= cx,cy <= 1`, `0 < w,h <= 1`, all finite.
    pub fn is_valid(&self) -> bool {
        self.cx.is_finite()
            && self.cy.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.cx)
            && (0.0..=1.0).contains(&self.cy)
            && self.w > 0.0
            && self.w <= 1.0
            && self.h > 0.0
            && self.h <= 1.0
    }

    /// Converts the normalised box back to pixel coordinates using this
    /// detection's own `frame_w`/`frame_h`.
    pub fn to_pixels(&self) -> PixelBox {
        to_pixels(self.cx, self.cy, self.w, self.h, self.frame_w, self.frame_h)
    }
}

/// A bounding box expressed in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Converts normalised centre/size coordinates to pixel coordinates
/// (top-left corner + size) for the given frame dimensions.
pub fn to_pixels(cx: f64, cy: f64, w: f64, h: f64, frame_w: u32, frame_h: u32) -> PixelBox {
    let (fw, fh) = (frame_w as f64, frame_h as f64);
    let width = w * fw;
    let height = h * fh;
    PixelBox {
        x: cx * fw - width / 2.0,
        y: cy * fh - height / 2.0,
        width,
        height,
    }
}

/// Box area in normalised units.
pub fn area(w: f64, h: f64) -> f64 {
    w * h
}

/// Euclidean distance between two normalised positions.
pub fn euclidean(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    (a - b).norm()
}

/// Distance from a position to the frame centre `(0.5, 0.5)`.
pub fn centre_distance(pos: Vector2<f64>) -> f64 {
    euclidean(pos, FRAME_CENTRE)
}

/// A short-horizon linear extrapolation of a target's position.
///
/// `predict(pos, v, Δt)` with `v = (0, 0)` returns `pos` unchanged: a
/// stationary target's prediction is always its last observed position.
pub fn predict(pos: Vector2<f64>, velocity: Vector2<f64>, dt: f64) -> Vector2<f64> {
    pos + velocity * dt
}

/// Confidence discount applied to a predicted (as opposed to observed)
/// position.
pub const PREDICTION_CONFIDENCE_FACTOR: f64 = 0.8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_with_zero_velocity_is_identity() {
        let pos = Vector2::new(0.3, 0.7);
        let v = Vector2::new(0.0, 0.0);
        assert_eq!(predict(pos, v, 0.5), pos);
    }

    #[test]
    fn predict_extrapolates_linearly() {
        let pos = Vector2::new(0.2, 0.2);
        let v = Vector2::new(0.1, -0.05);
        let next = predict(pos, v, 2.0);
        assert!((next.x - 0.4).abs() < 1e-9);
        assert!((next.y - 0.1).abs() < 1e-9);
    }

    #[test]
    fn centre_distance_of_centre_is_zero() {
        assert_eq!(centre_distance(FRAME_CENTRE), 0.0);
    }

    #[test]
    fn pixel_back_conversion_round_trips_centre() {
        let px = to_pixels(0.5, 0.5, 0.2, 0.1, 1920, 1080);
        assert!((px.x + px.width / 2.0 - 960.0).abs() < 1e-6);
        assert!((px.y + px.height / 2.0 - 540.0).abs() < 1e-6);
    }

    #[test]
    fn detection_validity() {
        let mut d = Detection {
            cx: 0.5,
            cy: 0.5,
            w: 0.1,
            h: 0.1,
            confidence: 0.9,
            class_tag: "person".into(),
            frame_w: 1920,
            frame_h: 1080,
            t: 0.0,
        };
        assert!(d.is_valid());
        d.cx = 1.5;
        assert!(!d.is_valid());
    }
}
