//! Priority scorer (C4).
//!
//! Combines a track's confidence, motion, size, and frame-centre
//! proximity into a single weighted score used by the selector (C5) to
//! rank candidate targets.

use crate::config::PriorityWeights;
use crate::geometry;
use crate::track::Track;

/// Reference speed (normalised units/second) treated as "fully moving"
/// for the purposes of `score_move` — a track at or above this speed
/// saturates its movement sub-score to `1.0`.
const MAX_SPEED_REFERENCE: f64 = 0.1;

/// Reference area ratio treated as "fully sized" for `score_size`.
const MAX_SIZE_REFERENCE: f64 = 0.25;

/// Seconds of continuous tracking needed to earn the full tenure bonus.
const TENURE_NORMALISER: f64 = 10.0;

/// Ceiling on the tenure bonus, so a long-lived track can't dominate the
/// combined score on tenure alone.
const MAX_TENURE_BONUS: f64 = 0.2;

/// Small bonus rewarding tracks that have been held continuously, so a
/// long-tracked object isn't immediately bumped by a marginally higher-
/// scoring newcomer.
fn tenure_bonus(track: &Track, now: f64) -> f64 {
    (track.time_tracked(now) / TENURE_NORMALISER).min(MAX_TENURE_BONUS)
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Sub-score from average detection confidence, already in `[0, 1]`.
pub fn score_confidence(track: &Track) -> f64 {
    clamp01(track.average_confidence())
}

/// Sub-score from estimated speed, saturating at [`MAX_SPEED_REFERENCE`].
/// Zero outright for a track below [`crate::track::EPS_MOVE`] — a track
/// that isn't `is_moving()` earns no movement credit no matter how the
/// saturating formula would otherwise round its jitter.
pub fn score_movement(track: &Track) -> f64 {
    if !track.is_moving() {
        return 0.0;
    }
    clamp01(track.speed() / MAX_SPEED_REFERENCE)
}

/// Sub-score from mean object size, saturating at [`MAX_SIZE_REFERENCE`].
pub fn score_size(track: &Track) -> f64 {
    clamp01(track.area_ratio() / MAX_SIZE_REFERENCE)
}

/// Sub-score from proximity to the frame centre: `1.0` at dead centre,
/// falling off linearly with raw centre distance (clamped at `0.0` past
/// a corner, where `centre_distance` already exceeds `1.0`).
pub fn score_proximity(track: &Track) -> f64 {
    let dist = geometry::centre_distance(track.last_position());
    clamp01(1.0 - dist)
}

/// The four sub-scores behind one track's combined priority score,
/// exposed for diagnostics/telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub confidence: f64,
    pub movement: f64,
    pub size: f64,
    pub proximity: f64,
    pub tenure_bonus: f64,
    pub combined: f64,
}

/// Computes the weighted priority score for `track` under `weights` as of
/// `now`.
///
/// `combined = w_conf * score_conf + w_move * score_move + w_size *
/// score_size + w_prox * score_prox + tenure_bonus`. Weights need not sum
/// to one; the weighted sum is not re-normalised, only the tenure bonus
/// is separately capped.
pub fn score(track: &Track, weights: &PriorityWeights, now: f64) -> ScoreBreakdown {
    let confidence = score_confidence(track);
    let movement = score_movement(track);
    let size = score_size(track);
    let proximity = score_proximity(track);
    let tenure_bonus = tenure_bonus(track, now);
    let combined = weights.w_conf * confidence
        + weights.w_move * movement
        + weights.w_size * size
        + weights.w_prox * proximity
        + tenure_bonus;
    ScoreBreakdown {
        confidence,
        movement,
        size,
        proximity,
        tenure_bonus,
        combined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Detection;
    use crate::track::TrackStore;

    fn det(cx: f64, cy: f64, confidence: f64, t: f64) -> Detection {
        Detection {
            cx,
            cy,
            w: 0.1,
            h: 0.1,
            confidence,
            class_tag: "person".into(),
            frame_w: 1920,
            frame_h: 1080,
            t,
        }
    }

    #[test]
    fn score_is_monotonic_in_confidence() {
        let mut low = TrackStore::new();
        let low_id = low.insert(det(0.5, 0.5, 0.2, 0.0), 0.0);

        let mut high = TrackStore::new();
        let high_id = high.insert(det(0.5, 0.5, 0.9, 0.0), 0.0);

        let weights = PriorityWeights::default();
        let low_score = score(low.get(low_id).unwrap(), &weights, 0.0).combined;
        let high_score = score(high.get(high_id).unwrap(), &weights, 0.0).combined;
        assert!(high_score > low_score);
    }

    #[test]
    fn centred_track_scores_higher_proximity_than_edge_track() {
        let mut store = TrackStore::new();
        let centre = store.insert(det(0.5, 0.5, 0.9, 0.0), 0.0);
        let edge = store.insert(det(0.02, 0.02, 0.9, 0.0), 0.0);
        assert!(score_proximity(store.get(centre).unwrap()) > score_proximity(store.get(edge).unwrap()));
    }

    #[test]
    fn score_breakdown_components_are_bounded() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.0, 0.0, 1.5, 0.0), 0.0);
        let breakdown = score(store.get(id).unwrap(), &PriorityWeights::default(), 0.0);
        assert!((0.0..=1.0).contains(&breakdown.confidence));
        assert!((0.0..=1.0).contains(&breakdown.movement));
        assert!((0.0..=1.0).contains(&breakdown.size));
        assert!((0.0..=1.0).contains(&breakdown.proximity));
    }

    #[test]
    fn zero_weights_yield_zero_combined_score() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.5, 0.5, 0.9, 0.0), 0.0);
        let weights = PriorityWeights {
            w_conf: 0.0,
            w_move: 0.0,
            w_size: 0.0,
            w_prox: 0.0,
        };
        assert_eq!(score(store.get(id).unwrap(), &weights, 0.0).combined, 0.0);
    }
}
