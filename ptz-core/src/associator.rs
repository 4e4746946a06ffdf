//! Data associator (C3).
//!
//! Greedy nearest-neighbour matching between existing tracks and the
//! current frame's detections, gated by an adaptive distance threshold.

use crate::geometry::{self, Detection};
use crate::track::{Track, TrackId, TrackStore};
use std::collections::HashSet;

/// Base gating distance, in normalised units. Gating is done on
/// normalised centre distance rather than an absolute pixel threshold, so
/// the same configuration behaves consistently across frame resolutions.
pub const BASE_GATE: f64 = 0.05;

/// Weight applied to the absolute area-ratio difference in the match
/// cost, alongside centre distance.
const SIZE_COST_WEIGHT: f64 = 0.5;

/// How much a track's estimated speed widens its gate, in normalised
/// units per (unit of speed). A fast-moving track is allowed to match a
/// detection further from its last known position.
const MOTION_GATE_GAIN: f64 = 2.0;

/// Hard ceiling on the adaptive gate, regardless of speed.
const MAX_GATE: f64 = BASE_GATE * 4.0;

/// Outcome of associating one frame of detections against the track
/// store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    /// `(track id, detection index)` pairs accepted as the same object.
    pub matches: Vec<(TrackId, usize)>,
    /// Detection indices with no corresponding track — candidates for a
    /// new track.
    pub unmatched_detections: Vec<usize>,
    /// Tracks that received no detection this frame.
    pub unmatched_tracks: Vec<TrackId>,
}

fn gate_for(track: &Track) -> f64 {
    if track.is_moving() {
        (BASE_GATE + track.speed() * MOTION_GATE_GAIN).min(MAX_GATE)
    } else {
        BASE_GATE
    }
}

fn cost(track: &Track, detection: &Detection) -> f64 {
    let dist = geometry::euclidean(track.last_position(), detection.position());
    let size_diff = (track.area_ratio() - detection.area()).abs();
    dist + SIZE_COST_WEIGHT * size_diff
}

/// Matches `detections` against the tracks currently in `store`.
///
/// Tracks are visited in ascending id order (stable iteration), and for
/// each track the closest *still unclaimed* detection within its gate is
/// assigned and removed from the candidate pool before the next track is
/// considered. This is a sequential per-track greedy, not a single global
/// sort over all candidate pairs — the two differ whenever two tracks
/// compete for the same detection at different cost ranks, and track
/// iteration order is what resolves the tie.
pub fn associate(store: &TrackStore, detections: &[Detection]) -> Association {
    let mut claimed_detections: HashSet<usize> = HashSet::new();
    let mut matches = Vec::new();

    for track in store.iter_ordered() {
        let gate = gate_for(track);
        let mut best: Option<(f64, usize)> = None;
        for (idx, detection) in detections.iter().enumerate() {
            if claimed_detections.contains(&idx) {
                continue;
            }
            let c = cost(track, detection);
            if c > gate {
                continue;
            }
            best = match best {
                // Strictly-less wins; on a tie the earlier (lower-index)
                // detection already in `best` keeps precedence, per the
                // "lower detection index wins at equal distance" rule.
                Some((best_c, _)) if c >= best_c => best,
                _ => Some((c, idx)),
            };
        }
        if let Some((_, det_idx)) = best {
            claimed_detections.insert(det_idx);
            matches.push((track.id(), det_idx));
        }
    }

    let unmatched_detections: Vec<usize> = (0..detections.len())
        .filter(|idx| !claimed_detections.contains(idx))
        .collect();
    let claimed_tracks: HashSet<TrackId> = matches.iter().map(|(id, _)| *id).collect();
    let unmatched_tracks: Vec<TrackId> = store
        .ids()
        .filter(|id| !claimed_tracks.contains(id))
        .collect();

    Association {
        matches,
        unmatched_detections,
        unmatched_tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(cx: f64, cy: f64, t: f64) -> Detection {
        Detection {
            cx,
            cy,
            w: 0.1,
            h: 0.1,
            confidence: 0.9,
            class_tag: "person".into(),
            frame_w: 1920,
            frame_h: 1080,
            t,
        }
    }

    #[test]
    fn matches_close_detection_to_existing_track() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.5, 0.5, 0.0), 0.0);
        let next = vec![det(0.51, 0.5, 1.0)];
        let assoc = associate(&store, &next);
        assert_eq!(assoc.matches, vec![(id, 0)]);
        assert!(assoc.unmatched_detections.is_empty());
    }

    #[test]
    fn rejects_detection_outside_static_gate() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.1, 0.1, 0.0), 0.0);
        let next = vec![det(0.9, 0.9, 1.0)];
        let assoc = associate(&store, &next);
        assert!(assoc.matches.is_empty());
        assert_eq!(assoc.unmatched_detections, vec![0]);
        assert_eq!(assoc.unmatched_tracks, vec![id]);
    }

    #[test]
    fn adaptive_gate_widens_for_fast_moving_track() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.1, 0.5, 0.0), 0.0);
        // Large step in a short time makes this track "moving" with a
        // high estimated speed, widening its gate beyond BASE_GATE.
        store.update(id, det(0.25, 0.5, 0.1)).unwrap();
        let next = vec![det(0.38, 0.5, 0.2)];
        let assoc = associate(&store, &next);
        assert_eq!(assoc.matches, vec![(id, 0)]);
    }

    #[test]
    fn unmatched_detection_has_no_nearby_track() {
        let store = TrackStore::new();
        let next = vec![det(0.3, 0.3, 0.0), det(0.8, 0.8, 0.0)];
        let assoc = associate(&store, &next);
        assert!(assoc.matches.is_empty());
        assert_eq!(assoc.unmatched_detections, vec![0, 1]);
    }

    #[test]
    fn greedy_assignment_prefers_lower_cost_pair() {
        let mut store = TrackStore::new();
        let a = store.insert(det(0.2, 0.2, 0.0), 0.0);
        let b = store.insert(det(0.2, 0.2, 0.0), 0.0);
        // Only one detection close to both tracks; greedy picks whichever
        // pairing has lower cost, never double-assigns the detection.
        let next = vec![det(0.201, 0.2, 1.0)];
        let assoc = associate(&store, &next);
        assert_eq!(assoc.matches.len(), 1);
        let (matched_id, _) = assoc.matches[0];
        assert!(matched_id == a || matched_id == b);
        assert_eq!(assoc.unmatched_tracks.len(), 1);
    }
}
