//! Track store (C2).
//!
//! Holds the set of live tracks, each a bounded history of recent
//! detections plus derived motion/size/temporal statistics: a
//! `HashMap<id, _>` store, per-track aging, and removal on timeout.

use crate::error::EngineError;
use crate::geometry::{self, Detection};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Integer track identity, unique and monotonically assigned per session.
pub type TrackId = u64;

/// Maximum number of recent detections retained per track.
pub const MAX_HISTORY: usize = 20;

/// Window size (most recent samples) used to estimate velocity.
const VELOCITY_WINDOW: usize = 5;

/// Movement threshold, in normalised units per second, below which a
/// track is considered stationary. Expressed in normalised units rather
/// than an absolute pixel threshold, so it behaves consistently across
/// source-frame resolutions.
pub const EPS_MOVE: f64 = 0.01;

/// Window size (most recent samples) used to estimate size stability.
const SIZE_WINDOW: usize = 10;

/// A persistent hypothesis about one physical object, built from
/// successive detections.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    history: VecDeque<Detection>,
    vx: f64,
    vy: f64,
    speed: f64,
    moving: bool,
    mean_area: f64,
    size_stability: f64,
    first_seen: f64,
    last_seen: f64,
    frames_tracked: u32,
    total_tracking_time: f64,
    is_primary: bool,
    last_targeted_time: f64,
    priority_score: f64,
}

impl Track {
    fn new(id: TrackId, detection: Detection, now: f64) -> Self {
        let mut track = Self {
            id,
            history: VecDeque::with_capacity(MAX_HISTORY),
            vx: 0.0,
            vy: 0.0,
            speed: 0.0,
            moving: false,
            mean_area: 0.0,
            size_stability: 0.0,
            first_seen: now,
            last_seen: now,
            frames_tracked: 0,
            total_tracking_time: 0.0,
            is_primary: false,
            last_targeted_time: 0.0,
            priority_score: 0.0,
        };
        track.push(detection);
        track
    }

    fn push(&mut self, detection: Detection) {
        self.last_seen = detection.t;
        self.frames_tracked += 1;
        self.history.push_back(detection);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        self.recompute_motion();
        self.recompute_size();
    }

    fn recompute_motion(&mut self) {
        if self.history.len() < 2 {
            self.vx = 0.0;
            self.vy = 0.0;
            self.speed = 0.0;
            self.moving = false;
            return;
        }
        let start = self.history.len().saturating_sub(VELOCITY_WINDOW);
        let window: Vec<&Detection> = self.history.iter().skip(start).collect();

        let mut vxs = Vec::with_capacity(window.len());
        let mut vys = Vec::with_capacity(window.len());
        for pair in window.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            let dt = curr.t - prev.t;
            if dt > 0.0 {
                vxs.push((curr.cx - prev.cx) / dt);
                vys.push((curr.cy - prev.cy) / dt);
            }
        }

        if vxs.is_empty() {
            self.vx = 0.0;
            self.vy = 0.0;
            self.speed = 0.0;
        } else {
            self.vx = vxs.iter().sum::<f64>() / vxs.len() as f64;
            self.vy = vys.iter().sum::<f64>() / vys.len() as f64;
            self.speed = (self.vx * self.vx + self.vy * self.vy).sqrt();
        }
        self.moving = self.speed > EPS_MOVE;
    }

    fn recompute_size(&mut self) {
        let start = self.history.len().saturating_sub(SIZE_WINDOW);
        let areas: Vec<f64> = self.history.iter().skip(start).map(Detection::area).collect();
        if areas.is_empty() {
            return;
        }
        let mean = areas.iter().sum::<f64>() / areas.len() as f64;
        self.mean_area = mean;
        if mean > 0.0 {
            let variance = areas.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / areas.len() as f64;
            self.size_stability = 1.0 / (1.0 + variance / mean);
        } else {
            self.size_stability = 0.0;
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn last_detection(&self) -> &Detection {
        self.history.back().expect("a track always has at least one sample")
    }

    pub fn last_position(&self) -> Vector2<f64> {
        self.last_detection().position()
    }

    pub fn history(&self) -> impl Iterator<Item = &Detection> {
        self.history.iter()
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.vx, self.vy)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn mean_area(&self) -> f64 {
        self.mean_area
    }

    /// Ratio of the object's average area to the unit frame — since
    /// coordinates are already normalised to `[0,1]^2`, this is just
    /// `mean_area`.
    pub fn area_ratio(&self) -> f64 {
        self.mean_area
    }

    pub fn size_stability(&self) -> f64 {
        self.size_stability
    }

    pub fn average_confidence(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(|d| d.confidence).sum::<f64>() / self.history.len() as f64
    }

    pub fn first_seen(&self) -> f64 {
        self.first_seen
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn frames_tracked(&self) -> u32 {
        self.frames_tracked
    }

    pub fn total_tracking_time(&self) -> f64 {
        self.total_tracking_time
    }

    pub fn time_tracked(&self, now: f64) -> f64 {
        (now - self.first_seen).max(0.0)
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn last_targeted_time(&self) -> f64 {
        self.last_targeted_time
    }

    pub fn priority_score(&self) -> f64 {
        self.priority_score
    }

    pub fn set_priority_score(&mut self, score: f64) {
        self.priority_score = score;
    }

    pub fn is_lost(&self, now: f64, timeout: f64) -> bool {
        (now - self.last_seen) > timeout
    }

    /// Lightweight, serialisable view handed to observer callbacks and
    /// `get_status()` — never a live reference.
    pub fn snapshot(&self) -> TrackSnapshot {
        let last = self.last_detection();
        TrackSnapshot {
            id: self.id,
            cx: last.cx,
            cy: last.cy,
            w: last.w,
            h: last.h,
            confidence: last.confidence,
            class_tag: last.class_tag.clone(),
            speed: self.speed,
            moving: self.moving,
            priority_score: self.priority_score,
            is_primary: self.is_primary,
            frames_tracked: self.frames_tracked,
        }
    }
}

/// A serialisable snapshot of one track's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f64,
    pub class_tag: String,
    pub speed: f64,
    pub moving: bool,
    pub priority_score: f64,
    pub is_primary: bool,
    pub frames_tracked: u32,
}

/// The set of live tracks for one engine session.
///
/// All mutation goes through `insert`/`update` (C3) or `set_primary`
/// (C4/C5); external callers only ever see `TrackId` + `TrackSnapshot`.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<TrackId, Track>,
    next_id: TrackId,
    primary: Option<TrackId>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            next_id: 1,
            primary: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Creates a new track from an unassigned detection, assigning it the
    /// next strictly-increasing id.
    pub fn insert(&mut self, detection: Detection, now: f64) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        info!(track_id = id, "new track");
        self.tracks.insert(id, Track::new(id, detection, now));
        id
    }

    /// Appends a new sample to an existing track.
    pub fn update(&mut self, id: TrackId, detection: Detection) -> Result<(), EngineError> {
        let track = self
            .tracks
            .get_mut(&id)
            .ok_or_else(|| EngineError::invariant_violation(format!("unknown track {id}")))?;
        if detection.t < track.last_seen {
            return Err(EngineError::invariant_violation(format!(
                "non-monotonic timestamp for track {id}"
            )));
        }
        track.push(detection);
        Ok(())
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Iterates tracks in ascending id order — the stable order the
    /// associator relies on for iteration and tie-breaking.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Track> {
        let mut ids: Vec<&TrackId> = self.tracks.keys().collect();
        ids.sort_unstable();
        ids.into_iter().map(move |id| &self.tracks[id])
    }

    pub fn ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.keys().copied()
    }

    /// Mutable access to every track, order-independent — used by the
    /// scorer (C4) to refresh each track's cached `priority_score`.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    /// Removes every track whose `last_seen` is older than `timeout`.
    /// Returns the ids removed, in ascending order. Clears the primary
    /// pointer if the primary was among them.
    pub fn prune(&mut self, now: f64, timeout: f64) -> Vec<TrackId> {
        let mut lost: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.is_lost(now, timeout))
            .map(|(id, _)| *id)
            .collect();
        lost.sort_unstable();
        for id in &lost {
            self.tracks.remove(id);
            if self.primary == Some(*id) {
                self.primary = None;
                debug!(track_id = id, "primary lost during prune");
            }
        }
        lost
    }

    pub fn current_primary(&self) -> Option<&Track> {
        self.primary.and_then(|id| self.tracks.get(&id))
    }

    pub fn current_primary_id(&self) -> Option<TrackId> {
        self.primary
    }

    /// Sets (or clears) the primary track, maintaining the invariant that
    /// at most one track has `is_primary = true`.
    pub fn set_primary(&mut self, id: Option<TrackId>) {
        if let Some(old) = self.primary {
            if let Some(track) = self.tracks.get_mut(&old) {
                track.is_primary = false;
            }
        }
        self.primary = id;
        if let Some(new_id) = id {
            if let Some(track) = self.tracks.get_mut(&new_id) {
                track.is_primary = true;
                track.last_targeted_time = track.last_seen;
            }
        }
    }

    /// Accrues `dt` seconds of "held as primary" time onto the current
    /// primary track, if any.
    pub fn accrue_primary_time(&mut self, dt: f64) {
        if let Some(id) = self.primary {
            if let Some(track) = self.tracks.get_mut(&id) {
                track.total_tracking_time += dt;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.iter_ordered().map(Track::snapshot).collect()
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
    fn insert_assigns_increasing_ids() {
        let mut store = TrackStore::new();
        let a = store.insert(det(0.1, 0.1, 0.0), 0.0);
        let b = store.insert(det(0.2, 0.2, 0.0), 0.0);
        assert!(b > a);
    }

    #[test]
    fn history_is_bounded() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.0, 0.0, 0.0), 0.0);
        for i in 1..30 {
            store.update(id, det(0.0, 0.0, i as f64)).unwrap();
        }
        assert_eq!(store.get(id).unwrap().history().count(), MAX_HISTORY);
    }

    #[test]
    fn velocity_is_estimated_from_recent_samples() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.0, 0.5, 0.0), 0.0);
        store.update(id, det(0.1, 0.5, 1.0)).unwrap();
        let track = store.get(id).unwrap();
        assert!((track.velocity().x - 0.1).abs() < 1e-9);
        assert!(track.is_moving());
    }

    #[test]
    fn prune_removes_stale_tracks_and_clears_primary() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.0, 0.0, 0.0), 0.0);
        store.set_primary(Some(id));
        let lost = store.prune(10.0, 3.0);
        assert_eq!(lost, vec![id]);
        assert!(store.current_primary().is_none());
        assert!(!store.contains(id));
    }

    #[test]
    fn only_one_track_is_primary_at_a_time() {
        let mut store = TrackStore::new();
        let a = store.insert(det(0.0, 0.0, 0.0), 0.0);
        let b = store.insert(det(0.5, 0.5, 0.0), 0.0);
        store.set_primary(Some(a));
        store.set_primary(Some(b));
        assert!(!store.get(a).unwrap().is_primary());
        assert!(store.get(b).unwrap().is_primary());
    }

    #[test]
    fn update_rejects_non_monotonic_timestamp() {
        let mut store = TrackStore::new();
        let id = store.insert(det(0.0, 0.0, 5.0), 5.0);
        let err = store.update(id, det(0.0, 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }
}
