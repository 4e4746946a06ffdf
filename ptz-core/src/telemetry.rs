//! Lifecycle state and telemetry (C9).
//!
//! The session-level state machine, the closed event vocabulary emitted
//! to subscribers, and the running counters surfaced through
//! `get_status()`.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::track::{TrackId, TrackSnapshot};
use ptz_env::PresetToken;

/// Session-level lifecycle state, a closed sum type rather than a
/// stringly-typed status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No `start` call yet, or `stop` was called.
    Idle,
    /// The tick loop is running. Whether it currently has a target is a
    /// selector-level concern (`SelectorMode`), not a session state.
    Active,
    /// A permanent dispatch failure, or an explicit `emergency_stop`,
    /// occurred; requires an explicit restart.
    Error,
}

/// A discrete, externally observable occurrence during a session.
///
/// Covers the six callbacks `spec.md` §4.9 lists (`object_detected`,
/// `object_lost`, `target_switched`, `zoom_changed`, `state_changed`,
/// `tracking_tick`) plus `PresetReached`, added because the preset-transit
/// extension in §3.1 makes that hand-off externally observable too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TrackingStarted,
    TrackingStopped,
    /// `object_detected(id, snapshot)` — a new track was created.
    ObjectDetected { track_id: TrackId, snapshot: TrackSnapshot },
    TargetSwitched { from: Option<TrackId>, to: TrackId },
    /// `object_lost(id)` — a track aged out past `object_timeout`.
    ObjectLost { track_id: TrackId },
    /// `zoom_changed(level, area_ratio)` — the controller dispatched a new
    /// zoom level.
    ZoomChanged { level: f64, area_ratio: f64 },
    StateChanged { state: SessionState },
    /// `tracking_tick(id, snapshot)` — emitted once per dispatcher tick for
    /// whichever track is currently targeted.
    TrackingTick { track_id: TrackId, snapshot: TrackSnapshot },
    /// `preset_reached(token)` — a preset transit completed, whether it
    /// was driven by the selector's own large-jump heuristic or by an
    /// external `Engine::goto_preset` call.
    PresetReached { token: PresetToken },
    Error { message: String },
}

/// Running counters surfaced through `get_status()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub frames_processed: u64,
    pub detections_dropped: u64,
    /// Detections discarded specifically because `max_objects` was already
    /// reached this frame, a subset of `detections_dropped`.
    pub detections_dropped_capacity: u64,
    pub tracks_created: u64,
    pub tracks_lost: u64,
    pub target_switches: u64,
    pub dispatch_errors: u64,
    pub emergency_stops: u64,
    pub zoom_changes: u64,
}

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

/// Owns session state, counters, and the set of event subscribers.
pub struct Telemetry {
    state: SessionState,
    stats: Stats,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            stats: Stats::default(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Registers a callback invoked synchronously for every emitted
    /// event.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .expect("telemetry subscriber lock poisoned")
            .push(Box::new(callback));
    }

    fn notify(&self, event: Event) {
        let subscribers = self.subscribers.lock().expect("telemetry subscriber lock poisoned");
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }

    pub fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "session state transition");
            self.state = state;
            self.notify(Event::StateChanged { state });
        }
    }

    pub fn record_frame(&mut self) {
        self.stats.frames_processed += 1;
    }

    pub fn record_dropped_detection(&mut self) {
        self.stats.detections_dropped += 1;
    }

    /// Same counter family as [`Telemetry::record_dropped_detection`], plus
    /// the capacity-specific tally.
    pub fn record_dropped_detection_capacity(&mut self) {
        self.stats.detections_dropped += 1;
        self.stats.detections_dropped_capacity += 1;
    }

    pub fn record_track_created(&mut self) {
        self.stats.tracks_created += 1;
    }

    pub fn record_track_lost(&mut self, track_id: TrackId) {
        self.stats.tracks_lost += 1;
        self.notify(Event::ObjectLost { track_id });
    }

    pub fn record_dispatch_error(&mut self) {
        self.stats.dispatch_errors += 1;
    }

    /// Transitions to `Error` and counts the emergency stop. Unlike a
    /// `PermanentDispatch` failure, this is caller-initiated, but per
    /// `spec.md` §8 scenario S6 it leaves the session in the same closed
    /// state: an explicit `start`/restart is required to resume.
    pub fn emergency_stopped(&mut self) {
        self.stats.emergency_stops += 1;
        self.set_state(SessionState::Error);
        self.notify(Event::Error {
            message: "emergency stop requested".into(),
        });
    }

    pub fn tracking_started(&mut self) {
        self.set_state(SessionState::Active);
        self.notify(Event::TrackingStarted);
    }

    pub fn tracking_stopped(&mut self) {
        self.set_state(SessionState::Idle);
        self.notify(Event::TrackingStopped);
    }

    pub fn object_detected(&mut self, track_id: TrackId, snapshot: TrackSnapshot) {
        self.notify(Event::ObjectDetected { track_id, snapshot });
    }

    pub fn target_switched(&mut self, from: Option<TrackId>, to: TrackId) {
        self.stats.target_switches += 1;
        self.notify(Event::TargetSwitched { from, to });
    }

    /// `zoom_changed(level, area_ratio)` — called whenever the controller
    /// actually dispatches a new zoom level (not on every tick: the
    /// deadband/hysteresis law in C7 holds most ticks steady).
    pub fn zoom_changed(&mut self, level: f64, area_ratio: f64) {
        self.stats.zoom_changes += 1;
        self.notify(Event::ZoomChanged { level, area_ratio });
    }

    /// `tracking_tick(id, snapshot)` — called once per dispatcher tick for
    /// the currently targeted track.
    pub fn tracking_tick(&mut self, track_id: TrackId, snapshot: TrackSnapshot) {
        self.notify(Event::TrackingTick { track_id, snapshot });
    }

    pub fn preset_reached(&mut self, token: PresetToken) {
        self.notify(Event::PresetReached { token });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "engine error");
        self.set_state(SessionState::Error);
        self.notify(Event::Error { message });
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_snapshot() -> TrackSnapshot {
        TrackSnapshot {
            id: 1,
            cx: 0.5,
            cy: 0.5,
            w: 0.1,
            h: 0.1,
            confidence: 0.9,
            class_tag: "person".into(),
            speed: 0.0,
            moving: false,
            priority_score: 0.0,
            is_primary: false,
            frames_tracked: 1,
        }
    }

    #[test]
    fn state_starts_idle() {
        assert_eq!(Telemetry::new().state(), SessionState::Idle);
    }

    #[test]
    fn tracking_started_transitions_to_active() {
        let mut telemetry = Telemetry::new();
        telemetry.tracking_started();
        assert_eq!(telemetry.state(), SessionState::Active);
    }

    #[test]
    fn subscribers_receive_emitted_events() {
        let telemetry = Telemetry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        telemetry.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        let mut telemetry = telemetry;
        telemetry.tracking_started(); // StateChanged + TrackingStarted
        telemetry.object_detected(1, sample_snapshot());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn error_transitions_to_error_state() {
        let mut telemetry = Telemetry::new();
        telemetry.error("permanent dispatch failure");
        assert_eq!(telemetry.state(), SessionState::Error);
    }

    #[test]
    fn counters_accumulate() {
        let mut telemetry = Telemetry::new();
        telemetry.record_frame();
        telemetry.record_frame();
        telemetry.record_dropped_detection();
        let stats = telemetry.stats();
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.detections_dropped, 1);
    }

    #[test]
    fn emergency_stop_transitions_to_error_and_counts() {
        let mut telemetry = Telemetry::new();
        telemetry.tracking_started();
        telemetry.emergency_stopped();
        assert_eq!(telemetry.state(), SessionState::Error);
        assert_eq!(telemetry.stats().emergency_stops, 1);
    }

    #[test]
    fn zoom_changed_notifies_and_counts() {
        let telemetry = Telemetry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        telemetry.subscribe(move |event| events_clone.lock().unwrap().push(event.clone()));
        let mut telemetry = telemetry;
        telemetry.zoom_changed(0.4, 0.3);
        assert_eq!(telemetry.stats().zoom_changes, 1);
        assert!(matches!(events.lock().unwrap().last(), Some(Event::ZoomChanged { .. })));
    }

    #[test]
    fn tracking_tick_carries_the_current_snapshot() {
        let telemetry = Telemetry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        telemetry.subscribe(move |event| events_clone.lock().unwrap().push(event.clone()));
        let mut telemetry = telemetry;
        telemetry.tracking_tick(7, sample_snapshot());
        match events.lock().unwrap().last() {
            Some(Event::TrackingTick { track_id, .. }) => assert_eq!(*track_id, 7),
            other => panic!("expected TrackingTick, got {other:?}"),
        }
    }
}
