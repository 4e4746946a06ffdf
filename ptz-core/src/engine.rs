//! Top-level tracking engine (C9/integration).
//!
//! Ties the track store (C2), associator (C3), scorer (C4), selector
//! (C5), predictor (C6), controller (C7), and dispatcher (C8) into one
//! external interface: `submit_detections`, `start`/`stop`/
//! `emergency_stop`, `get_status`, and event subscription. A
//! clock-generic, driver-generic run loop behind an `Arc<Mutex<_>>` of
//! shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ptz_env::{CameraDriver, EngineClock, PresetToken};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::associator;
use crate::config::Config;
use crate::controller::Controller;
use crate::dispatcher::{DispatchCommand, Dispatcher};
use crate::error::EngineError;
use crate::geometry::Detection;
use crate::predictor;
use crate::scorer;
use crate::selector::{SelectorMode, TargetSelector};
use crate::telemetry::{SessionState, Stats, Telemetry};
use crate::track::{TrackId, TrackSnapshot, TrackStore};

/// Dispatcher tick rate, roughly 30Hz.
const TICK_HZ: f64 = 30.0;

/// How long an externally-requested preset transit (the cell→preset side
/// channel) is assumed to take before queued tracking commands resume
/// flowing to the camera.
const EXTERNAL_PRESET_DURATION: f64 = 0.5;

/// A point-in-time view of engine state, handed to `get_status()`
/// callers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub session_state: SessionState,
    pub stats: Stats,
    pub current_target: Option<TrackId>,
    pub selector_mode: SelectorModeSnapshot,
    pub zoom_level: f64,
    pub tracks: Vec<TrackSnapshot>,
}

/// Serialisable mirror of [`SelectorMode`] for snapshot consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorModeSnapshot {
    Idle,
    Primary,
    Secondary,
    PresetTransit,
    Lost,
}

impl From<SelectorMode> for SelectorModeSnapshot {
    fn from(mode: SelectorMode) -> Self {
        match mode {
            SelectorMode::Idle => Self::Idle,
            SelectorMode::Primary => Self::Primary,
            SelectorMode::Secondary => Self::Secondary,
            SelectorMode::PresetTransit => Self::PresetTransit,
            SelectorMode::Lost => Self::Lost,
        }
    }
}

struct State<D: CameraDriver> {
    config: Config,
    store: TrackStore,
    selector: TargetSelector,
    controller: Controller,
    dispatcher: Dispatcher<D>,
    telemetry: Telemetry,
    last_tick_at: Option<f64>,
    external_preset_deadline: Option<f64>,
    external_preset_token: Option<PresetToken>,
    /// Set once a stop command has been dispatched for the current loss
    /// episode, so entering `SelectorMode::Lost` fires exactly one `stop`
    /// rather than one per tick while no detections arrive. Cleared as
    /// soon as a target is reacquired.
    stop_dispatched_on_loss: bool,
}

impl<D: CameraDriver> State<D> {
    fn new(config: Config, driver: D) -> Self {
        Self {
            selector: TargetSelector::new(config.alternation),
            controller: Controller::new(config.motion, config.zoom),
            dispatcher: Dispatcher::new(driver, config.dispatch),
            telemetry: Telemetry::new(),
            store: TrackStore::new(),
            last_tick_at: None,
            external_preset_deadline: None,
            external_preset_token: None,
            stop_dispatched_on_loss: false,
            config,
        }
    }

    /// Handles a direct `goto_preset` call from the cell→preset overlay
    /// side channel (`spec.md` §6): dispatches the preset move immediately
    /// and preempts tracking dispatch for the assumed transit duration.
    /// Tracking itself is not paused — `ingest`/selector/controller keep
    /// running — only the dispatcher queues their output until transit
    /// completes.
    async fn goto_preset(&mut self, token: PresetToken, now: f64) -> Result<(), EngineError> {
        self.dispatcher.begin_preempt();
        self.external_preset_deadline = Some(now + EXTERNAL_PRESET_DURATION);
        self.external_preset_token = Some(token.clone());
        self.dispatcher.dispatch(DispatchCommand::GotoPreset(token), now).await
    }

    /// Filters and associates one batch of detections against the track
    /// store. Does not talk to the camera driver — that only happens on
    /// the dispatcher tick.
    fn ingest(&mut self, detections: Vec<Detection>, now: f64) {
        let filtering = self.config.filtering;
        let valid: Vec<Detection> = detections
            .into_iter()
            .filter(|d| {
                let ok = d.is_valid()
                    && d.confidence >= filtering.min_confidence
                    && d.area() >= filtering.min_size
                    && d.area() <= filtering.max_size;
                if !ok {
                    self.telemetry.record_dropped_detection();
                }
                ok
            })
            .collect();

        let association = associator::associate(&self.store, &valid);

        for (track_id, detection_idx) in &association.matches {
            let detection = valid[*detection_idx].clone();
            if let Err(err) = self.store.update(*track_id, detection) {
                debug!(?err, track_id, "dropping malformed update");
                self.telemetry.record_dropped_detection();
            }
        }

        for idx in association.unmatched_detections {
            if self.store.len() >= filtering.max_objects {
                self.telemetry.record_dropped_detection_capacity();
                continue;
            }
            let detection = valid[idx].clone();
            let id = self.store.insert(detection, now);
            self.telemetry.record_track_created();
            let snapshot = self.store.get(id).expect("just inserted").snapshot();
            self.telemetry.object_detected(id, snapshot);
        }

        for lost_id in self.store.prune(now, filtering.object_timeout) {
            self.telemetry.record_track_lost(lost_id);
        }

        let weights = self.config.priority;
        for track in self.store.iter_mut() {
            let breakdown = scorer::score(track, &weights, now);
            track.set_priority_score(breakdown.combined);
        }

        self.telemetry.record_frame();
    }

    /// Advances the selector/controller/dispatcher by one tick.
    async fn tick(&mut self, now: f64) -> Result<(), EngineError> {
        let dt = now - self.last_tick_at.unwrap_or(now);
        self.last_tick_at = Some(now);

        if let Some(deadline) = self.external_preset_deadline {
            if now >= deadline {
                self.external_preset_deadline = None;
                self.dispatcher.end_preempt(now).await?;
                if let Some(token) = self.external_preset_token.take() {
                    self.telemetry.preset_reached(token);
                }
            }
        }

        let previous_target = self.selector.current_target();
        let was_transit = self.selector.mode() == SelectorMode::PresetTransit;
        let decision = self.selector.tick(&self.store, now);

        match decision.mode {
            SelectorMode::Idle | SelectorMode::Lost => {
                self.store.set_primary(None);
            }
            _ => {
                self.store.set_primary(decision.target);
                self.store.accrue_primary_time(dt.max(0.0));
                self.stop_dispatched_on_loss = false;
            }
        }

        if decision.switched {
            if let Some(target) = decision.target {
                self.telemetry.target_switched(previous_target, target);
            }
        }

        let Some(target_id) = decision.target else {
            // A target that was actually being followed just vanished
            // (timed out). Send a single stop so the camera doesn't keep
            // executing its last continuous_move indefinitely; stay quiet
            // on every subsequent tick until a target is reacquired.
            if decision.mode == SelectorMode::Lost && !self.stop_dispatched_on_loss {
                self.stop_dispatched_on_loss = true;
                self.stop_motion(now).await?;
            }
            return Ok(());
        };

        match decision.mode {
            SelectorMode::PresetTransit => {
                let token = PresetToken::new(format!("track-{target_id}"));
                self.dispatcher.dispatch(DispatchCommand::GotoPreset(token), now).await?;
                return Ok(());
            }
            SelectorMode::Idle | SelectorMode::Lost => return Ok(()),
            SelectorMode::Primary | SelectorMode::Secondary => {}
        }

        if was_transit {
            self.telemetry.preset_reached(PresetToken::new(format!("track-{target_id}")));
        }

        let Some(track) = self.store.get(target_id) else {
            return Ok(());
        };

        let prediction = predictor::predict_position(track, &self.config.motion);
        let area_ratio = track.area_ratio();
        let command = self.controller.compute(prediction.position, area_ratio);

        self.dispatcher
            .dispatch(
                DispatchCommand::ContinuousMove {
                    pan: command.pan,
                    tilt: command.tilt,
                },
                now,
            )
            .await?;

        if let Some(zoom) = command.zoom {
            self.dispatcher.dispatch(DispatchCommand::AbsoluteZoom(zoom), now).await?;
            self.telemetry.zoom_changed(zoom, area_ratio);
        }

        let snapshot = self.store.get(target_id).map(crate::track::Track::snapshot);
        if let Some(snapshot) = snapshot {
            self.telemetry.tracking_tick(target_id, snapshot);
        }

        Ok(())
    }

    async fn stop_motion(&mut self, now: f64) -> Result<(), EngineError> {
        let command = self.controller.stop();
        self.dispatcher
            .dispatch(
                DispatchCommand::Stop {
                    pan_tilt: true,
                    zoom: true,
                },
                now,
            )
            .await?;
        debug_assert!(command.is_zero_motion());
        Ok(())
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            session_state: self.telemetry.state(),
            stats: self.telemetry.stats(),
            current_target: self.selector.current_target(),
            selector_mode: self.selector.mode().into(),
            zoom_level: self.controller.zoom_level(),
            tracks: self.store.snapshot(),
        }
    }
}

/// The multi-object PTZ tracking engine.
///
/// Generic over the clock (production vs. deterministic simulation) and
/// the camera driver, so the same tracking logic runs against either a
/// real camera/clock or a deterministic test double.
pub struct Engine<C: EngineClock, D: CameraDriver> {
    clock: Arc<C>,
    state: Arc<Mutex<State<D>>>,
    running: Arc<AtomicBool>,
}

impl<C: EngineClock + 'static, D: CameraDriver + 'static> Engine<C, D> {
    /// Builds a new engine. Returns `Err` if `config` fails
    /// `Config::validate`.
    pub fn new(config: Config, driver: D, clock: Arc<C>) -> Result<Self, crate::error::ConfigError> {
        config.validate()?;
        Ok(Self {
            clock,
            state: Arc::new(Mutex::new(State::new(config, driver))),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Registers an observer callback for lifecycle/tracking events. The
    /// callback runs synchronously on whichever task currently holds the
    /// engine lock — it must not call back into the engine.
    pub async fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&crate::telemetry::Event) + Send + Sync + 'static,
    {
        self.state.lock().await.telemetry.subscribe(callback);
    }

    /// Submits one batch of detections for the current frame.
    ///
    /// A no-op that leaves every track untouched once the session has
    /// transitioned to `Error` (a permanent dispatch failure, or an
    /// `emergency_stop`) — an explicit restart is required before
    /// detections are accepted again.
    pub async fn submit_detections(&self, detections: Vec<Detection>) -> Result<(), EngineError> {
        let now = self.clock.now().as_secs_f64();
        let mut state = self.state.lock().await;
        if state.telemetry.state() == SessionState::Error {
            return Ok(());
        }
        state.ingest(detections, now);
        Ok(())
    }

    /// Cell→preset side channel (`spec.md` §6): an external video-grid
    /// overlay may call this directly to jump the camera to a stored
    /// preset. Preempts continuous tracking moves for the duration of the
    /// transit; tracking keeps running underneath and resumes dispatching
    /// as soon as the transit completes.
    pub async fn goto_preset(&self, token: PresetToken) -> Result<(), EngineError> {
        let now = self.clock.now().as_secs_f64();
        self.state.lock().await.goto_preset(token, now).await
    }

    /// Advances the selector/controller/dispatcher by exactly one tick,
    /// using the clock's current time. Exposed for deterministic
    /// simulation harnesses that step the engine manually instead of
    /// running the background loop started by [`Engine::start`].
    pub async fn step(&self) -> Result<(), EngineError> {
        let now = self.clock.now().as_secs_f64();
        self.state.lock().await.tick(now).await
    }

    /// Starts the ~30Hz dispatcher tick loop in the background.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // already running
        }

        let state = self.state.clone();
        let running = self.running.clone();
        let clock = self.clock.clone();
        let interval = Duration::from_secs_f64(1.0 / TICK_HZ);

        self.clock.spawn("ptz-dispatcher", async move {
            state.lock().await.telemetry.tracking_started();
            while running.load(Ordering::SeqCst) {
                let now = clock.now().as_secs_f64();
                let mut guard = state.lock().await;
                if let Err(err) = guard.tick(now).await {
                    guard.telemetry.record_dispatch_error();
                    match err {
                        EngineError::PermanentDispatch(ref msg) => {
                            error!(%msg, "permanent dispatch failure, stopping session");
                            guard.telemetry.error(msg.clone());
                            drop(guard);
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                        _ => {
                            debug!(?err, "transient dispatch failure, will retry next tick");
                        }
                    }
                }
                drop(guard);
                clock.sleep(interval).await;
            }
        });
    }

    /// Stops tracking: halts the tick loop and issues a final stop
    /// command. No further camera commands are dispatched after this
    /// returns.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.running.store(false, Ordering::SeqCst);
        let now = self.clock.now().as_secs_f64();
        let mut state = self.state.lock().await;
        state.stop_motion(now).await?;
        state.telemetry.tracking_stopped();
        Ok(())
    }

    /// Immediately halts the tick loop and sends an all-stop command,
    /// regardless of any in-flight transient errors. Transitions the
    /// session to `Error` per `spec.md` §8 scenario S6 — a fresh `start()`
    /// is required to resume tracking.
    pub async fn emergency_stop(&self) -> Result<(), EngineError> {
        self.running.store(false, Ordering::SeqCst);
        let now = self.clock.now().as_secs_f64();
        let mut state = self.state.lock().await;
        let result = state.stop_motion(now).await;
        state.telemetry.emergency_stopped();
        result
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        self.state.lock().await.status()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Event;
    use async_trait::async_trait;
    use ptz_env::DriverError;
    use std::sync::atomic::AtomicU32;
    use std::time::SystemTime;

    struct ManualClock {
        now: std::sync::Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: std::sync::Mutex::new(Duration::ZERO),
            })
        }

        fn advance(&self, dt: Duration) {
            *self.now.lock().unwrap() += dt;
        }
    }

    #[async_trait]
    impl EngineClock for ManualClock {
        fn now(&self) -> Duration {
            *self.now.lock().unwrap()
        }

        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH + self.now()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }

        fn spawn<F>(&self, _name: &str, future: F)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
    }

    #[derive(Clone, Default)]
    struct RecordingDriver {
        goto_preset_calls: Arc<AtomicU32>,
        continuous_move_calls: Arc<AtomicU32>,
        stop_calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl CameraDriver for RecordingDriver {
        async fn continuous_move(&self, _pan: f64, _tilt: f64) -> Result<(), DriverError> {
            self.continuous_move_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn absolute_move(&self, _zoom: f64) -> Result<(), DriverError> {
            Ok(())
        }

        async fn goto_preset(&self, _token: &PresetToken) -> Result<(), DriverError> {
            self.goto_preset_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self, _pan_tilt: bool, _zoom: bool) -> Result<(), DriverError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

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

    #[tokio::test]
    async fn goto_preset_preempts_tracking_then_resumes() {
        let clock = ManualClock::new();
        let driver = RecordingDriver::default();
        let engine = Engine::new(Config::standard(), driver.clone(), clock.clone()).expect("valid config");

        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();
        let moves_before_preset = driver.continuous_move_calls.load(Ordering::SeqCst);
        assert!(moves_before_preset > 0);

        engine.goto_preset(PresetToken::new("cell-7")).await.unwrap();
        assert_eq!(driver.goto_preset_calls.load(Ordering::SeqCst), 1);

        // Mid-transit: tracking keeps computing, but its commands are
        // queued rather than reaching the driver.
        clock.advance(Duration::from_millis(100));
        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();
        assert_eq!(driver.continuous_move_calls.load(Ordering::SeqCst), moves_before_preset);

        // Past the transit duration, queued tracking output flushes again.
        clock.advance(Duration::from_millis(500));
        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();
        assert!(driver.continuous_move_calls.load(Ordering::SeqCst) > moves_before_preset);
    }

    #[tokio::test]
    async fn goto_preset_fires_preset_reached_on_the_next_tracking_tick() {
        let clock = ManualClock::new();
        let driver = RecordingDriver::default();
        let engine = Engine::new(Config::standard(), driver.clone(), clock.clone()).expect("valid config");

        let saw_preset_reached = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = saw_preset_reached.clone();
        engine
            .subscribe(move |event| {
                if matches!(event, Event::PresetReached { .. }) {
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .await;

        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();

        engine.goto_preset(PresetToken::new("cell-2")).await.unwrap();
        clock.advance(Duration::from_millis(600));
        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();

        assert!(saw_preset_reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn losing_the_target_dispatches_exactly_one_stop() {
        let clock = ManualClock::new();
        let driver = RecordingDriver::default();
        let engine = Engine::new(Config::standard(), driver.clone(), clock.clone()).expect("valid config");

        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();
        assert!(driver.continuous_move_calls.load(Ordering::SeqCst) > 0);
        assert_eq!(driver.stop_calls.load(Ordering::SeqCst), 0);

        let timeout = Config::standard().filtering.object_timeout;
        // No further detections arrive. Empty frames keep flowing (as a
        // real camera feed would) until the track ages out.
        let deadline = clock.now().as_secs_f64() + timeout + 1.0;
        while clock.now().as_secs_f64() < deadline {
            engine.submit_detections(vec![]).await.unwrap();
            engine.step().await.unwrap();
            clock.advance(Duration::from_secs_f64(1.0 / 30.0));
        }

        assert_eq!(driver.stop_calls.load(Ordering::SeqCst), 1);
        let status = engine.get_status().await;
        assert_eq!(status.selector_mode, SelectorModeSnapshot::Lost);

        // Stays at exactly one stop — no repeat dispatch while still lost.
        engine.submit_detections(vec![]).await.unwrap();
        engine.step().await.unwrap();
        assert_eq!(driver.stop_calls.load(Ordering::SeqCst), 1);

        // Reacquiring a target clears the guard so a later loss can stop
        // again.
        clock.advance(Duration::from_secs_f64(0.1));
        engine
            .submit_detections(vec![det(0.5, 0.5, clock.now().as_secs_f64())])
            .await
            .unwrap();
        engine.step().await.unwrap();
        let status = engine.get_status().await;
        assert_eq!(status.selector_mode, SelectorModeSnapshot::Primary);
    }
}
