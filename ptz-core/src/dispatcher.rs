//! Command dispatcher (C8).
//!
//! Wraps a [`CameraDriver`] with a bounded command history for
//! diagnostics. The ~30Hz tick loop itself lives in [`crate::engine`];
//! this module only owns "send one command, remember what happened".

use std::collections::VecDeque;
use std::time::Duration;

use ptz_env::{CameraDriver, PresetToken};

use crate::config::DispatchConfig;
use crate::error::EngineError;

/// Capacity at which the command history halves.
pub const HISTORY_CAPACITY: usize = 100;
const HISTORY_HALVED: usize = 50;

/// One command the dispatcher can issue to the camera driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchCommand {
    ContinuousMove { pan: f64, tilt: f64 },
    AbsoluteZoom(f64),
    GotoPreset(PresetToken),
    Stop { pan_tilt: bool, zoom: bool },
}

/// A record of one dispatched command, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLogEntry {
    pub command: DispatchCommand,
    pub t: f64,
    pub ok: bool,
}

/// Sends commands to a [`CameraDriver`] and keeps a bounded history of
/// what was sent and whether it succeeded.
///
/// Also implements the cell→preset side channel's preemption rule
/// (`spec.md` §6): while preempted, tracking continues to compute
/// commands each tick but they are queued rather than sent, with the
/// latest one replacing any still-pending one — a continuous 30Hz stream
/// has no use for replaying every stale intermediate command once the
/// preset transit completes.
pub struct Dispatcher<D: CameraDriver> {
    driver: D,
    config: DispatchConfig,
    history: VecDeque<CommandLogEntry>,
    preempted: bool,
    pending: Option<DispatchCommand>,
}

impl<D: CameraDriver> Dispatcher<D> {
    pub fn new(driver: D, config: DispatchConfig) -> Self {
        Self {
            driver,
            config,
            history: VecDeque::new(),
            preempted: false,
            pending: None,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_preempted(&self) -> bool {
        self.preempted
    }

    /// Begins preempting tracking dispatch — called when an external
    /// `goto_preset` side-channel call starts a preset transit.
    pub fn begin_preempt(&mut self) {
        self.preempted = true;
        self.pending = None;
    }

    /// Ends preemption and flushes whichever tracking command was queued
    /// most recently while preempted, if any.
    pub async fn end_preempt(&mut self, now: f64) -> Result<(), EngineError> {
        self.preempted = false;
        if let Some(command) = self.pending.take() {
            self.dispatch(command, now).await
        } else {
            Ok(())
        }
    }

    /// Sends `command` to the driver, appending the outcome to the
    /// history. Transient failures are returned to the caller to retry
    /// on the next tick; no dispatcher-level retry loop exists here.
    ///
    /// While preempted, a `ContinuousMove`/`AbsoluteZoom` is queued
    /// instead of sent — `GotoPreset` and `Stop` always go straight
    /// through, since those are what preemption exists to prioritise.
    ///
    /// Each call is bounded by a timeout keyed to the command's kind
    /// (`absolute_move_timeout` for absolute moves/presets,
    /// `continuous_move_timeout` for the ~30Hz continuous-move stream); a
    /// call that overruns it counts as a transient dispatch failure, same
    /// as any other retryable driver error.
    pub async fn dispatch(&mut self, command: DispatchCommand, now: f64) -> Result<(), EngineError> {
        if self.preempted
            && matches!(command, DispatchCommand::ContinuousMove { .. } | DispatchCommand::AbsoluteZoom(_))
        {
            self.pending = Some(command);
            return Ok(());
        }

        let timeout = Duration::from_secs_f64(match &command {
            DispatchCommand::ContinuousMove { .. } => self.config.continuous_move_timeout,
            DispatchCommand::AbsoluteZoom(_) | DispatchCommand::GotoPreset(_) | DispatchCommand::Stop { .. } => {
                self.config.absolute_move_timeout
            }
        });

        let call = async {
            match &command {
                DispatchCommand::ContinuousMove { pan, tilt } => self.driver.continuous_move(*pan, *tilt).await,
                DispatchCommand::AbsoluteZoom(level) => self.driver.absolute_move(*level).await,
                DispatchCommand::GotoPreset(token) => self.driver.goto_preset(token).await,
                DispatchCommand::Stop { pan_tilt, zoom } => self.driver.stop(*pan_tilt, *zoom).await,
            }
        };

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(inner) => inner.map_err(EngineError::from),
            Err(_) => Err(EngineError::TransientDispatch(format!(
                "camera driver call exceeded {timeout:?}"
            ))),
        };
        let ok = result.is_ok();
        self.record(command, now, ok);
        result
    }

    fn record(&mut self, command: DispatchCommand, t: f64, ok: bool) {
        self.history.push_back(CommandLogEntry { command, t, ok });
        if self.history.len() > HISTORY_CAPACITY {
            while self.history.len() > HISTORY_HALVED {
                self.history.pop_front();
            }
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &CommandLogEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ptz_env::DriverError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingDriver {
        calls: Arc<AtomicUsize>,
        fail_next: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl CameraDriver for CountingDriver {
        async fn continuous_move(&self, _pan: f64, _tilt: f64) -> Result<(), DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(DriverError::transient("simulated timeout"));
            }
            Ok(())
        }

        async fn absolute_move(&self, _zoom: f64) -> Result<(), DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn goto_preset(&self, _token: &PresetToken) -> Result<(), DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self, _pan_tilt: bool, _zoom: bool) -> Result<(), DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_records_successful_command() {
        let mut dispatcher = Dispatcher::new(CountingDriver::default(), DispatchConfig::default());
        dispatcher
            .dispatch(DispatchCommand::ContinuousMove { pan: 0.1, tilt: 0.0 }, 0.0)
            .await
            .unwrap();
        assert_eq!(dispatcher.history_len(), 1);
        assert!(dispatcher.history().next().unwrap().ok);
    }

    #[tokio::test]
    async fn transient_failure_is_returned_and_recorded() {
        let driver = CountingDriver::default();
        driver.fail_next.store(true, Ordering::SeqCst);
        let mut dispatcher = Dispatcher::new(driver, DispatchConfig::default());
        let result = dispatcher
            .dispatch(DispatchCommand::ContinuousMove { pan: 0.1, tilt: 0.0 }, 0.0)
            .await;
        assert!(matches!(result, Err(EngineError::TransientDispatch(_))));
        assert!(!dispatcher.history().next().unwrap().ok);
    }

    #[tokio::test]
    async fn history_halves_once_capacity_is_exceeded() {
        let mut dispatcher = Dispatcher::new(CountingDriver::default(), DispatchConfig::default());
        for i in 0..(HISTORY_CAPACITY + 1) {
            dispatcher
                .dispatch(DispatchCommand::Stop { pan_tilt: true, zoom: true }, i as f64)
                .await
                .unwrap();
        }
        assert_eq!(dispatcher.history_len(), HISTORY_HALVED);
    }

    #[tokio::test]
    async fn preempted_tracking_commands_are_queued_not_sent() {
        let driver = CountingDriver::default();
        let mut dispatcher = Dispatcher::new(driver.clone(), DispatchConfig::default());
        dispatcher.begin_preempt();
        dispatcher
            .dispatch(DispatchCommand::ContinuousMove { pan: 0.2, tilt: 0.1 }, 0.0)
            .await
            .unwrap();
        assert_eq!(driver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.history_len(), 0);
    }

    #[tokio::test]
    async fn goto_preset_and_stop_bypass_preemption() {
        let driver = CountingDriver::default();
        let mut dispatcher = Dispatcher::new(driver.clone(), DispatchConfig::default());
        dispatcher.begin_preempt();
        dispatcher
            .dispatch(DispatchCommand::GotoPreset(PresetToken::new("cell-3")), 0.0)
            .await
            .unwrap();
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ending_preemption_flushes_the_latest_queued_command() {
        let driver = CountingDriver::default();
        let mut dispatcher = Dispatcher::new(driver.clone(), DispatchConfig::default());
        dispatcher.begin_preempt();
        dispatcher
            .dispatch(DispatchCommand::ContinuousMove { pan: 0.1, tilt: 0.0 }, 0.0)
            .await
            .unwrap();
        dispatcher
            .dispatch(DispatchCommand::ContinuousMove { pan: 0.3, tilt: 0.0 }, 0.1)
            .await
            .unwrap();
        assert_eq!(driver.calls.load(Ordering::SeqCst), 0);

        dispatcher.end_preempt(0.2).await.unwrap();
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.history_len(), 1);
        match &dispatcher.history().next().unwrap().command {
            DispatchCommand::ContinuousMove { pan, .. } => assert!((pan - 0.3).abs() < 1e-9),
            other => panic!("expected the last queued command, got {other:?}"),
        }
    }

    #[derive(Clone, Default)]
    struct SlowDriver;

    #[async_trait]
    impl CameraDriver for SlowDriver {
        async fn continuous_move(&self, _pan: f64, _tilt: f64) -> Result<(), DriverError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }

        async fn absolute_move(&self, _zoom: f64) -> Result<(), DriverError> {
            Ok(())
        }

        async fn goto_preset(&self, _token: &PresetToken) -> Result<(), DriverError> {
            Ok(())
        }

        async fn stop(&self, _pan_tilt: bool, _zoom: bool) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_call_exceeding_its_configured_timeout_counts_as_transient() {
        let config = DispatchConfig {
            continuous_move_timeout: 0.01,
            ..DispatchConfig::default()
        };
        let mut dispatcher = Dispatcher::new(SlowDriver, config);
        let result = dispatcher
            .dispatch(DispatchCommand::ContinuousMove { pan: 0.1, tilt: 0.0 }, 0.0)
            .await;
        assert!(matches!(result, Err(EngineError::TransientDispatch(_))));
        assert!(!dispatcher.history().next().unwrap().ok);
    }
}
