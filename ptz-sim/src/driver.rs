//! Recording camera driver test double.
//!
//! A deterministic stand-in for the real transport that records every
//! outbound call instead of actually talking to hardware, plus an
//! injectable failure queue for exercising the dispatcher's
//! transient/permanent error handling.

use async_trait::async_trait;
use ptz_env::{CameraDriver, DriverError, PresetToken};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One call the dispatcher made, recorded for scenario assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    ContinuousMove { pan: f64, tilt: f64 },
    AbsoluteMove { zoom: f64 },
    GotoPreset { token: String },
    Stop { pan_tilt: bool, zoom: bool },
}

/// A [`CameraDriver`] that records commands instead of dispatching them
/// to hardware, with an optional scripted failure queue.
pub struct RecordingCameraDriver {
    commands: Mutex<Vec<RecordedCommand>>,
    scripted_failures: Mutex<VecDeque<DriverError>>,
}

impl RecordingCameraDriver {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues an error to be returned by the next dispatched command,
    /// instead of recording it.
    pub fn inject_failure(&self, error: DriverError) {
        self.scripted_failures
            .lock()
            .expect("scripted failure queue lock poisoned")
            .push_back(error);
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().expect("recorded command lock poisoned").clone()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().expect("recorded command lock poisoned").len()
    }

    pub fn last_command(&self) -> Option<RecordedCommand> {
        self.commands.lock().expect("recorded command lock poisoned").last().cloned()
    }

    fn next_failure(&self) -> Option<DriverError> {
        self.scripted_failures
            .lock()
            .expect("scripted failure queue lock poisoned")
            .pop_front()
    }

    fn record(&self, command: RecordedCommand) {
        self.commands.lock().expect("recorded command lock poisoned").push(command);
    }
}

impl Default for RecordingCameraDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDriver for RecordingCameraDriver {
    async fn continuous_move(&self, pan: f64, tilt: f64) -> Result<(), DriverError> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.record(RecordedCommand::ContinuousMove { pan, tilt });
        Ok(())
    }

    async fn absolute_move(&self, zoom: f64) -> Result<(), DriverError> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.record(RecordedCommand::AbsoluteMove { zoom });
        Ok(())
    }

    async fn goto_preset(&self, token: &PresetToken) -> Result<(), DriverError> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.record(RecordedCommand::GotoPreset { token: token.to_string() });
        Ok(())
    }

    async fn stop(&self, pan_tilt: bool, zoom: bool) -> Result<(), DriverError> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        self.record(RecordedCommand::Stop { pan_tilt, zoom });
        Ok(())
    }
}
