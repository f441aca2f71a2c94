//! JSON export of relayed telemetry.
//!
//! Frames are captured from one client's point of view: everything the
//! coordinator broadcast between two run signals lands in the same frame.

use lockstep_core::TelemetryObserver;
use lockstep_env::Payload;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Telemetry seen during one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFrame {
    pub step: u64,
    pub telemetry: Vec<serde_json::Value>,
}

/// Complete session export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub clients: usize,
    pub steps: u64,

    /// All frames
    pub frames: Vec<StepFrame>,

    /// Final result
    pub passed: bool,
}

impl SessionExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, clients: usize) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            clients,
            steps: 0,
            frames: Vec::new(),
            passed: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: StepFrame) {
        self.steps = self.steps.max(frame.step);
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool) {
        self.passed = passed;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Observer that groups telemetry into [`StepFrame`]s.
///
/// Clones share the same frame list, so one copy can be handed to a client
/// and the other drained once the session ends.
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    frames: Arc<Mutex<Vec<StepFrame>>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every frame recorded so far.
    pub fn take_frames(&self) -> Vec<StepFrame> {
        self.frames
            .lock()
            .map(|mut frames| std::mem::take(&mut *frames))
            .unwrap_or_default()
    }
}

impl TelemetryObserver for FrameRecorder {
    fn on_telemetry(&mut self, step: u64, payload: &Payload) {
        let Ok(mut frames) = self.frames.lock() else {
            return;
        };

        match frames.last_mut() {
            Some(frame) if frame.step == step => frame.telemetry.push(payload.as_value().clone()),
            _ => frames.push(StepFrame {
                step,
                telemetry: vec![payload.as_value().clone()],
            }),
        }
    }
}
