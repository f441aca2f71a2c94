//! Lockstep session simulator
//!
//! Runs a coordinator and a fleet of simulated vehicle clients through the
//! barrier → run → report → telemetry cycle, then checks that every client
//! stayed in step.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    SessionRunner                      │
//! │                                                       │
//! │   ┌─────────────┐   broadcast   ┌──────────────────┐  │
//! │   │ Coordinator │──────────────►│ ClientAgent + UAV │  │
//! │   │             │◄──────────────│   (per client)    │  │
//! │   └─────────────┘  request/reply└──────────────────┘  │
//! │          ▲                              │             │
//! │          └──────── memory_link ─────────┘             │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lockstep_sim::{ScenarioId, SessionRunner};
//!
//! let runner = SessionRunner::new(42, 3).with_steps(20);
//! let result = runner.run(ScenarioId::MultiPart).await?;
//! assert!(result.passed);
//! ```

pub mod client;
pub mod error;
pub mod exporter;
pub mod runner;
pub mod scenarios;
pub mod vehicle;

pub use client::{drive_client, ClientOutcome, ClientPlan};
pub use error::SimError;
pub use exporter::{FrameRecorder, SessionExport, StepFrame};
pub use runner::{SessionResult, SessionRunner};
pub use scenarios::ScenarioId;
pub use vehicle::{IntentRecord, Vehicle, VehicleTelemetry};
