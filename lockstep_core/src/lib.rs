//! Lockstep Core - barrier-synchronized stepping for independent simulations
//!
//! One coordinator keeps N simulation clients in lockstep:
//! 1. **Barrier**: every client declares readiness before the first step
//! 2. **Run**: the coordinator signals all clients to execute one step
//! 3. **Collect**: each client reports, possibly in several ordered parts
//! 4. **Relay**: every report part is rebroadcast to all clients as telemetry
//!
//! The next step starts only once every client's report is complete.
//!
//! Both sides talk through the traits in [`lockstep_env`], so the same code
//! runs over the in-memory transport and over ZeroMQ sockets.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod observer;
pub mod report;
pub mod session;

// Re-export key types for convenience
pub use client::{ClientAgent, ClientState};
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, Phase};
pub use error::{ClientError, CoordinatorError};
pub use observer::{NullObserver, TelemetryObserver};
pub use report::ReportBurst;
pub use session::{SessionState, SessionStats};
