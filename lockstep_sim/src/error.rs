//! Error types for the simulation harness.

use lockstep_core::{ClientError, CoordinatorError};
use lockstep_env::LinkError;
use thiserror::Error;

/// Errors that abort a simulated session.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Payload could not be built
    #[error("Payload error: {0}")]
    Payload(#[from] LinkError),

    /// A session task panicked or was aborted
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),
}
