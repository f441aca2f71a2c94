//! Error types for the coordinator and client agent.

use crate::client::ClientState;
use lockstep_env::LinkError;
use thiserror::Error;

/// Errors surfaced by a [`ClientAgent`](crate::ClientAgent).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Coordinator endpoints unreachable at setup. Not retried.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The client's shutdown signal fired while it was blocked
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// A report burst must contain at least one part
    #[error("Report has no parts")]
    EmptyReport,

    /// Operation called out of protocol order
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ClientState,
    },

    /// Channel failure after setup
    #[error(transparent)]
    Link(LinkError),
}

impl From<LinkError> for ClientError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Connection(msg) => Self::Connection(msg),
            other => Self::Link(other),
        }
    }
}

/// Errors surfaced by a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unrecoverable channel failure
    #[error(transparent)]
    Link(#[from] LinkError),
}
