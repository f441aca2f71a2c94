//! Error types for the Lockstep channel abstraction.

use thiserror::Error;

/// Errors that can occur on a broadcast or request/reply channel.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Endpoint could not be reached or bound at setup
    #[error("Connection error: {0}")]
    Connection(String),

    /// The channel was closed by the other side (shutdown)
    #[error("Channel closed")]
    Closed,

    /// The requester went away before its reply could be delivered
    #[error("Peer disconnected before reply")]
    PeerDisconnected,

    /// Message serialization/deserialization failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// Request/reply alternation was violated
    #[error("Invalid channel state: {0}")]
    State(String),

    /// Underlying socket failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl LinkError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a codec error.
    pub fn codec(msg: impl std::fmt::Display) -> Self {
        Self::Codec(msg.to_string())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Returns true if the loop that hit this error can keep going.
    ///
    /// A malformed message or a vanished requester affects one exchange only;
    /// a closed channel or a socket failure affects every later one.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Codec(_) | Self::PeerDisconnected)
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::codec(err)
    }
}
