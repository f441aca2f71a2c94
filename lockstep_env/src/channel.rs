//! Channel abstraction between the coordinator and its clients.

use async_trait::async_trait;
use crate::error::LinkError;
use crate::message::Message;
use std::time::Duration;

/// Coordinator side of the fan-out channel.
///
/// # Packet Flow
///
/// ```text
/// Coordinator                 Broadcast                  Client N
///   |                           |                          |
///   |-- send(run) ------------->|                          |
///   |                           |-- copy per receiver ---->|
///   |                           |                          |-- receive() -> run
/// ```
#[async_trait]
pub trait BroadcastSender: Send + Sync + 'static {
    /// Delivers a message to every currently connected receiver.
    ///
    /// Does not wait for receivers to read it. Receivers that connect later
    /// never see it.
    async fn send(&self, message: Message) -> Result<(), LinkError>;
}

/// Client side of the fan-out channel.
#[async_trait]
pub trait BroadcastReceiver: Send + Sync + 'static {
    /// Receives the next broadcast message.
    ///
    /// # Blocking
    /// Blocks until a message arrives. Messages arrive in send order.
    ///
    /// # Returns
    /// * `Err(LinkError::Closed)` - The coordinator side went away
    async fn receive(&self) -> Result<Message, LinkError>;
}

/// Client side of the point-to-point request channel.
#[async_trait]
pub trait RequestClient: Send + Sync + 'static {
    /// Sends a request and waits for the coordinator's answer.
    ///
    /// At most one request is in flight per endpoint; concurrent callers
    /// are served one after another.
    async fn request(&self, message: Message) -> Result<Message, LinkError>;
}

/// Coordinator side of the request channel, shared by all clients.
///
/// Strictly alternating: every request returned by [`poll`](Self::poll)
/// must be answered with [`reply`](Self::reply) before the next poll.
#[async_trait]
pub trait RequestServer: Send + Sync + 'static {
    /// Waits up to `timeout` for the next request from any client.
    ///
    /// # Returns
    /// * `Ok(Some(message))` - A request arrived and now awaits a reply
    /// * `Ok(None)` - The timeout elapsed with nothing received
    /// * `Err(LinkError::Codec)` - A malformed request arrived; it still awaits a reply
    async fn poll(&self, timeout: Duration) -> Result<Option<Message>, LinkError>;

    /// Answers the request returned by the last poll.
    async fn reply(&self, message: Message) -> Result<(), LinkError>;
}

/// Establishes a client's two endpoints toward one coordinator.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Broadcast endpoint type produced by this connector
    type Receiver: BroadcastReceiver;

    /// Request endpoint type produced by this connector
    type Client: RequestClient;

    /// Connects both endpoints.
    ///
    /// # Returns
    /// * `Err(LinkError::Connection)` - The coordinator cannot be reached
    async fn connect(&self) -> Result<(Self::Receiver, Self::Client), LinkError>;
}
