//! Lockstep Channel Abstraction Layer
//!
//! This crate provides the two asymmetric channels a lockstep session runs
//! on, independent of any concrete transport:
//!
//! - **Broadcast**: coordinator → every client, fire-and-forget
//! - **Request/reply**: client → coordinator, blocking until answered
//!
//! # Transports
//!
//! - **In-memory** (`memory_link`): tokio channels, used by the simulation
//!   harness and tests
//! - **ZeroMQ** (feature `zmq-transport`): REQ/REP + PUB/SUB sockets with
//!   JSON records on the wire
//!
//! # Example
//!
//! ```ignore
//! use lockstep_env::{memory_link, BroadcastSender, Connector, Message};
//!
//! let (publisher, replier, address) = memory_link(64);
//! let (subscriber, requester) = address.connect().await?;
//! publisher.send(Message::SyncRequest).await?;
//! ```

mod channel;
mod error;
mod memory;
mod message;
mod shutdown;
mod types;
#[cfg(feature = "zmq-transport")]
mod zmq_impl;

pub use channel::{BroadcastReceiver, BroadcastSender, Connector, RequestClient, RequestServer};
pub use error::LinkError;
pub use memory::{memory_link, MemoryAddress, MemoryPublisher, MemoryReplier, MemoryRequester, MemorySubscriber};
pub use message::{decode, encode, Message, Payload};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use types::{ClientId, TransportConfig};
#[cfg(feature = "zmq-transport")]
pub use zmq_impl::{ZmqBinding, ZmqConnector, ZmqPublisher, ZmqReplier, ZmqRequester, ZmqSubscriber};
