//! ZeroMQ transport - REQ/REP for requests, PUB/SUB for broadcasts.
//!
//! Wire-compatible with any peer that speaks the JSON records in
//! [`crate::message`] over plain ZeroMQ sockets:
//! - Coordinator binds REP on `request_port` and PUB on `broadcast_port`
//! - Clients connect REQ and SUB (subscribed to everything)
//!
//! Socket calls block, so each one runs on tokio's blocking pool.
//! Receives use a short socket timeout and loop, which keeps them
//! cancellable from the async side.

use async_trait::async_trait;
use crate::channel::{BroadcastReceiver, BroadcastSender, Connector, RequestClient, RequestServer};
use crate::error::LinkError;
use crate::message::{decode, encode, Message};
use crate::types::TransportConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Receive timeout for one blocking attempt
const RECV_SLICE_MS: i32 = 250;

type SharedSocket = Arc<Mutex<zmq::Socket>>;

fn zmq_err(context: &str) -> impl FnOnce(zmq::Error) -> LinkError + '_ {
    move |e| LinkError::Transport(format!("{}: {}", context, e))
}

fn connect_err(endpoint: &str) -> impl FnOnce(zmq::Error) -> LinkError + '_ {
    move |e| LinkError::Connection(format!("{}: {}", endpoint, e))
}

/// Runs a socket operation on the blocking pool.
async fn run_blocking<T, F>(socket: &SharedSocket, op: F) -> Result<T, LinkError>
where
    T: Send + 'static,
    F: FnOnce(&zmq::Socket) -> Result<T, LinkError> + Send + 'static,
{
    let socket = Arc::clone(socket);
    tokio::task::spawn_blocking(move || {
        let socket = socket
            .lock()
            .map_err(|_| LinkError::transport("socket lock poisoned"))?;
        op(&socket)
    })
    .await
    .map_err(LinkError::transport)?
}

/// One receive attempt bounded by the socket's receive timeout.
fn try_recv(socket: &zmq::Socket) -> Result<Option<Vec<u8>>, LinkError> {
    match socket.recv_bytes(0) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(zmq::Error::EAGAIN) => Ok(None),
        Err(e) => Err(zmq_err("recv")(e)),
    }
}

/// Coordinator-side sockets bound on all interfaces.
pub struct ZmqBinding {
    _context: zmq::Context,
}

impl ZmqBinding {
    /// Binds the request and broadcast endpoints.
    ///
    /// # Returns
    /// * `Err(LinkError::Connection)` - A port could not be bound
    pub fn bind(config: &TransportConfig) -> Result<(ZmqPublisher, ZmqReplier), LinkError> {
        let context = zmq::Context::new();

        let request_endpoint = format!("tcp://*:{}", config.request_port);
        let rep = context.socket(zmq::REP).map_err(zmq_err("create REP"))?;
        rep.bind(&request_endpoint).map_err(connect_err(&request_endpoint))?;

        let broadcast_endpoint = format!("tcp://*:{}", config.broadcast_port);
        let publisher = context.socket(zmq::PUB).map_err(zmq_err("create PUB"))?;
        publisher.bind(&broadcast_endpoint).map_err(connect_err(&broadcast_endpoint))?;

        let binding = Arc::new(Self { _context: context });
        Ok((
            ZmqPublisher {
                socket: Arc::new(Mutex::new(publisher)),
                _binding: Arc::clone(&binding),
            },
            ZmqReplier {
                socket: Arc::new(Mutex::new(rep)),
                awaiting_reply: AtomicBool::new(false),
                _binding: binding,
            },
        ))
    }
}

/// Broadcast endpoint (PUB socket).
pub struct ZmqPublisher {
    socket: SharedSocket,
    _binding: Arc<ZmqBinding>,
}

#[async_trait]
impl BroadcastSender for ZmqPublisher {
    async fn send(&self, message: Message) -> Result<(), LinkError> {
        let bytes = encode(&message)?;
        run_blocking(&self.socket, move |socket| {
            socket.send(bytes, 0).map_err(zmq_err("publish"))
        })
        .await
    }
}

/// Request endpoint (REP socket).
pub struct ZmqReplier {
    socket: SharedSocket,
    awaiting_reply: AtomicBool,
    _binding: Arc<ZmqBinding>,
}

#[async_trait]
impl RequestServer for ZmqReplier {
    async fn poll(&self, timeout: Duration) -> Result<Option<Message>, LinkError> {
        if self.awaiting_reply.load(Ordering::Acquire) {
            return Err(LinkError::State("previous request not answered".into()));
        }

        let timeout_ms = timeout.as_millis() as i64;
        let received = run_blocking(&self.socket, move |socket| {
            let mut items = [socket.as_poll_item(zmq::POLLIN)];
            zmq::poll(&mut items, timeout_ms).map_err(zmq_err("poll"))?;
            if !items[0].is_readable() {
                return Ok(None);
            }
            socket.recv_bytes(0).map(Some).map_err(zmq_err("recv"))
        })
        .await?;

        match received {
            None => Ok(None),
            Some(bytes) => {
                // REP must answer whatever it read, even garbage
                self.awaiting_reply.store(true, Ordering::Release);
                decode(&bytes).map(Some)
            }
        }
    }

    async fn reply(&self, message: Message) -> Result<(), LinkError> {
        if !self.awaiting_reply.load(Ordering::Acquire) {
            return Err(LinkError::State("no request awaiting a reply".into()));
        }

        let bytes = encode(&message)?;
        run_blocking(&self.socket, move |socket| {
            socket.send(bytes, 0).map_err(zmq_err("reply"))
        })
        .await?;
        self.awaiting_reply.store(false, Ordering::Release);
        Ok(())
    }
}

/// Connects clients to a ZeroMQ coordinator.
#[derive(Debug, Clone)]
pub struct ZmqConnector {
    config: TransportConfig,
}

impl ZmqConnector {
    /// Creates a connector for the given coordinator address.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for ZmqConnector {
    type Receiver = ZmqSubscriber;
    type Client = ZmqRequester;

    async fn connect(&self) -> Result<(ZmqSubscriber, ZmqRequester), LinkError> {
        let context = zmq::Context::new();

        let request_endpoint = self.config.request_endpoint();
        let req = context.socket(zmq::REQ).map_err(zmq_err("create REQ"))?;
        req.set_rcvtimeo(RECV_SLICE_MS).map_err(zmq_err("set REQ timeout"))?;
        req.connect(&request_endpoint).map_err(connect_err(&request_endpoint))?;

        let broadcast_endpoint = self.config.broadcast_endpoint();
        let sub = context.socket(zmq::SUB).map_err(zmq_err("create SUB"))?;
        sub.set_rcvtimeo(RECV_SLICE_MS).map_err(zmq_err("set SUB timeout"))?;
        sub.connect(&broadcast_endpoint).map_err(connect_err(&broadcast_endpoint))?;
        sub.set_subscribe(b"").map_err(zmq_err("subscribe"))?;

        Ok((
            ZmqSubscriber {
                socket: Arc::new(Mutex::new(sub)),
                _context: context.clone(),
            },
            ZmqRequester {
                socket: Arc::new(Mutex::new(req)),
                in_flight: tokio::sync::Mutex::new(()),
                _context: context,
            },
        ))
    }
}

/// Client broadcast endpoint (SUB socket).
pub struct ZmqSubscriber {
    socket: SharedSocket,
    _context: zmq::Context,
}

#[async_trait]
impl BroadcastReceiver for ZmqSubscriber {
    async fn receive(&self) -> Result<Message, LinkError> {
        loop {
            if let Some(bytes) = run_blocking(&self.socket, try_recv).await? {
                return decode(&bytes);
            }
        }
    }
}

/// Client request endpoint (REQ socket).
pub struct ZmqRequester {
    socket: SharedSocket,
    in_flight: tokio::sync::Mutex<()>,
    _context: zmq::Context,
}

#[async_trait]
impl RequestClient for ZmqRequester {
    async fn request(&self, message: Message) -> Result<Message, LinkError> {
        let _turn = self.in_flight.lock().await;

        let bytes = encode(&message)?;
        run_blocking(&self.socket, move |socket| {
            socket.send(bytes, 0).map_err(zmq_err("request"))
        })
        .await?;

        loop {
            if let Some(bytes) = run_blocking(&self.socket, try_recv).await? {
                return decode(&bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let config = TransportConfig::default().with_ports(24550, 24551);
        let (publisher, replier) = ZmqBinding::bind(&config).unwrap();
        let (subscriber, requester) = ZmqConnector::new(config).connect().await.unwrap();

        let client = tokio::spawn(async move {
            let ack = requester.request(Message::SyncReply { ready: true }).await.unwrap();
            (ack, subscriber)
        });

        let mut request = None;
        for _ in 0..20 {
            request = replier.poll(Duration::from_millis(250)).await.unwrap();
            if request.is_some() {
                break;
            }
        }
        assert_eq!(request, Some(Message::SyncReply { ready: true }));
        replier.reply(Message::Ack).await.unwrap();

        let (ack, subscriber) = client.await.unwrap();
        assert_eq!(ack, Message::Ack);

        // SUB needs a moment to join; keep publishing until it sees one
        let received = loop {
            publisher.send(Message::Run).await.unwrap();
            if let Ok(Ok(message)) = tokio::time::timeout(Duration::from_millis(300), subscriber.receive()).await {
                break message;
            }
        };
        assert_eq!(received, Message::Run);
    }
}
