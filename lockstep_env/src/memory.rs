//! In-process transport backed by tokio channels.
//!
//! Used by the simulation harness and by tests. Broadcast fan-out keeps one
//! unbounded queue per subscriber, so a slow client never loses messages.

use async_trait::async_trait;
use crate::channel::{BroadcastReceiver, BroadcastSender, Connector, RequestClient, RequestServer};
use crate::error::LinkError;
use crate::message::Message;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>;

/// A request in flight, with the slot its reply goes into.
#[derive(Debug)]
struct PendingRequest {
    message: Message,
    responder: oneshot::Sender<Message>,
}

/// Creates an in-memory coordinator link.
///
/// `capacity` bounds the shared request queue (clients block on `request`
/// when it is full).
///
/// # Returns
/// The coordinator's broadcast and request endpoints, and the address
/// clients connect through.
pub fn memory_link(capacity: usize) -> (MemoryPublisher, MemoryReplier, MemoryAddress) {
    let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
    let (request_tx, request_rx) = mpsc::channel(capacity.max(1));

    let publisher = MemoryPublisher {
        subscribers: Arc::clone(&subscribers),
    };
    let replier = MemoryReplier {
        rx: tokio::sync::Mutex::new(request_rx),
        pending: Mutex::new(None),
    };
    let address = MemoryAddress {
        subscribers,
        request_tx,
    };

    (publisher, replier, address)
}

/// Broadcast endpoint of an in-memory link.
pub struct MemoryPublisher {
    subscribers: Subscribers,
}

impl MemoryPublisher {
    /// Number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BroadcastSender for MemoryPublisher {
    async fn send(&self, message: Message) -> Result<(), LinkError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| LinkError::transport("subscriber list poisoned"))?;

        // Receivers that hung up are pruned on the way
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }
}

/// Request endpoint of an in-memory link.
pub struct MemoryReplier {
    rx: tokio::sync::Mutex<mpsc::Receiver<PendingRequest>>,
    pending: Mutex<Option<oneshot::Sender<Message>>>,
}

impl MemoryReplier {
    fn pending_slot(&self) -> Result<std::sync::MutexGuard<'_, Option<oneshot::Sender<Message>>>, LinkError> {
        self.pending
            .lock()
            .map_err(|_| LinkError::transport("pending reply slot poisoned"))
    }
}

#[async_trait]
impl RequestServer for MemoryReplier {
    async fn poll(&self, timeout: Duration) -> Result<Option<Message>, LinkError> {
        if self.pending_slot()?.is_some() {
            return Err(LinkError::State("previous request not answered".into()));
        }

        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(LinkError::Closed),
            Ok(Some(request)) => {
                *self.pending_slot()? = Some(request.responder);
                Ok(Some(request.message))
            }
        }
    }

    async fn reply(&self, message: Message) -> Result<(), LinkError> {
        let responder = self
            .pending_slot()?
            .take()
            .ok_or_else(|| LinkError::State("no request awaiting a reply".into()))?;

        responder
            .send(message)
            .map_err(|_| LinkError::PeerDisconnected)
    }
}

/// Where clients find an in-memory coordinator.
#[derive(Clone)]
pub struct MemoryAddress {
    subscribers: Subscribers,
    request_tx: mpsc::Sender<PendingRequest>,
}

#[async_trait]
impl Connector for MemoryAddress {
    type Receiver = MemorySubscriber;
    type Client = MemoryRequester;

    async fn connect(&self) -> Result<(MemorySubscriber, MemoryRequester), LinkError> {
        if self.request_tx.is_closed() {
            return Err(LinkError::connection("coordinator is not bound"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .map_err(|_| LinkError::transport("subscriber list poisoned"))?
            .push(tx);

        let subscriber = MemorySubscriber {
            rx: tokio::sync::Mutex::new(rx),
        };
        let requester = MemoryRequester {
            tx: self.request_tx.clone(),
            in_flight: tokio::sync::Mutex::new(()),
        };
        Ok((subscriber, requester))
    }
}

/// Client broadcast endpoint of an in-memory link.
pub struct MemorySubscriber {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl MemorySubscriber {
    /// Returns the next queued message without waiting.
    pub fn try_receive(&self) -> Option<Message> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl BroadcastReceiver for MemorySubscriber {
    async fn receive(&self) -> Result<Message, LinkError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(LinkError::Closed)
    }
}

/// Client request endpoint of an in-memory link.
pub struct MemoryRequester {
    tx: mpsc::Sender<PendingRequest>,
    in_flight: tokio::sync::Mutex<()>,
}

#[async_trait]
impl RequestClient for MemoryRequester {
    async fn request(&self, message: Message) -> Result<Message, LinkError> {
        let _turn = self.in_flight.lock().await;

        let (responder, reply) = oneshot::channel();
        self.tx
            .send(PendingRequest { message, responder })
            .await
            .map_err(|_| LinkError::Closed)?;

        reply.await.map_err(|_| LinkError::Closed)
    }
}
