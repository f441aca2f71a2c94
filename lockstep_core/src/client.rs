//! Client Agent - one simulation client's side of the lockstep protocol.
//!
//! # Lifecycle
//!
//! ```text
//! ┌────────────┐ synchronize() ┌───────────────┐ ack  ┌─────────────┐
//! │ Connecting │──────────────►│ Synchronizing │─────►│ AwaitingRun │◄──┐
//! └────────────┘               └───────────────┘      └──────┬──────┘   │
//!                                                await_run() │ run      │ send_report()
//!                                                            ▼          │
//!                                                     ┌─────────────┐   │
//!                                                     │  Reporting  │───┘
//!                                                     └─────────────┘
//! ```
//!
//! Between `await_run` and `send_report` the caller executes one step of
//! its own simulation. The protocol has no stop message; a client stops
//! when its shutdown signal fires or its process ends.
//!
//! # Usage
//!
//! ```ignore
//! let mut agent = ClientAgent::connect(ClientId::new(), &address).await?;
//! agent.synchronize().await?;
//! loop {
//!     let telemetry = agent.await_run().await?;
//!     let parts = sim.step(&telemetry);
//!     agent.send_report(parts).await?;
//! }
//! ```

use crate::error::ClientError;
use crate::observer::{NullObserver, TelemetryObserver};
use crate::report::ReportBurst;
use lockstep_env::{BroadcastReceiver, ClientId, Connector, Message, Payload, RequestClient, ShutdownSignal};
use tracing::{debug, info, trace, warn};

/// Protocol position of a client agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Endpoints established, barrier not yet entered
    Connecting,
    /// Waiting for a `SyncRequest` or for its acknowledgement
    Synchronizing,
    /// Draining telemetry until the next `Run`
    AwaitingRun,
    /// `Run` received; stepping and sending the report burst
    Reporting,
    /// Endpoints released
    Closed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClientState::Connecting => "connecting",
            ClientState::Synchronizing => "synchronizing",
            ClientState::AwaitingRun => "awaiting run",
            ClientState::Reporting => "reporting",
            ClientState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A simulation client participating in a lockstep session.
///
/// Generic over the broadcast and request endpoints, so the same agent runs
/// over the in-memory transport or over ZeroMQ sockets.
pub struct ClientAgent<R, C>
where
    R: BroadcastReceiver,
    C: RequestClient,
{
    id: ClientId,
    receiver: R,
    requester: C,
    state: ClientState,

    /// `Run` signals received so far
    step: u64,

    observer: Box<dyn TelemetryObserver>,
    shutdown: ShutdownSignal,
}

impl<R, C> ClientAgent<R, C>
where
    R: BroadcastReceiver,
    C: RequestClient,
{
    /// Creates an agent over already-established endpoints.
    pub fn new(id: ClientId, receiver: R, requester: C) -> Self {
        Self {
            id,
            receiver,
            requester,
            state: ClientState::Connecting,
            step: 0,
            observer: Box::new(NullObserver),
            shutdown: ShutdownSignal::never(),
        }
    }

    /// Establishes both endpoints through `connector`.
    ///
    /// # Returns
    /// * `Err(ClientError::Connection)` - The coordinator cannot be reached
    pub async fn connect<K>(id: ClientId, connector: &K) -> Result<Self, ClientError>
    where
        K: Connector<Receiver = R, Client = C>,
    {
        let (receiver, requester) = connector.connect().await?;
        info!(client = %id, "Connected to coordinator");
        Ok(Self::new(id, receiver, requester))
    }

    /// Registers the consumer of relayed telemetry.
    pub fn with_observer(mut self, observer: impl TelemetryObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Makes every blocking operation return `Cancelled` once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Number of `Run` signals received.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Waits for the coordinator's barrier and declares readiness.
    ///
    /// Broadcasts other than `SyncRequest` are discarded. Returns once the
    /// coordinator has acknowledged the `SyncReply`.
    pub async fn synchronize(&mut self) -> Result<(), ClientError> {
        self.expect_state("synchronize", &[ClientState::Connecting, ClientState::Synchronizing])?;
        self.state = ClientState::Synchronizing;
        debug!(client = %self.id, "Waiting for sync request");

        loop {
            match receive_broadcast(&self.receiver, &self.shutdown, self.id).await? {
                Message::SyncRequest => break,
                other => debug!(client = %self.id, kind = other.kind(), "Discarding broadcast before barrier"),
            }
        }

        let ack = send_request(&self.requester, &self.shutdown, Message::SyncReply { ready: true }).await?;
        if ack != Message::Ack {
            debug!(client = %self.id, reply = ack.kind(), "Sync reply acknowledged");
        }

        self.state = ClientState::AwaitingRun;
        info!(client = %self.id, "Synchronized");
        Ok(())
    }

    /// Sends this step's report as an ordered burst of parts.
    ///
    /// Each part is a blocking request; the last carries `remaining == 0`.
    ///
    /// # Returns
    /// Number of parts sent.
    pub async fn send_report(&mut self, parts: Vec<Payload>) -> Result<usize, ClientError> {
        self.expect_state("send a report", &[ClientState::Reporting])?;
        let burst = ReportBurst::new(parts).ok_or(ClientError::EmptyReport)?;
        let total = burst.len();

        for (index, part) in burst.enumerate() {
            let want_more = index + 1 < total;
            match send_request(&self.requester, &self.shutdown, part).await? {
                Message::ReportAck { want_more: acked } if acked == want_more => {}
                other => warn!(
                    client = %self.id,
                    part = index,
                    reply = other.kind(),
                    "Unexpected report acknowledgement"
                ),
            }
        }

        self.state = ClientState::AwaitingRun;
        debug!(client = %self.id, step = self.step, parts = total, "Report sent");
        Ok(total)
    }

    /// Drains relayed telemetry until the next `Run`.
    ///
    /// Each payload goes to the registered observer as it arrives.
    ///
    /// # Returns
    /// The payloads received before the `Run`, in arrival order.
    pub async fn await_run(&mut self) -> Result<Vec<Payload>, ClientError> {
        self.expect_state("await run", &[ClientState::AwaitingRun])?;
        let mut telemetry = Vec::new();

        loop {
            match receive_broadcast(&self.receiver, &self.shutdown, self.id).await? {
                Message::Run => break,
                Message::Telemetry { payload } => {
                    self.observer.on_telemetry(self.step, &payload);
                    telemetry.push(payload);
                }
                other => trace!(client = %self.id, kind = other.kind(), "Discarding broadcast"),
            }
        }

        self.step += 1;
        self.state = ClientState::Reporting;
        debug!(client = %self.id, step = self.step, telemetry = telemetry.len(), "Run received");
        Ok(telemetry)
    }

    /// Releases both endpoints.
    pub fn close(mut self) {
        self.state = ClientState::Closed;
        info!(client = %self.id, steps = self.step, "Client closed");
    }

    fn expect_state(&self, operation: &'static str, allowed: &[ClientState]) -> Result<(), ClientError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

/// Receives one broadcast, skipping undecodable ones.
async fn receive_broadcast<R: BroadcastReceiver>(
    receiver: &R,
    shutdown: &ShutdownSignal,
    id: ClientId,
) -> Result<Message, ClientError> {
    let mut shutdown = shutdown.clone();
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => return Err(ClientError::Cancelled),
            received = receiver.receive() => received,
        };

        match received {
            Ok(message) => return Ok(message),
            Err(e) if e.is_recoverable() => warn!(client = %id, error = %e, "Discarding broadcast"),
            Err(e) => return Err(e.into()),
        }
    }
}

async fn send_request<C: RequestClient>(
    requester: &C,
    shutdown: &ShutdownSignal,
    message: Message,
) -> Result<Message, ClientError> {
    let mut shutdown = shutdown.clone();
    tokio::select! {
        _ = shutdown.cancelled() => Err(ClientError::Cancelled),
        reply = requester.request(message) => Ok(reply?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_env::{
        memory_link, shutdown_channel, BroadcastSender, MemoryAddress, MemoryPublisher, MemoryReplier,
        MemoryRequester, MemorySubscriber, RequestServer,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type MemoryAgent = ClientAgent<MemorySubscriber, MemoryRequester>;

    async fn setup() -> (MemoryPublisher, MemoryReplier, MemoryAddress, MemoryAgent) {
        let (publisher, replier, address) = memory_link(16);
        let agent = ClientAgent::connect(ClientId::from_seed(1), &address).await.unwrap();
        (publisher, replier, address, agent)
    }

    /// Answers one request the way a coordinator would.
    async fn answer(replier: &MemoryReplier, reply: Message) -> Message {
        let request = replier
            .poll(Duration::from_secs(5))
            .await
            .unwrap()
            .expect("client should have sent a request");
        replier.reply(reply).await.unwrap();
        request
    }

    /// Drives an agent through the barrier and the first run.
    async fn reporting_agent(publisher: &MemoryPublisher, replier: &MemoryReplier, agent: &mut MemoryAgent) {
        publisher.send(Message::SyncRequest).await.unwrap();
        let (synced, _) = tokio::join!(agent.synchronize(), answer(replier, Message::Ack));
        synced.unwrap();

        publisher.send(Message::Run).await.unwrap();
        agent.await_run().await.unwrap();
        assert_eq!(agent.state(), ClientState::Reporting);
    }

    #[tokio::test]
    async fn test_synchronize_discards_everything_before_sync_request() {
        let (publisher, replier, _address, mut agent) = setup().await;
        assert_eq!(agent.state(), ClientState::Connecting);

        publisher.send(Message::Telemetry { payload: Payload::new(json!(1)) }).await.unwrap();
        publisher.send(Message::Run).await.unwrap();
        publisher.send(Message::SyncRequest).await.unwrap();

        let (synced, request) = tokio::join!(agent.synchronize(), answer(&replier, Message::Ack));
        synced.unwrap();

        assert_eq!(request, Message::SyncReply { ready: true });
        assert_eq!(agent.state(), ClientState::AwaitingRun);
        assert_eq!(agent.step(), 0);
    }

    #[tokio::test]
    async fn test_sync_ack_may_be_any_reply() {
        let (publisher, replier, _address, mut agent) = setup().await;
        publisher.send(Message::SyncRequest).await.unwrap();

        let (synced, _) = tokio::join!(agent.synchronize(), answer(&replier, Message::ReportAck { want_more: false }));
        synced.unwrap();
        assert_eq!(agent.state(), ClientState::AwaitingRun);
    }

    #[tokio::test]
    async fn test_send_report_counts_down_in_order() {
        let (publisher, replier, _address, mut agent) = setup().await;
        reporting_agent(&publisher, &replier, &mut agent).await;

        let parts = vec![
            Payload::new(json!({"part": "a"})),
            Payload::new(json!({"part": "b"})),
            Payload::new(json!({"part": "c"})),
        ];
        let coordinator = async {
            let mut received = Vec::new();
            for want_more in [true, true, false] {
                received.push(answer(&replier, Message::ReportAck { want_more }).await);
            }
            received
        };
        let (sent, received) = tokio::join!(agent.send_report(parts), coordinator);

        assert_eq!(sent.unwrap(), 3);
        assert_eq!(
            received,
            vec![
                Message::Report { remaining: 2, payload: Payload::new(json!({"part": "a"})) },
                Message::Report { remaining: 1, payload: Payload::new(json!({"part": "b"})) },
                Message::Report { remaining: 0, payload: Payload::new(json!({"part": "c"})) },
            ]
        );
        assert_eq!(agent.state(), ClientState::AwaitingRun);
    }

    #[tokio::test]
    async fn test_single_part_report_is_terminal() {
        let (publisher, replier, _address, mut agent) = setup().await;
        reporting_agent(&publisher, &replier, &mut agent).await;

        let (sent, request) = tokio::join!(
            agent.send_report(vec![Payload::new(json!("only"))]),
            answer(&replier, Message::ReportAck { want_more: false })
        );
        assert_eq!(sent.unwrap(), 1);
        assert!(matches!(request, Message::Report { remaining: 0, .. }));
    }

    #[tokio::test]
    async fn test_empty_report_is_rejected() {
        let (publisher, replier, _address, mut agent) = setup().await;
        reporting_agent(&publisher, &replier, &mut agent).await;

        let err = agent.send_report(Vec::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyReport));
        assert_eq!(agent.state(), ClientState::Reporting);
    }

    #[tokio::test]
    async fn test_await_run_delivers_telemetry_to_observer() {
        let (publisher, replier, address) = memory_link(16);
        let seen: Arc<Mutex<Vec<(u64, Payload)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut agent = ClientAgent::connect(ClientId::from_seed(2), &address)
            .await
            .unwrap()
            .with_observer(move |step: u64, payload: &Payload| {
                sink.lock().unwrap().push((step, payload.clone()));
            });

        reporting_agent(&publisher, &replier, &mut agent).await;
        let (sent, _) = tokio::join!(
            agent.send_report(vec![Payload::new(json!("mine"))]),
            answer(&replier, Message::ReportAck { want_more: false })
        );
        sent.unwrap();

        publisher.send(Message::Telemetry { payload: Payload::new(json!("a")) }).await.unwrap();
        publisher.send(Message::SyncRequest).await.unwrap();
        publisher.send(Message::Telemetry { payload: Payload::new(json!("b")) }).await.unwrap();
        publisher.send(Message::Run).await.unwrap();

        let telemetry = agent.await_run().await.unwrap();
        assert_eq!(telemetry, vec![Payload::new(json!("a")), Payload::new(json!("b"))]);
        assert_eq!(agent.step(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, Payload::new(json!("a"))), (1, Payload::new(json!("b")))]
        );
    }

    #[tokio::test]
    async fn test_operations_out_of_order_are_rejected() {
        let (_publisher, _replier, _address, mut agent) = setup().await;

        let err = agent.send_report(vec![Payload::new(json!(1))]).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidState { operation: "send a report", state: ClientState::Connecting }
        ));

        let err = agent.await_run().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidState { state: ClientState::Connecting, .. }));
        assert_eq!(err.to_string(), "Cannot await run while connecting");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_blocked_synchronize() {
        let (_publisher, _replier, address) = memory_link(16);
        let (trigger, signal) = shutdown_channel();
        let mut agent = ClientAgent::connect(ClientId::from_seed(3), &address)
            .await
            .unwrap()
            .with_shutdown(signal);

        let blocked = tokio::spawn(async move {
            let result = agent.synchronize().await;
            (result, agent.state())
        });
        tokio::task::yield_now().await;
        trigger.trigger();

        let (result, state) = blocked.await.unwrap();
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(state, ClientState::Synchronizing);
    }

    #[tokio::test]
    async fn test_connect_to_unbound_coordinator() {
        let (publisher, replier, address) = memory_link(16);
        drop(publisher);
        drop(replier);

        let result = MemoryAgent::connect(ClientId::from_seed(4), &address).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_coordinator_gone_surfaces_link_error() {
        let (publisher, replier, address, mut agent) = setup().await;
        drop(publisher);
        drop(replier);
        drop(address);

        let err = agent.synchronize().await.unwrap_err();
        assert!(matches!(err, ClientError::Link(lockstep_env::LinkError::Closed)));
    }

    #[tokio::test]
    async fn test_close_releases_subscription() {
        let (publisher, _replier, _address, agent) = setup().await;
        assert_eq!(publisher.receiver_count(), 1);

        agent.close();
        publisher.send(Message::Run).await.unwrap();
        assert_eq!(publisher.receiver_count(), 0);
    }
}
