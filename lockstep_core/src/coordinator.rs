//! Coordinator - the barrier and report-aggregation authority.
//!
//! # Cycle
//!
//! ```text
//!  ┌──────────────────── Barrier ────────────────────┐
//!  │ broadcast sync_req ─► poll ─► sync_rep? ack, +1 │◄─┐ timeout: re-broadcast
//!  └───────────────┬─────────────────────────────────┘──┘
//!                  │ synced == expected
//!                  ▼
//!  ┌──────────── broadcast run, completed = 0 ───────┐◄────────────┐
//!  └───────────────┬─────────────────────────────────┘             │
//!                  ▼                                               │
//!  ┌─────────────────── Collection ──────────────────┐             │
//!  │ poll ─► report? ack, relay as telemetry,         │             │
//!  │                 remaining == 0 ⇒ completed += 1 │─────────────┘
//!  └─────────────────────────────────────────────────┘ completed == expected
//! ```
//!
//! A client that never sends its `remaining == 0` part stalls the cycle;
//! nothing times it out.

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::session::{SessionState, SessionStats};
use lockstep_env::{BroadcastSender, LinkError, Message, RequestServer, ShutdownSignal};
use tracing::{debug, info, warn};

/// Which counter currently gates the next `Run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Counting `SyncReply` messages
    Barrier,
    /// Counting completed report bursts
    Collecting,
}

/// Drives one lockstep session over injected channel endpoints.
pub struct Coordinator<B, S>
where
    B: BroadcastSender,
    S: RequestServer,
{
    config: CoordinatorConfig,
    broadcaster: B,
    requests: S,
    session: SessionState,
    stats: SessionStats,
    phase: Phase,
}

impl<B, S> Coordinator<B, S>
where
    B: BroadcastSender,
    S: RequestServer,
{
    /// Creates a coordinator.
    ///
    /// # Returns
    /// * `Err(CoordinatorError::InvalidConfig)` - No clients expected, or a zero poll timeout
    pub fn new(config: CoordinatorConfig, broadcaster: B, requests: S) -> Result<Self, CoordinatorError> {
        if config.expected_clients == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "expected_clients must be at least 1".into(),
            ));
        }
        if config.poll_timeout.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "poll_timeout must be non-zero".into(),
            ));
        }

        Ok(Self {
            session: SessionState::new(config.expected_clients),
            config,
            broadcaster,
            requests,
            stats: SessionStats::default(),
            phase: Phase::Barrier,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the full lifecycle until `shutdown` fires.
    ///
    /// # Returns
    /// * `Ok(stats)` - Shutdown was requested
    /// * `Err(CoordinatorError::Link)` - A channel failed beyond recovery
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<SessionStats, CoordinatorError> {
        info!(
            expected_clients = self.config.expected_clients,
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "Starting coordinator"
        );

        // drive() only ever returns with an error
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => Ok(()),
            result = self.drive() => result,
        };

        outcome?;
        info!(cycles = self.stats.cycles_started, "Shutdown requested");
        Ok(self.stats.clone())
    }

    async fn drive(&mut self) -> Result<(), CoordinatorError> {
        self.synchronize_clients().await?;
        loop {
            self.start_cycle().await?;
            self.collect_reports().await?;
        }
    }

    async fn synchronize_clients(&mut self) -> Result<(), CoordinatorError> {
        self.phase = Phase::Barrier;

        while !self.session.barrier_complete() {
            debug!(waiting_for = self.session.waiting_for(), "Waiting for clients");
            // Re-sent every poll so clients that joined late still see one
            self.broadcaster.send(Message::SyncRequest).await?;

            if let Some(request) = self.next_request().await? {
                self.dispatch(request).await?;
            }
        }

        info!(clients = self.session.synced_count(), "All clients synchronized");
        Ok(())
    }

    async fn start_cycle(&mut self) -> Result<(), CoordinatorError> {
        self.phase = Phase::Collecting;
        self.broadcaster.send(Message::Run).await?;
        self.session.begin_cycle();
        self.stats.cycles_started += 1;
        debug!(cycle = self.stats.cycles_started, "Run broadcast");
        Ok(())
    }

    async fn collect_reports(&mut self) -> Result<(), CoordinatorError> {
        while !self.session.cycle_complete() {
            if let Some(request) = self.next_request().await? {
                self.dispatch(request).await?;
            }
        }
        Ok(())
    }

    /// Polls once. `None` covers both timeouts and answered garbage.
    async fn next_request(&mut self) -> Result<Option<Message>, CoordinatorError> {
        match self.requests.poll(self.config.poll_timeout).await {
            Ok(request) => Ok(request),
            Err(LinkError::Codec(reason)) => {
                warn!(%reason, "Malformed request");
                self.stats.ignored_requests += 1;
                self.respond(Message::Ack).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn dispatch(&mut self, request: Message) -> Result<(), CoordinatorError> {
        match (self.phase, request) {
            (Phase::Barrier, Message::SyncReply { ready: true }) => {
                self.respond(Message::Ack).await?;
                self.session.record_sync();
                info!(
                    synced = self.session.synced_count(),
                    expected = self.session.expected_clients(),
                    "Client synchronized"
                );
            }
            (Phase::Collecting, Message::Report { remaining, payload }) => {
                self.respond(Message::ReportAck { want_more: remaining != 0 }).await?;
                self.broadcaster.send(Message::Telemetry { payload }).await?;
                self.stats.telemetry_relayed += 1;

                if remaining == 0 {
                    self.session.record_completion();
                    self.stats.reports_completed += 1;
                    debug!(
                        completed = self.session.completed_count(),
                        expected = self.session.expected_clients(),
                        "Report complete"
                    );
                }
            }
            (Phase::Barrier, Message::Report { remaining, .. }) => {
                // No cycle is running yet; keep the sender moving, drop the data
                self.respond(Message::ReportAck { want_more: remaining != 0 }).await?;
                self.stats.ignored_requests += 1;
                warn!(remaining, "Report before barrier completed, dropped");
            }
            (phase, other) => {
                self.respond(Message::Ack).await?;
                self.stats.ignored_requests += 1;
                warn!(?phase, kind = other.kind(), "Ignoring unexpected request");
            }
        }
        Ok(())
    }

    async fn respond(&self, reply: Message) -> Result<(), CoordinatorError> {
        match self.requests.reply(reply).await {
            Err(LinkError::PeerDisconnected) => {
                warn!("Requester disconnected before reply");
                Ok(())
            }
            other => Ok(other?),
        }
    }
}
