//! Configuration for lockstep participants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Number of clients that must synchronize and report each cycle (default: 2)
    pub expected_clients: usize,

    /// Bounded wait per request-channel poll (default: 1500ms).
    /// During the barrier this is also the `SyncRequest` re-broadcast interval.
    pub poll_timeout: Duration,
}

impl CoordinatorConfig {
    /// Creates a configuration for `expected_clients` clients.
    pub fn new(expected_clients: usize) -> Self {
        Self {
            expected_clients,
            ..Self::default()
        }
    }

    /// Sets the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            expected_clients: 2,
            poll_timeout: Duration::from_millis(1500),
        }
    }
}
