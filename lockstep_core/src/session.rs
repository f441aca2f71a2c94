//! Coordinator-owned session counters.

use serde::{Deserialize, Serialize};

/// Barrier and per-cycle completion counters.
///
/// Both counters stay within `0..=expected_clients`. `synced_count` only
/// ever grows; `completed_count` is reset at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    expected_clients: usize,
    synced_count: usize,
    completed_count: usize,
}

impl SessionState {
    /// Creates a fresh session.
    pub fn new(expected_clients: usize) -> Self {
        Self {
            expected_clients,
            synced_count: 0,
            completed_count: 0,
        }
    }

    pub fn expected_clients(&self) -> usize {
        self.expected_clients
    }

    pub fn synced_count(&self) -> usize {
        self.synced_count
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    /// Counts one ready client. Returns false if the barrier was already full.
    pub fn record_sync(&mut self) -> bool {
        if self.barrier_complete() {
            return false;
        }
        self.synced_count += 1;
        true
    }

    /// Counts one finished report burst. Returns false if the cycle was already full.
    pub fn record_completion(&mut self) -> bool {
        if self.cycle_complete() {
            return false;
        }
        self.completed_count += 1;
        true
    }

    /// True once every expected client has synchronized.
    pub fn barrier_complete(&self) -> bool {
        self.synced_count == self.expected_clients
    }

    /// True once every expected client has finished its report this cycle.
    pub fn cycle_complete(&self) -> bool {
        self.completed_count == self.expected_clients
    }

    /// Resets the completion counter for a new cycle.
    pub fn begin_cycle(&mut self) {
        self.completed_count = 0;
    }

    /// Clients not yet synchronized.
    pub fn waiting_for(&self) -> usize {
        self.expected_clients - self.synced_count
    }
}

/// Counters a coordinator accumulates over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// `Run` broadcasts sent
    pub cycles_started: u64,

    /// Report bursts received in full (`remaining == 0`)
    pub reports_completed: u64,

    /// Report parts relayed as telemetry
    pub telemetry_relayed: u64,

    /// Requests acknowledged but not acted on
    pub ignored_requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_counts_up_to_expected() {
        let mut session = SessionState::new(3);
        assert!(!session.barrier_complete());
        assert_eq!(session.waiting_for(), 3);

        assert!(session.record_sync());
        assert!(session.record_sync());
        assert!(!session.barrier_complete());

        assert!(session.record_sync());
        assert!(session.barrier_complete());

        // Extra replies never push past the expected count
        assert!(!session.record_sync());
        assert_eq!(session.synced_count(), 3);
    }

    #[test]
    fn test_cycle_resets_completion_only() {
        let mut session = SessionState::new(2);
        session.record_sync();
        session.record_sync();

        session.record_completion();
        session.record_completion();
        assert!(session.cycle_complete());
        assert!(!session.record_completion());

        session.begin_cycle();
        assert_eq!(session.completed_count(), 0);
        assert_eq!(session.synced_count(), 2);
        assert!(!session.cycle_complete());
    }
}
