//! Session runner - drives a coordinator and its clients in one process.

use crate::client::{drive_client, ClientOutcome, ClientPlan};
use crate::error::SimError;
use crate::exporter::{FrameRecorder, SessionExport};
use crate::scenarios::ScenarioId;

use lockstep_core::{Coordinator, CoordinatorConfig, NullObserver, SessionStats};
use lockstep_env::{memory_link, shutdown_channel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra intent parts per report in the multi-part scenario
const MULTI_PART_MAX_EXTRA: usize = 3;

/// Barrier re-broadcasts the late joiner sits out
const LATE_JOIN_POLLS: u32 = 3;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether every lockstep check held
    pub passed: bool,

    /// Steps every client finished
    pub steps_completed: u64,

    /// Coordinator counters at shutdown
    pub stats: SessionStats,

    /// Per-client record
    pub outcomes: Vec<ClientOutcome>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Telemetry as seen by the first client
    pub export: SessionExport,
}

/// Runs lockstep sessions over the in-memory transport.
#[derive(Debug, Clone)]
pub struct SessionRunner {
    seed: u64,
    num_clients: usize,

    /// Steps each client reports
    steps: u64,

    /// Simulated seconds per step
    dt: f64,

    poll_timeout: Duration,
}

impl SessionRunner {
    /// Creates a new runner.
    pub fn new(seed: u64, num_clients: usize) -> Self {
        Self {
            seed,
            num_clients,
            steps: 10,
            dt: 0.1,
            poll_timeout: Duration::from_millis(100),
        }
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Sets the coordinator's poll timeout (the barrier re-broadcast period).
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Builds the client plans for a scenario.
    pub fn plans(&self, scenario: ScenarioId) -> Vec<ClientPlan> {
        (0..self.num_clients)
            .map(|index| {
                let plan = ClientPlan::new(index, self.seed)
                    .with_steps(Some(self.steps))
                    .with_dt(self.dt);

                match scenario {
                    ScenarioId::Lockstep => plan,
                    ScenarioId::LateJoiner if index + 1 == self.num_clients => {
                        plan.with_join_delay(self.poll_timeout * LATE_JOIN_POLLS)
                    }
                    ScenarioId::LateJoiner => plan,
                    ScenarioId::MultiPart => plan.with_extra_parts(MULTI_PART_MAX_EXTRA),
                }
            })
            .collect()
    }

    /// Runs a scenario to completion.
    ///
    /// # Returns
    /// * `Ok(result)` - The session ran; `result.passed` says whether it held lockstep
    /// * `Err(SimError)` - A client or the coordinator failed
    pub async fn run(&self, scenario: ScenarioId) -> Result<SessionResult, SimError> {
        info!(
            "Running scenario: {} (seed={}, clients={}, steps={})",
            scenario.name(),
            self.seed,
            self.num_clients,
            self.steps
        );

        let (publisher, replier, address) = memory_link(self.num_clients.max(1) * 4);
        let config = CoordinatorConfig::new(self.num_clients).with_poll_timeout(self.poll_timeout);
        let mut coordinator = Coordinator::new(config, publisher, replier)?;

        let (trigger, signal) = shutdown_channel();
        let trigger = Arc::new(trigger);

        // A failed coordinator releases the clients blocked on it
        let coordinator_task = {
            let trigger = Arc::clone(&trigger);
            tokio::spawn(async move {
                let result = coordinator.run(signal).await;
                if result.is_err() {
                    trigger.trigger();
                }
                result
            })
        };

        let recorder = FrameRecorder::new();
        let mut handles = Vec::with_capacity(self.num_clients);
        for plan in self.plans(scenario) {
            let address = address.clone();
            let shutdown = trigger.signal();
            let recorder = (plan.index == 0).then(|| recorder.clone());

            handles.push(tokio::spawn(async move {
                match recorder {
                    Some(recorder) => drive_client(&address, &plan, recorder, shutdown).await,
                    None => drive_client(&address, &plan, NullObserver, shutdown).await,
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut failure: Option<SimError> = None;
        for handle in handles {
            let joined = handle.await.map_err(SimError::from).and_then(|result| result);
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!("Client failed: {}", e);
                    trigger.trigger();
                    failure.get_or_insert(e);
                }
            }
        }

        trigger.trigger();
        let stats = coordinator_task.await??;
        if let Some(e) = failure {
            return Err(e);
        }

        let mut export = SessionExport::new(scenario.name(), self.seed, self.num_clients);
        for frame in recorder.take_frames() {
            export.add_frame(frame);
        }

        let failure_reason = self.check(&stats, &outcomes).err();
        let passed = failure_reason.is_none();
        export.finalize(passed);

        let steps_completed = outcomes
            .iter()
            .map(|outcome| outcome.steps_completed() as u64)
            .min()
            .unwrap_or(0);
        debug!(?stats, steps_completed, "Session finished");

        Ok(SessionResult {
            scenario,
            seed: self.seed,
            passed,
            steps_completed,
            stats,
            outcomes,
            failure_reason,
            export,
        })
    }

    /// Verifies the session stayed in lockstep.
    fn check(&self, stats: &SessionStats, outcomes: &[ClientOutcome]) -> Result<(), String> {
        if outcomes.len() != self.num_clients {
            return Err(format!("{} of {} clients finished", outcomes.len(), self.num_clients));
        }

        for outcome in outcomes {
            if outcome.steps_completed() as u64 != self.steps {
                return Err(format!(
                    "{} completed {} of {} steps",
                    outcome.name,
                    outcome.steps_completed(),
                    self.steps
                ));
            }
        }

        // Every client must see every part of every report before the next run
        for step in 0..self.steps as usize {
            let expected: usize = outcomes.iter().map(|outcome| outcome.parts_sent[step]).sum();
            for outcome in outcomes {
                let received = outcome.telemetry_received[step];
                if received != expected {
                    return Err(format!(
                        "{} received {} of {} telemetry payloads in step {}",
                        outcome.name,
                        received,
                        expected,
                        step + 1
                    ));
                }
            }
        }

        let total_parts: usize = outcomes.iter().flat_map(|outcome| &outcome.parts_sent).sum();
        if stats.telemetry_relayed != total_parts as u64 {
            return Err(format!(
                "coordinator relayed {} payloads, clients sent {}",
                stats.telemetry_relayed, total_parts
            ));
        }

        let expected_reports = self.steps * self.num_clients as u64;
        if stats.reports_completed != expected_reports {
            return Err(format!(
                "coordinator completed {} reports, expected {}",
                stats.reports_completed, expected_reports
            ));
        }

        // The run that follows the last collection is also counted
        if stats.cycles_started != self.steps + 1 {
            return Err(format!(
                "coordinator started {} cycles, expected {}",
                stats.cycles_started,
                self.steps + 1
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_joiner_plan_delays_last_client() {
        let runner = SessionRunner::new(1, 3).with_poll_timeout(Duration::from_millis(50));
        let plans = runner.plans(ScenarioId::LateJoiner);

        assert_eq!(plans.len(), 3);
        assert!(plans[0].join_delay.is_none());
        assert!(plans[1].join_delay.is_none());
        assert_eq!(plans[2].join_delay, Some(Duration::from_millis(150)));
    }

    #[test]
    fn test_multi_part_plan_allows_extra_parts() {
        let runner = SessionRunner::new(1, 2);
        assert!(runner.plans(ScenarioId::MultiPart).iter().all(|plan| plan.max_extra_parts > 0));
        assert!(runner.plans(ScenarioId::Lockstep).iter().all(|plan| plan.max_extra_parts == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockstep_scenario_passes() {
        let runner = SessionRunner::new(42, 3).with_steps(5);
        let result = runner.run(ScenarioId::Lockstep).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.steps_completed, 5);
        assert_eq!(result.stats.cycles_started, 6);
        assert_eq!(result.stats.telemetry_relayed, 15);

        // First client sees every report of every step
        assert_eq!(result.export.frames.len(), 5);
        assert!(result.export.frames.iter().all(|frame| frame.telemetry.len() == 3));
        assert_eq!(result.export.frames[0].step, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_scenario_passes() {
        let runner = SessionRunner::new(7, 3).with_steps(3);
        let result = runner.run(ScenarioId::LateJoiner).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.outcomes.iter().all(|outcome| outcome.steps_completed() == 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_part_scenario_passes() {
        let runner = SessionRunner::new(11, 2).with_steps(8);
        let result = runner.run(ScenarioId::MultiPart).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        let total_parts: usize = result
            .outcomes
            .iter()
            .flat_map(|outcome| outcome.parts_sent.iter())
            .sum();
        assert_eq!(result.stats.telemetry_relayed, total_parts as u64);
        assert_eq!(result.stats.reports_completed, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_telemetry() {
        let first = SessionRunner::new(99, 2).with_steps(3).run(ScenarioId::Lockstep).await.unwrap();
        let second = SessionRunner::new(99, 2).with_steps(3).run(ScenarioId::Lockstep).await.unwrap();

        // Arrival order between clients may differ; the set per step may not
        for (a, b) in first.export.frames.iter().zip(&second.export.frames) {
            let mut a: Vec<String> = a.telemetry.iter().map(|v| v.to_string()).collect();
            let mut b: Vec<String> = b.telemetry.iter().map(|v| v.to_string()).collect();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn test_zero_clients_is_rejected() {
        let result = SessionRunner::new(1, 0).run(ScenarioId::Lockstep).await;
        assert!(matches!(result, Err(SimError::Coordinator(_))));
    }
}
