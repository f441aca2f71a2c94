//! Simulated vehicle client.
//!
//! Wraps a [`ClientAgent`] around a [`Vehicle`]: synchronize, then per step
//! integrate the vehicle, report its state and wait for the next run
//! signal. Works over any [`Connector`], so the same loop drives in-memory
//! sessions and ZeroMQ clients.

use crate::error::SimError;
use crate::vehicle::Vehicle;
use lockstep_core::{ClientAgent, ClientError, TelemetryObserver};
use lockstep_env::{BroadcastReceiver, ClientId, Connector, Payload, RequestClient, ShutdownSignal};
use std::time::Duration;
use tracing::{debug, info};

/// Seconds ahead of the state record each extra intent part looks
const INTENT_HORIZON: f64 = 1.0;

/// What one simulated client does during a session.
#[derive(Debug, Clone)]
pub struct ClientPlan {
    pub index: usize,
    pub seed: u64,

    /// Vehicle name (defaults to `uav-<index>`)
    pub label: Option<String>,

    /// Steps to report before closing (`None` runs until cancelled)
    pub steps: Option<u64>,

    /// Simulated seconds per step
    pub dt: f64,

    /// Upper bound on intent parts appended to each report
    pub max_extra_parts: usize,

    /// Wait before connecting
    pub join_delay: Option<Duration>,
}

impl ClientPlan {
    pub fn new(index: usize, seed: u64) -> Self {
        Self {
            index,
            seed,
            label: None,
            steps: Some(10),
            dt: 0.1,
            max_extra_parts: 0,
            join_delay: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.label = Some(name.into());
        self
    }

    pub fn with_steps(mut self, steps: Option<u64>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_extra_parts(mut self, max_extra_parts: usize) -> Self {
        self.max_extra_parts = max_extra_parts;
        self
    }

    pub fn with_join_delay(mut self, delay: Duration) -> Self {
        self.join_delay = Some(delay);
        self
    }

    pub fn name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("uav-{}", self.index),
        }
    }

    /// Per-client seed derived from the session seed.
    pub fn vehicle_seed(&self) -> u64 {
        self.seed
            .wrapping_add((self.index as u64 + 1).wrapping_mul(0x9e3779b97f4a7c15))
    }
}

/// What a client did during its session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOutcome {
    pub name: String,

    /// Report parts sent, per step
    pub parts_sent: Vec<usize>,

    /// Telemetry payloads received, per step
    pub telemetry_received: Vec<usize>,
}

impl ClientOutcome {
    pub fn steps_completed(&self) -> usize {
        self.telemetry_received.len()
    }
}

/// Builds this step's report: the state record, then any intent parts.
pub fn report_parts(vehicle: &mut Vehicle, max_extra_parts: usize) -> Result<Vec<Payload>, ClientError> {
    let extra = vehicle.draw_extra_parts(max_extra_parts);
    let mut parts = Vec::with_capacity(extra + 1);
    parts.push(Payload::from_serialize(&vehicle.telemetry())?);

    for k in 1..=extra {
        let intent = vehicle.intent(INTENT_HORIZON * k as f64);
        parts.push(Payload::from_serialize(&intent)?);
    }
    Ok(parts)
}

/// Runs one client to completion.
///
/// Cancellation through `shutdown` ends the client cleanly; the outcome
/// then covers the steps finished so far.
pub async fn drive_client<K, O>(
    connector: &K,
    plan: &ClientPlan,
    observer: O,
    shutdown: ShutdownSignal,
) -> Result<ClientOutcome, SimError>
where
    K: Connector,
    O: TelemetryObserver + 'static,
{
    if let Some(delay) = plan.join_delay {
        debug!(client = plan.index, ?delay, "Delaying join");
        tokio::time::sleep(delay).await;
    }

    let id = ClientId::from_seed(plan.vehicle_seed());
    let mut agent = ClientAgent::connect(id, connector)
        .await?
        .with_observer(observer)
        .with_shutdown(shutdown);

    let mut vehicle = Vehicle::spawn(plan.name(), plan.vehicle_seed());
    let mut outcome = ClientOutcome {
        name: plan.name(),
        ..Default::default()
    };

    match run_steps(&mut agent, &mut vehicle, plan, &mut outcome).await {
        Ok(()) => {}
        Err(ClientError::Cancelled) => {
            info!(client = %id, steps = outcome.steps_completed(), "Client cancelled")
        }
        Err(e) => return Err(e.into()),
    }

    agent.close();
    Ok(outcome)
}

async fn run_steps<R, C>(
    agent: &mut ClientAgent<R, C>,
    vehicle: &mut Vehicle,
    plan: &ClientPlan,
    outcome: &mut ClientOutcome,
) -> Result<(), ClientError>
where
    R: BroadcastReceiver,
    C: RequestClient,
{
    agent.synchronize().await?;
    agent.await_run().await?;

    let mut step = 0u64;
    while plan.steps.map_or(true, |limit| step < limit) {
        vehicle.step(plan.dt);
        let parts = report_parts(vehicle, plan.max_extra_parts)?;
        outcome.parts_sent.push(agent.send_report(parts).await?);

        let telemetry = agent.await_run().await?;
        outcome.telemetry_received.push(telemetry.len());
        step += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_seeds_differ_per_client() {
        let a = ClientPlan::new(0, 42);
        let b = ClientPlan::new(1, 42);
        assert_ne!(a.vehicle_seed(), b.vehicle_seed());
        assert_eq!(a.vehicle_seed(), ClientPlan::new(0, 42).vehicle_seed());
        assert_eq!(b.name(), "uav-1");
        assert_eq!(b.with_name("scout").name(), "scout");
    }

    #[test]
    fn test_report_starts_with_state_record() {
        let mut vehicle = Vehicle::spawn("uav-0", 9);
        let parts = report_parts(&mut vehicle, 0).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_value()["name"], "uav-0");
        assert!(parts[0].as_value().get("velocityNED").is_some());
    }

    #[test]
    fn test_extra_parts_are_intents() {
        let mut vehicle = Vehicle::spawn("uav-0", 9);
        for _ in 0..20 {
            let parts = report_parts(&mut vehicle, 3).unwrap();
            assert!((1..=4).contains(&parts.len()));
            for (k, part) in parts.iter().enumerate().skip(1) {
                assert_eq!(part.as_value()["horizon"], INTENT_HORIZON * k as f64);
            }
        }
    }
}
