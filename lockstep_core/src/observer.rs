//! Telemetry consumers attached to a client agent.

use lockstep_env::Payload;

/// Receives every telemetry payload a client sees.
///
/// `step` is the number of `Run` signals the client had received when the
/// payload arrived; telemetry relayed during cycle `k` carries `step == k`.
pub trait TelemetryObserver: Send {
    fn on_telemetry(&mut self, step: u64, payload: &Payload);
}

impl<F> TelemetryObserver for F
where
    F: FnMut(u64, &Payload) + Send,
{
    fn on_telemetry(&mut self, step: u64, payload: &Payload) {
        self(step, payload)
    }
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TelemetryObserver for NullObserver {
    fn on_telemetry(&mut self, _step: u64, _payload: &Payload) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |step: u64, payload: &Payload| seen.push((step, payload.clone()));
            observer.on_telemetry(3, &Payload::new(json!({"x": 1})));
        }
        assert_eq!(seen, vec![(3, Payload::new(json!({"x": 1})))]);
    }
}
