//! Kinematic vehicle model driving each simulated client.
//!
//! Positions and velocities are in a local North-East-Down frame, so
//! altitude shows up as a negative `down` component.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Default heading jitter per step, in radians
pub const DEFAULT_TURN_JITTER: f64 = 0.05;

/// State record published once per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub name: String,

    /// Simulation time in seconds
    pub time: f64,

    #[serde(rename = "positionNED")]
    pub position_ned: [f64; 3],

    #[serde(rename = "velocityNED")]
    pub velocity_ned: [f64; 3],
}

/// Extra report part carrying a predicted position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub name: String,
    pub time: f64,

    /// Seconds ahead of `time` the prediction is for
    pub horizon: f64,

    #[serde(rename = "positionNED")]
    pub position_ned: [f64; 3],
}

/// A vehicle flying at constant speed with a randomly wandering heading.
#[derive(Debug, Clone)]
pub struct Vehicle {
    name: String,
    rng: ChaCha8Rng,
    position: [f64; 3],
    velocity: [f64; 3],
    time: f64,
    turn_jitter: f64,
}

impl Vehicle {
    /// Spawns a vehicle at a seeded random position and heading.
    pub fn spawn(name: impl Into<String>, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let position = [
            rng.gen_range(-1000.0..1000.0),
            rng.gen_range(-1000.0..1000.0),
            -rng.gen_range(50.0..500.0),
        ];
        let heading: f64 = rng.gen_range(0.0..TAU);
        let speed: f64 = rng.gen_range(10.0..40.0);
        let velocity = [speed * heading.cos(), speed * heading.sin(), 0.0];

        Self {
            name: name.into(),
            rng,
            position,
            velocity,
            time: 0.0,
            turn_jitter: DEFAULT_TURN_JITTER,
        }
    }

    /// Sets the maximum heading change per step (0 flies straight).
    pub fn with_turn_jitter(mut self, radians: f64) -> Self {
        self.turn_jitter = radians.abs();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    pub fn velocity(&self) -> [f64; 3] {
        self.velocity
    }

    /// Horizontal speed in m/s.
    pub fn ground_speed(&self) -> f64 {
        self.velocity[0].hypot(self.velocity[1])
    }

    /// Advances the vehicle by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let turn = if self.turn_jitter > 0.0 {
            self.rng.gen_range(-self.turn_jitter..=self.turn_jitter)
        } else {
            0.0
        };

        // Rotate the horizontal velocity, keep the vertical one
        let (sin, cos) = turn.sin_cos();
        let [north, east, down] = self.velocity;
        self.velocity = [north * cos - east * sin, north * sin + east * cos, down];

        for axis in 0..3 {
            self.position[axis] += self.velocity[axis] * dt;
        }
        self.time += dt;
    }

    /// Position the vehicle reaches after `horizon` seconds on its current velocity.
    pub fn predict(&self, horizon: f64) -> [f64; 3] {
        let mut predicted = self.position;
        for axis in 0..3 {
            predicted[axis] += self.velocity[axis] * horizon;
        }
        predicted
    }

    pub fn telemetry(&self) -> VehicleTelemetry {
        VehicleTelemetry {
            name: self.name.clone(),
            time: self.time,
            position_ned: self.position,
            velocity_ned: self.velocity,
        }
    }

    pub fn intent(&self, horizon: f64) -> IntentRecord {
        IntentRecord {
            name: self.name.clone(),
            time: self.time,
            horizon,
            position_ned: self.predict(horizon),
        }
    }

    /// Draws how many extra intent parts to attach this step.
    pub fn draw_extra_parts(&mut self, max_extra: usize) -> usize {
        if max_extra == 0 {
            0
        } else {
            self.rng.gen_range(0..=max_extra)
        }
    }
}
