use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Steering PID gain triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    #[serde(rename = "Kp")]
    pub kp: f64,
    #[serde(rename = "Ki")]
    pub ki: f64,
    #[serde(rename = "Kd")]
    pub kd: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self { kp: 1.0, ki: 0.0, kd: 0.1 }
    }
}

/// PID helm: heading error in, rudder command out.
///
/// The error must already be normalized into [-180, 180]; positive error
/// (target clockwise of heading) produces positive rudder.
pub struct Helm {
    gains: Gains,
    out_min: f64,
    out_max: f64,
    period: Duration,
    integrator: f64,
    prev_error: Option<f64>,
    last_update: Option<Instant>,
}

impl Helm {
    pub fn new(gains: Gains, out_min: f64, out_max: f64, period: Duration) -> Self {
        Self { gains, out_min, out_max, period, integrator: 0.0, prev_error: None, last_update: None }
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Update gains without restarting the controller. The integrator is
    /// rescaled so the integral contribution (and hence the output) is
    /// continuous across the change.
    pub fn set_gains(&mut self, gains: Gains) {
        if gains == self.gains {
            return;
        }
        if gains.ki != 0.0 {
            self.integrator *= self.gains.ki / gains.ki;
        } else {
            self.integrator = 0.0;
        }
        self.gains = gains;
    }

    /// One control-period step. A tick that misses its slot by more than
    /// one full period freezes the integrator and zeroes the derivative
    /// for that catch-up step.
    pub fn update(&mut self, error: f64, now: Instant) -> f64 {
        let dt = self.period.as_secs_f64();
        let missed = self
            .last_update
            .is_some_and(|t| now.duration_since(t) > self.period * 2);

        let derivative = if missed {
            0.0
        } else {
            self.prev_error.map_or(0.0, |prev| (error - prev) / dt)
        };

        let candidate = self.integrator + error * dt;
        let raw = self.gains.kp * error + self.gains.ki * candidate + self.gains.kd * derivative;
        let out = raw.clamp(self.out_min, self.out_max);

        // Clamping anti-windup: only integrate when the output is inside the
        // band, or when the error is pulling back out of saturation.
        let pushing = (raw > self.out_max && error > 0.0) || (raw < self.out_min && error < 0.0);
        let out = if missed || pushing {
            let held = self.gains.kp * error + self.gains.ki * self.integrator
                + self.gains.kd * derivative;
            held.clamp(self.out_min, self.out_max)
        } else {
            self.integrator = candidate;
            out
        };

        self.prev_error = Some(error);
        self.last_update = Some(now);
        out
    }

    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.prev_error = None;
        self.last_update = None;
    }
}
