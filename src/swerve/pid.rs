// PID controller with optional continuous (wrapping) input

use crate::config::PidGains;

/// Wrap `input` into `[min, max)`
pub fn input_modulus(input: f64, min: f64, max: f64) -> f64 {
    min + (input - min).rem_euclid(max - min)
}

/// Shortest signed error from `measurement` to `setpoint` on a domain that
/// wraps at `[min, max)`
pub fn continuous_error(setpoint: f64, measurement: f64, min: f64, max: f64) -> f64 {
    let half_range = (max - min) / 2.0;
    input_modulus(setpoint - measurement, -half_range, half_range)
}

/// PID controller evaluated once per fixed control period
///
/// The derivative acts on error, and the integral is clamped so its
/// contribution stays within the integrator range
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    /// Seconds between calls to [`PidController::calculate`]
    period: f64,

    /// Input domain that wraps, e.g. `[0, 2pi)` for an angle
    continuous_range: Option<(f64, f64)>,

    /// Clamp for `ki * total_error`
    integrator_min: f64,
    integrator_max: f64,

    position_error: f64,
    prev_error: f64,
    total_error: f64,
    first_update: bool,
}

impl PidController {
    pub fn new(gains: PidGains, period: f64) -> Self {
        Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            period,
            continuous_range: None,
            integrator_min: -1.0,
            integrator_max: 1.0,
            position_error: 0.0,
            prev_error: 0.0,
            total_error: 0.0,
            first_update: true,
        }
    }

    /// Treat `min` and `max` as the same point so error takes the short way round
    pub fn with_continuous_input(mut self, min: f64, max: f64) -> Self {
        self.continuous_range = Some((min, max));
        self
    }

    /// Set the range the integral term may contribute
    pub fn with_integrator_range(mut self, min: f64, max: f64) -> Self {
        self.integrator_min = min;
        self.integrator_max = max;
        self
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous_range.is_some()
    }

    /// Clear integrator and derivative history
    pub fn reset(&mut self) {
        self.position_error = 0.0;
        self.prev_error = 0.0;
        self.total_error = 0.0;
        self.first_update = true;
    }

    /// Compute the next output for `measurement` tracking `setpoint`
    pub fn calculate(&mut self, measurement: f64, setpoint: f64) -> f64 {
        let error = match self.continuous_range {
            Some((min, max)) => continuous_error(setpoint, measurement, min, max),
            None => setpoint - measurement,
        };

        self.prev_error = if self.first_update {
            error
        } else {
            self.position_error
        };
        self.position_error = error;
        self.first_update = false;

        let velocity_error = (self.position_error - self.prev_error) / self.period;

        if self.ki != 0.0 {
            // a negative gain swaps the bounds
            let a = self.integrator_min / self.ki;
            let b = self.integrator_max / self.ki;
            self.total_error = (self.total_error + self.position_error * self.period)
                .clamp(a.min(b), a.max(b));
        }

        self.kp * self.position_error + self.ki * self.total_error + self.kd * velocity_error
    }
}
