// PI (Proportional-Integral) controller with anti-windup

/// PI controller with anti-windup and output limiting
pub struct PiController {
    /// Proportional gain
    kp: f32,
    /// Integral gain
    ki: f32,
    /// Integral accumulator (∫e dt)
    integral: f32,
    /// Minimum output limit
    output_min: f32,
    /// Maximum output limit
    output_max: f32,
    /// Last calculated output
    last_output: f32,
    /// Output was clamped on the last update
    saturated: bool,
}

impl PiController {
    /// Create a new PI controller
    ///
    /// # Arguments
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain
    /// * `output_min` - Minimum output limit
    /// * `output_max` - Maximum output limit
    pub fn new(kp: f32, ki: f32, output_min: f32, output_max: f32) -> Self {
        Self {
            kp,
            ki,
            integral: 0.0,
            output_min,
            output_max,
            last_output: 0.0,
            saturated: false,
        }
    }

    /// Create a symmetric PI controller (output range: -limit to +limit)
    pub fn new_symmetric(kp: f32, ki: f32, output_limit: f32) -> Self {
        Self::new(kp, ki, -output_limit, output_limit)
    }

    /// Update the PI controller
    ///
    /// # Arguments
    /// * `setpoint` - Desired value
    /// * `measured` - Actual measured value
    /// * `dt` - Time step (seconds)
    ///
    /// # Returns
    /// Controller output (limited to output_min..output_max)
    ///
    /// The integrator is frozen while the output is saturated and the error
    /// would push it further into saturation; it may still unwind.
    pub fn update(&mut self, setpoint: f32, measured: f32, dt: f32) -> f32 {
        let error = setpoint - measured;
        let p_term = self.kp * error;

        let candidate = self.integral + error * dt;
        let unclamped = p_term + self.ki * candidate;
        let winding_up = (unclamped > self.output_max && error > 0.0)
            || (unclamped < self.output_min && error < 0.0);
        if !winding_up {
            self.integral = candidate;
        }

        let output = p_term + self.ki * self.integral;
        self.last_output = output.clamp(self.output_min, self.output_max);
        self.saturated = output != self.last_output;

        self.last_output
    }

    /// Reset the integral term to zero
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_output = 0.0;
        self.saturated = false;
    }

    /// Set symmetric output limits (±limit)
    pub fn set_symmetric_limit(&mut self, output_limit: f32) {
        let limit = output_limit.max(0.0);
        self.output_min = -limit;
        self.output_max = limit;
    }

    /// Get the current output
    pub fn get_output(&self) -> f32 {
        self.last_output
    }

    /// Get the current integral term
    pub fn get_integral(&self) -> f32 {
        self.integral
    }

    /// Check if output is currently saturated
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }
}
