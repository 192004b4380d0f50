// Quadrature encoder processing for rotor position and speed estimation
// The counter is kept as an integer modulo counts-per-revolution so the
// electrical angle is derived without accumulating float error.

use core::f32::consts::TAU;

use crate::foc::transforms::normalize_angle;

/// Position/speed estimate for one control period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderEstimate {
    /// Mechanical angle in radians [0, 2π)
    pub mechanical_angle: f32,
    /// Filtered mechanical velocity in rad/s
    pub velocity: f32,
    /// Electrical angle in radians [0, 2π), calibration offset applied
    pub electrical_angle: f32,
    /// No edges for the configured number of periods while commanded
    pub signal_loss: bool,
}

/// Encoder state machine for position and speed estimation
pub struct EncoderEstimator {
    /// Counts per mechanical revolution
    counts_per_rev: i32,
    /// Number of pole pairs
    pole_pairs: i32,
    /// Pulse counter in [0, counts_per_rev)
    counter: i32,
    /// Completed mechanical revolutions (signed)
    rotations: i32,
    /// Reverse the counting direction
    inversed: bool,
    /// Electrical offset in radians (calibration value)
    electrical_offset: f32,
    /// Control period in seconds
    dt: f32,
    /// Low-pass filter coefficient for velocity (0.0 - 1.0)
    velocity_filter_alpha: f32,
    /// Filtered velocity in rad/s
    velocity: f32,
    /// Consecutive commanded periods without an edge
    idle_periods: u32,
    /// Idle periods that count as signal loss (0 disables detection)
    loss_periods: u32,
}

impl EncoderEstimator {
    /// Create a new encoder estimator
    ///
    /// # Arguments
    /// * `counts_per_rev` - Quadrature counts per mechanical revolution (non-zero)
    /// * `pole_pairs` - Number of pole pairs in the motor (non-zero)
    /// * `dt` - Control period in seconds
    /// * `velocity_filter_alpha` - Low-pass filter coefficient (0.0-1.0]
    /// * `loss_periods` - Idle periods before signal loss is reported
    pub fn new(
        counts_per_rev: u32,
        pole_pairs: u8,
        dt: f32,
        velocity_filter_alpha: f32,
        loss_periods: u32,
    ) -> Self {
        Self {
            counts_per_rev: counts_per_rev.max(1) as i32,
            pole_pairs: pole_pairs.max(1) as i32,
            counter: 0,
            rotations: 0,
            inversed: false,
            electrical_offset: 0.0,
            dt,
            velocity_filter_alpha: velocity_filter_alpha.clamp(0.0, 1.0),
            velocity: 0.0,
            idle_periods: 0,
            loss_periods,
        }
    }

    /// Set the electrical offset (rad) and direction from calibration
    pub fn set_calibration(&mut self, electrical_offset: f32, inversed: bool) {
        self.electrical_offset = electrical_offset;
        self.inversed = inversed;
    }

    /// Advance the counter by the edges seen since the last period
    ///
    /// # Arguments
    /// * `edges` - Signed quadrature edge count since the previous call
    /// * `commanded` - A non-neutral reference is active (enables loss detection)
    pub fn update(&mut self, edges: i32, commanded: bool) -> EncoderEstimate {
        let edges = if self.inversed { -edges } else { edges };
        let prev_counter = self.counter;

        let cpr = self.counts_per_rev as i64;
        let total = self.counter as i64 + edges as i64;
        self.rotations = self.rotations.wrapping_add(total.div_euclid(cpr) as i32);
        self.counter = total.rem_euclid(cpr) as i32;

        // Velocity from the shortest-path position difference, then low-pass
        let delta = shortest_delta(self.counter, prev_counter, self.counts_per_rev);
        let instant = delta as f32 * TAU / self.counts_per_rev as f32 / self.dt;
        self.velocity = self.velocity_filter_alpha * instant
            + (1.0 - self.velocity_filter_alpha) * self.velocity;

        if edges == 0 && commanded {
            self.idle_periods = self.idle_periods.saturating_add(1);
        } else {
            self.idle_periods = 0;
        }

        EncoderEstimate {
            mechanical_angle: self.mechanical_angle(),
            velocity: self.velocity,
            electrical_angle: self.electrical_angle(),
            signal_loss: self.loss_periods > 0 && self.idle_periods >= self.loss_periods,
        }
    }

    /// Current mechanical angle in radians [0, 2π)
    pub fn mechanical_angle(&self) -> f32 {
        self.counter as f32 * TAU / self.counts_per_rev as f32
    }

    /// Current electrical angle in radians [0, 2π)
    ///
    /// Computed as (counter × pole_pairs) mod counts_per_rev so one mechanical
    /// revolution wraps the electrical angle exactly `pole_pairs` times.
    pub fn electrical_angle(&self) -> f32 {
        let electrical_counts = (self.counter as i64 * self.pole_pairs as i64)
            .rem_euclid(self.counts_per_rev as i64);
        let angle = electrical_counts as f32 * TAU / self.counts_per_rev as f32;
        normalize_angle(angle + self.electrical_offset)
    }

    /// Filtered mechanical velocity in rad/s
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Raw counter in [0, counts_per_rev)
    pub fn counter(&self) -> i32 {
        self.counter
    }

    /// Completed mechanical revolutions
    pub fn rotations(&self) -> i32 {
        self.rotations
    }

    /// Multi-turn position in radians
    pub fn position(&self) -> f32 {
        self.rotations as f32 * TAU + self.mechanical_angle()
    }
}

/// Shortest signed difference `current - previous` on a circle of `modulus` counts
fn shortest_delta(current: i32, previous: i32, modulus: i32) -> i32 {
    let mut delta = (current - previous).rem_euclid(modulus);
    if delta > modulus / 2 {
        delta -= modulus;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::PI;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    /// Shortest signed angle difference in (-π, π]
    fn angle_delta(current: f32, previous: f32) -> f32 {
        let mut diff = current - previous;
        if diff > PI {
            diff -= TAU;
        } else if diff <= -PI {
            diff += TAU;
        }
        diff
    }

    #[test]
    fn test_shortest_delta() {
        assert_eq!(shortest_delta(1, 89, 90), 2);
        assert_eq!(shortest_delta(89, 1, 90), -2);
        assert_eq!(shortest_delta(10, 5, 90), 5);
    }

    #[test]
    fn test_one_revolution_wraps_electrical_angle_pole_pair_times() {
        // 90 counts/rev, 15 pole pairs
        let mut encoder = EncoderEstimator::new(90, 15, 1e-4, 1.0, 0);
        let mut prev = encoder.electrical_angle();
        let mut wraps = 0;
        for _ in 0..90 {
            let est = encoder.update(1, true);
            if est.electrical_angle < prev {
                wraps += 1;
            }
            prev = est.electrical_angle;
        }
        assert_eq!(wraps, 15);
        assert_eq!(encoder.counter(), 0);
        assert_eq!(encoder.rotations(), 1);
    }

    #[test]
    fn test_wrap_is_continuous_forward_and_reverse() {
        let mut encoder = EncoderEstimator::new(90, 15, 1e-4, 1.0, 0);
        let expected = 15.0 * TAU / 90.0;

        for direction in [1, -1] {
            let mut prev = encoder.electrical_angle();
            let mut prev_velocity = None;
            // 2回転して 89 → 0（逆方向では 0 → 89）の境界を跨ぐ
            for _ in 0..180 {
                let est = encoder.update(direction, true);
                let delta = angle_delta(est.electrical_angle, prev);
                assert!(approx_eq(delta, expected * direction as f32));
                assert!(est.electrical_angle >= 0.0 && est.electrical_angle < TAU);
                if let Some(v) = prev_velocity {
                    assert!(approx_eq(est.velocity, v));
                }
                prev_velocity = Some(est.velocity);
                prev = est.electrical_angle;
            }
        }
    }

    #[test]
    fn test_negative_edges_wrap_backwards() {
        let mut encoder = EncoderEstimator::new(90, 15, 1e-4, 1.0, 0);
        let est = encoder.update(-1, false);
        assert_eq!(encoder.counter(), 89);
        assert_eq!(encoder.rotations(), -1);
        assert!(approx_eq(est.mechanical_angle, 89.0 * TAU / 90.0));
        assert!(est.velocity < 0.0);
    }

    #[test]
    fn test_velocity_estimate() {
        // 4096 counts/rev, 10kHz, 2 counts/period → 2*2π/4096/1e-4 rad/s
        let mut encoder = EncoderEstimator::new(4096, 7, 1e-4, 0.1, 0);
        for _ in 0..500 {
            encoder.update(2, true);
        }
        let expected = 2.0 * TAU / 4096.0 / 1e-4;
        assert!((encoder.velocity() - expected).abs() < expected * 1e-3);
    }

    #[test]
    fn test_calibration_offset_and_inversion() {
        let mut encoder = EncoderEstimator::new(360, 1, 1e-4, 1.0, 0);
        encoder.set_calibration(PI / 2.0, true);
        let est = encoder.update(-90, false);
        assert_eq!(encoder.counter(), 90);
        assert!(approx_eq(est.electrical_angle, PI));

        encoder.set_calibration(-PI, false);
        assert!(approx_eq(encoder.electrical_angle(), 1.5 * PI));
    }

    #[test]
    fn test_signal_loss_requires_command() {
        let mut encoder = EncoderEstimator::new(4096, 7, 1e-4, 0.1, 5);
        for _ in 0..10 {
            assert!(!encoder.update(0, false).signal_loss);
        }
        for _ in 0..4 {
            assert!(!encoder.update(0, true).signal_loss);
        }
        assert!(encoder.update(0, true).signal_loss);
        assert!(!encoder.update(3, true).signal_loss);
    }
}
