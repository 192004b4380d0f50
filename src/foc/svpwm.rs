// Space Vector PWM (SVPWM) generation

use super::transforms::inverse_clarke;
use crate::ports::DutyVector;

const ONE_DIV_SQRT3: f32 = 0.577350269; // 1 / sqrt(3)

/// Largest phase-voltage amplitude SVPWM can produce without clipping
///
/// `max_duty * v_dc / √3` (radius of the circle inscribed in the hexagon)
pub fn voltage_limit(v_dc: f32, max_duty: f32) -> f32 {
    (max_duty * v_dc * ONE_DIV_SQRT3).max(0.0)
}

/// Calculate Space Vector PWM duty cycles
///
/// Min-max zero-sequence injection: the phase voltages from inverse Clarke
/// are shifted by `-(max + min) / 2` so the vector is centred in the
/// carrier. This is equivalent to symmetric SVPWM and gives the same 15%
/// bus utilisation gain over sinusoidal PWM.
///
/// # Arguments
/// * `v_alpha` - Alpha-axis voltage command [V]
/// * `v_beta` - Beta-axis voltage command [V]
/// * `v_dc` - DC bus voltage [V]
/// * `max_duty` - Maximum duty fraction (0.0 - 1.0]
///
/// # Returns
/// Per-phase duty fractions centred on `max_duty / 2`, each in `[0, max_duty]`
pub fn calculate_svpwm(v_alpha: f32, v_beta: f32, v_dc: f32, max_duty: f32) -> DutyVector {
    let center = max_duty * 0.5;

    // Prevent division by zero
    if v_dc <= 0.0 {
        return DutyVector::uniform(center);
    }

    let (v_u, v_v, v_w) = inverse_clarke(v_alpha, v_beta);

    // Zero-sequence injection
    let v_max = v_u.max(v_v).max(v_w);
    let v_min = v_u.min(v_v).min(v_w);
    let offset = -(v_max + v_min) * 0.5;

    DutyVector {
        u: center + (v_u + offset) / v_dc,
        v: center + (v_v + offset) / v_dc,
        w: center + (v_w + offset) / v_dc,
    }
    .clamped(max_duty)
}
