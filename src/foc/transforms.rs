// Coordinate transformations for FOC (Field Oriented Control)
// Includes Clarke/Park and their inverses

use core::f32::consts::TAU;

const ONE_DIV_SQRT3: f32 = 0.577_350_26; // 1 / sqrt(3)
const SQRT3_DIV_2: f32 = 0.866_025_4; // sqrt(3) / 2

/// Sine and cosine of an electrical angle, shared by Park and inverse Park
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinCos {
    pub sin: f32,
    pub cos: f32,
}

impl SinCos {
    /// Evaluate sin/cos of `theta` (radians, any range)
    ///
    /// # Implementation
    /// Uses idsp::cossin() for fast trigonometric calculation (~40 cycles on Cortex-M)
    /// compared to libm::cosf/sinf (~100-200 cycles).
    pub fn new(theta: f32) -> Self {
        // idsp uses the full i32 range as one turn: i32::MIN..i32::MAX ↔ -π..π
        // Scale to turns × 2^32 and let the i64 → i32 cast wrap into range.
        const TURN_SCALE: f32 = 4_294_967_296.0 / TAU;
        let phase = (theta * TURN_SCALE) as i64 as i32;

        let (cos_i32, sin_i32) = idsp::cossin(phase);

        const I32_TO_F32: f32 = 1.0 / 2_147_483_648.0; // 1 / 2^31
        Self {
            sin: sin_i32 as f32 * I32_TO_F32,
            cos: cos_i32 as f32 * I32_TO_F32,
        }
    }
}

/// Clarke transformation (abc/uvw → αβ), amplitude invariant
///
/// # Arguments
/// * `a`, `b`, `c` - Phase quantities
///
/// # Returns
/// Tuple of (alpha, beta) in the stationary frame
pub fn clarke(a: f32, b: f32, c: f32) -> (f32, f32) {
    let alpha = (2.0 * a - b - c) / 3.0;
    let beta = (b - c) * ONE_DIV_SQRT3;
    (alpha, beta)
}

/// Park transformation (αβ → dq)
///
/// # Returns
/// Tuple of (d, q) in the rotating frame
pub fn park(alpha: f32, beta: f32, angle: SinCos) -> (f32, f32) {
    let d = alpha * angle.cos + beta * angle.sin;
    let q = -alpha * angle.sin + beta * angle.cos;
    (d, q)
}

/// Inverse Park transformation (dq → αβ)
///
/// Transforms from the rotating dq reference frame to the stationary αβ frame
///
/// # Arguments
/// * `vd` - d-axis voltage (aligned with rotor flux)
/// * `vq` - q-axis voltage (perpendicular to rotor flux, produces torque)
/// * `angle` - sin/cos of the electrical angle
pub fn inverse_park(vd: f32, vq: f32, angle: SinCos) -> (f32, f32) {
    let v_alpha = vd * angle.cos - vq * angle.sin;
    let v_beta = vd * angle.sin + vq * angle.cos;
    (v_alpha, v_beta)
}

/// Inverse Clarke transformation (αβ → abc/uvw)
///
/// # Returns
/// Tuple of (v_u, v_v, v_w) three-phase voltages
pub fn inverse_clarke(v_alpha: f32, v_beta: f32) -> (f32, f32, f32) {
    let v_u = v_alpha;
    let v_v = -0.5 * v_alpha + SQRT3_DIV_2 * v_beta;
    let v_w = -0.5 * v_alpha - SQRT3_DIV_2 * v_beta;
    (v_u, v_v, v_w)
}

/// Normalize angle to range [0, 2π)
pub fn normalize_angle(angle: f32) -> f32 {
    let mut normalized = angle % TAU;
    if normalized < 0.0 {
        normalized += TAU;
    }
    // -tiny + TAU rounds to TAU in f32
    if normalized >= TAU {
        normalized = 0.0;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::PI;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_sin_cos_matches_libm() {
        for i in -40..40 {
            let theta = i as f32 * 0.25;
            let sc = SinCos::new(theta);
            assert!(approx_eq(sc.sin, libm::sinf(theta)), "sin({})", theta);
            assert!(approx_eq(sc.cos, libm::cosf(theta)), "cos({})", theta);
        }
    }

    #[test]
    fn test_inverse_park_zero_angle() {
        let (v_alpha, v_beta) = inverse_park(1.0, 0.0, SinCos::new(0.0));
        assert!(approx_eq(v_alpha, 1.0));
        assert!(approx_eq(v_beta, 0.0));
    }

    #[test]
    fn test_park_inverts_inverse_park() {
        let angle = SinCos::new(1.2);
        let (alpha, beta) = inverse_park(0.3, -2.0, angle);
        let (d, q) = park(alpha, beta, angle);
        assert!(approx_eq(d, 0.3));
        assert!(approx_eq(q, -2.0));
    }

    #[test]
    fn test_clarke_of_balanced_phases() {
        // Balanced currents at electrical angle θ with amplitude 2
        let theta = 0.7f32;
        let a = 2.0 * libm::cosf(theta);
        let b = 2.0 * libm::cosf(theta - 2.0 * PI / 3.0);
        let c = 2.0 * libm::cosf(theta + 2.0 * PI / 3.0);
        let (alpha, beta) = clarke(a, b, c);
        assert!(approx_eq(alpha, 2.0 * libm::cosf(theta)));
        assert!(approx_eq(beta, 2.0 * libm::sinf(theta)));

        let (d, q) = park(alpha, beta, SinCos::new(theta));
        assert!(approx_eq(d, 2.0));
        assert!(approx_eq(q, 0.0));
    }

    #[test]
    fn test_inverse_clarke() {
        let (v_u, v_v, v_w) = inverse_clarke(1.0, 0.0);
        assert!(approx_eq(v_u, 1.0));
        assert!(approx_eq(v_v, -0.5));
        assert!(approx_eq(v_w, -0.5));
        // Sum should be zero for balanced three-phase
        assert!(approx_eq(v_u + v_v + v_w, 0.0));
    }

    #[test]
    fn test_normalize_angle() {
        assert!(approx_eq(normalize_angle(0.0), 0.0));
        assert!(approx_eq(normalize_angle(7.0), 7.0 - TAU));
        assert!(approx_eq(normalize_angle(-1.0), -1.0 + TAU));
        assert!(normalize_angle(-1e-9) < TAU);
    }
}
