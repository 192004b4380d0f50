// FOC (Field Oriented Control) module
// Encoder-based FOC implementation for PMSM torque control

pub mod controller;
pub mod pi_controller;
pub mod svpwm;
pub mod transforms;

// Re-export main types for easier access
pub use controller::{FieldOrientedController, FocInputs, FocOutput};
pub use pi_controller::PiController;
pub use svpwm::{calculate_svpwm, voltage_limit};
pub use transforms::{clarke, inverse_clarke, inverse_park, park, SinCos};

/// モーター制御モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMode {
    /// 指令 × 電圧上限をq軸電圧として出力（電流ループなし）
    Voltage,
    /// 速度PI → q軸電流指令 → 電流PI（カスケード）
    Speed,
    /// 指令 × 最大電流をq軸電流指令として電流PIで追従
    Torque,
}

/// 指令ランプ（変化率制限）
///
/// 指令が急変してもフルスケール/秒の変化率で追従させる。
/// 指令喪失時のニュートラル復帰もこのランプを通る。
pub struct ReferenceRamp {
    /// 1制御周期で変化可能な最大量
    max_delta: f32,
    /// ランプ処理後の指令
    value: f32,
}

impl ReferenceRamp {
    /// # 引数
    /// * `rate_per_s` - 変化率 [フルスケール/s]
    /// * `dt` - 制御周期 [s]
    pub fn new(rate_per_s: f32, dt: f32) -> Self {
        Self {
            max_delta: (rate_per_s * dt).abs(),
            value: 0.0,
        }
    }

    /// 目標値に向けて1周期分進める
    pub fn update(&mut self, target: f32) -> f32 {
        let error = target - self.value;

        if error.abs() > self.max_delta {
            // 変化率制限を適用
            if error > 0.0 {
                self.value += self.max_delta;
            } else {
                self.value -= self.max_delta;
            }
        } else {
            // 目標値に到達
            self.value = target;
        }

        self.value
    }

    /// 現在の指令値
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_limits_rate() {
        // 20/s, 10kHz → 0.002 / 周期
        let mut ramp = ReferenceRamp::new(20.0, 1e-4);
        let first = ramp.update(1.0);
        assert!((first - 0.002).abs() < 1e-6);
        for _ in 0..499 {
            ramp.update(1.0);
        }
        assert!((ramp.value() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_ramp_reaches_target_exactly() {
        let mut ramp = ReferenceRamp::new(20.0, 1e-4);
        for _ in 0..1000 {
            ramp.update(-0.3);
        }
        assert_eq!(ramp.value(), -0.3);
        ramp.reset();
        assert_eq!(ramp.value(), 0.0);
    }
}
