//! ブレーキ抵抗制御
//!
//! 回生でバス電圧がしきい値を超えたら、超過分に比例したデューティで
//! 抵抗に電流を流す。一度動作したら、解除電圧（しきい値 − ヒステリシス）を
//! 下回るまで最小デューティを保持する。チャネルの故障状態とは無関係に動作する
//! （電源保護が優先、抵抗過熱中も継続）。

use crate::config::{brake::OVERTEMP_RELEASE_BAND_C, Config, ResistorThermal};

/// ブレーキ抵抗の一次遅れ熱モデル
///
/// dT/dt = (P·Rth − (T − Tamb)) / τ,  P = duty · V² / R
pub struct ResistorThermalModel {
    params: ResistorThermal,
    temperature_c: f32,
    overtemp: bool,
}

impl ResistorThermalModel {
    pub fn new(params: &ResistorThermal) -> Self {
        Self {
            params: *params,
            temperature_c: params.ambient_c,
            overtemp: false,
        }
    }

    /// 1周期分の温度更新
    pub fn update(&mut self, duty: f32, bus_voltage: f32, dt: f32) -> bool {
        let p = &self.params;
        let power = duty * bus_voltage * bus_voltage / p.resistance_ohm;
        let rise = power * p.thermal_resistance - (self.temperature_c - p.ambient_c);
        self.temperature_c += rise / p.time_constant_s * dt;

        if !self.overtemp && self.temperature_c > p.max_temperature_c {
            self.overtemp = true;
            error!("Brake resistor overtemperature: {}C", self.temperature_c);
        } else if self.overtemp
            && self.temperature_c < p.max_temperature_c - OVERTEMP_RELEASE_BAND_C
        {
            self.overtemp = false;
            info!("Brake resistor cooled down: {}C", self.temperature_c);
        }
        self.overtemp
    }

    pub fn temperature(&self) -> f32 {
        self.temperature_c
    }

    pub fn is_overtemp(&self) -> bool {
        self.overtemp
    }
}

/// バス電圧 → ブレーキ抵抗デューティ
pub struct BrakeResistorModulator {
    enabled: bool,
    threshold: f32,
    release: f32,
    full_duty_span: f32,
    min_duty: f32,
    dt: f32,
    engaged: bool,
    duty: f32,
    thermal: ResistorThermalModel,
}

impl BrakeResistorModulator {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.brake_resistor_enabled,
            threshold: config.brake_threshold,
            release: config.brake_threshold - config.brake_hysteresis,
            full_duty_span: config.brake_full_duty_span,
            min_duty: config.brake_min_duty,
            dt: config.period_s(),
            engaged: false,
            duty: 0.0,
            thermal: ResistorThermalModel::new(&config.resistor),
        }
    }

    /// 1周期分の更新
    ///
    /// # Returns
    /// 抵抗スイッチのデューティ（0.0～1.0）
    pub fn update(&mut self, bus_voltage: f32) -> f32 {
        if self.enabled {
            if !self.engaged && bus_voltage > self.threshold {
                self.engaged = true;
                debug!("Brake resistor engaged at {}V", bus_voltage);
            } else if self.engaged && bus_voltage < self.release {
                self.engaged = false;
                debug!("Brake resistor released at {}V", bus_voltage);
            }
        }

        self.duty = if self.engaged {
            ((bus_voltage - self.threshold) / self.full_duty_span).clamp(self.min_duty, 1.0)
        } else {
            0.0
        };

        self.thermal.update(self.duty, bus_voltage, self.dt);
        self.duty
    }

    pub fn duty(&self) -> f32 {
        self.duty
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// 抵抗過熱（各チャネルの SafetyMonitor が次周期に参照する）
    pub fn is_overtemp(&self) -> bool {
        self.thermal.is_overtemp()
    }

    pub fn resistor_temperature(&self) -> f32 {
        self.thermal.temperature()
    }
}
