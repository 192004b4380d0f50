//! ホスト上のシミュレーション（テスト専用）
//!
//! dq軸モデルのPMSMと、全ポートを実装した仮想ボード。
//! 制御コアを実機なしで閉ループ評価するために使う。

use core::f32::consts::TAU;

use crate::acquisition::SignalAcquisition;
use crate::bus_voltage::BusVoltageMonitor;
use crate::config::{Config, MAX_CHANNELS};
use crate::foc::transforms::{clarke, inverse_clarke, inverse_park, park, SinCos};
use crate::ports::{
    AdcFrame, BrakeSink, CommandSource, DutyVector, EncoderSource, PwmSink, SampleSource,
};

/// Euler integration substeps per control period
const SUBSTEPS: u32 = 10;

/// PMSM電気・機械定数
#[derive(Debug, Clone, Copy)]
pub struct PmsmParams {
    /// 相抵抗 [Ω]
    pub resistance: f32,
    /// 相インダクタンス [H]（Ld = Lq）
    pub inductance: f32,
    /// 永久磁石鎖交磁束 [Wb]
    pub flux_linkage: f32,
    pub pole_pairs: u8,
    /// 慣性モーメント [kg·m²]
    pub inertia: f32,
    /// 粘性摩擦 [N·m·s/rad]
    pub friction: f32,
}

impl Default for PmsmParams {
    fn default() -> Self {
        Self {
            resistance: 0.2,
            inductance: 0.2e-3,
            flux_linkage: 0.01,
            pole_pairs: 7,
            inertia: 1e-4,
            friction: 1e-5,
        }
    }
}

/// dq軸モデルのPMSM
pub struct PmsmPlant {
    params: PmsmParams,
    id: f32,
    iq: f32,
    /// Mechanical velocity [rad/s]
    velocity: f32,
    /// Mechanical angle [rad], unbounded
    angle: f32,
    locked: bool,
}

impl PmsmPlant {
    pub fn new(params: PmsmParams) -> Self {
        Self {
            params,
            id: 0.0,
            iq: 0.0,
            velocity: 0.0,
            angle: 0.0,
            locked: false,
        }
    }

    /// ロータ拘束（角度固定）
    pub fn locked(params: PmsmParams, angle: f32) -> Self {
        Self {
            angle,
            locked: true,
            ..Self::new(params)
        }
    }

    /// 1制御周期分進める
    pub fn step(&mut self, duty: &DutyVector, v_dc: f32, dt: f32) {
        let p = self.params;
        let pp = p.pole_pairs as f32;
        let h = dt / SUBSTEPS as f32;

        // Clarke is amplitude invariant, so the common mode drops out
        let (v_alpha, v_beta) = clarke(duty.u * v_dc, duty.v * v_dc, duty.w * v_dc);

        for _ in 0..SUBSTEPS {
            let (vd, vq) = park(v_alpha, v_beta, SinCos::new(self.electrical_angle()));
            let omega_e = self.velocity * pp;

            let did = (vd - p.resistance * self.id + omega_e * p.inductance * self.iq) / p.inductance;
            let diq = (vq - p.resistance * self.iq - omega_e * p.inductance * self.id
                - omega_e * p.flux_linkage)
                / p.inductance;
            self.id += did * h;
            self.iq += diq * h;

            if !self.locked {
                let torque = 1.5 * pp * p.flux_linkage * self.iq;
                let accel = (torque - p.friction * self.velocity) / p.inertia;
                self.velocity += accel * h;
                self.angle += self.velocity * h;
            }
        }
    }

    pub fn electrical_angle(&self) -> f32 {
        let theta = (self.angle * self.params.pole_pairs as f32) % TAU;
        if theta < 0.0 {
            theta + TAU
        } else {
            theta
        }
    }

    pub fn phase_currents(&self) -> [f32; 3] {
        let (alpha, beta) = inverse_park(self.id, self.iq, SinCos::new(self.electrical_angle()));
        let (u, v, w) = inverse_clarke(alpha, beta);
        [u, v, w]
    }

    pub fn dq_currents(&self) -> (f32, f32) {
        (self.id, self.iq)
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }
}

/// 全ポートを実装した仮想ボード
pub struct SimBoard {
    pub plants: [PmsmPlant; MAX_CHANNELS],
    /// 電源電圧 [V]
    pub bus_voltage: f32,
    /// バス電圧の変換を返すか
    pub bus_conversion: bool,
    /// 毎周期届く指令パルス幅 [µs]（`None` なら無信号）
    pub command_us: [Option<u32>; MAX_CHANNELS],
    /// 直近に出力されたデューティ
    pub duties: [DutyVector; MAX_CHANNELS],
    pub brake_duty: f32,
    /// 全周期を通じた最大デューティ
    pub peak_duty: f32,
    counts_per_rev: f32,
    last_counts: [i64; MAX_CHANNELS],
    period_us: u32,
    timestamp_us: u32,
    dt: f32,
    bus: BusVoltageMonitor,
    phases: SignalAcquisition,
}

impl SimBoard {
    pub fn new(config: &Config, params: PmsmParams) -> Self {
        Self::with_plants(config, [PmsmPlant::new(params), PmsmPlant::new(params)])
    }

    pub fn with_plants(config: &Config, plants: [PmsmPlant; MAX_CHANNELS]) -> Self {
        let counts_per_rev = config.encoder_counts_per_rev as f32;
        let last_counts = [
            libm::floorf(plants[0].angle() / TAU * counts_per_rev) as i64,
            libm::floorf(plants[1].angle() / TAU * counts_per_rev) as i64,
        ];
        Self {
            plants,
            bus_voltage: config.nominal_band().0,
            bus_conversion: true,
            command_us: [Some(config.command_pulse_range.neutral_us as u32); MAX_CHANNELS],
            duties: [DutyVector::default(); MAX_CHANNELS],
            brake_duty: 0.0,
            peak_duty: 0.0,
            counts_per_rev,
            last_counts,
            period_us: 1_000_000 / config.control_frequency_hz,
            timestamp_us: 0,
            dt: config.period_s(),
            bus: BusVoltageMonitor::new(&config.adc),
            phases: SignalAcquisition::new(&config.adc, 0),
        }
    }
}

impl SampleSource for SimBoard {
    fn read_bus(&mut self) -> Option<u16> {
        // 周期の先頭で呼ばれるのでここで時刻を進める
        self.timestamp_us = self.timestamp_us.wrapping_add(self.period_us);
        self.bus_conversion
            .then(|| self.bus.voltage_to_adc(self.bus_voltage))
    }

    fn read_phases(&mut self, channel: usize) -> AdcFrame {
        let currents = self.plants[channel].phase_currents();
        AdcFrame {
            phase_counts: [
                self.phases.current_to_counts(0, currents[0]),
                self.phases.current_to_counts(1, currents[1]),
                self.phases.current_to_counts(2, currents[2]),
            ],
            temperature_counts: self.phases.temperature_to_counts(35.0),
            complete: true,
            timestamp_us: self.timestamp_us,
        }
    }
}

impl EncoderSource for SimBoard {
    fn read_edges(&mut self, channel: usize) -> i32 {
        let counts = libm::floorf(self.plants[channel].angle() / TAU * self.counts_per_rev) as i64;
        let edges = counts - self.last_counts[channel];
        self.last_counts[channel] = counts;
        edges as i32
    }
}

impl CommandSource for SimBoard {
    fn poll_pulse(&mut self, channel: usize) -> Option<u32> {
        self.command_us[channel]
    }
}

impl PwmSink for SimBoard {
    fn apply_duties(&mut self, duties: &[DutyVector]) {
        for (channel, duty) in duties.iter().enumerate() {
            self.duties[channel] = *duty;
            self.peak_duty = self.peak_duty.max(duty.peak());
            self.plants[channel].step(duty, self.bus_voltage, self.dt);
        }
    }
}

impl BrakeSink for SimBoard {
    fn set_brake_duty(&mut self, duty: f32) {
        self.brake_duty = duty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_phase_currents_follow_dq() {
        let mut plant = PmsmPlant::locked(PmsmParams::default(), 0.2);
        // 定常状態で id = vd / R
        for _ in 0..200 {
            let angle = SinCos::new(plant.electrical_angle());
            let (alpha, beta) = inverse_park(0.2, 0.0, angle);
            let (u, v, w) = inverse_clarke(alpha, beta);
            let duty = DutyVector {
                u: 0.5 + u / 24.0,
                v: 0.5 + v / 24.0,
                w: 0.5 + w / 24.0,
            };
            plant.step(&duty, 24.0, 1e-4);
        }
        let (id, iq) = plant.dq_currents();
        assert!((id - 1.0).abs() < 0.01);
        assert!(iq.abs() < 0.01);
        let currents = plant.phase_currents();
        assert!((currents[0] + currents[1] + currents[2]).abs() < 1e-4);
    }
}
