//! 信号取り込み
//!
//! ADC生値を1周期分の `SampleFrame` に変換する。変換未完了・タイムスタンプ停止・
//! センサ範囲外のサンプルは無効として SafetyMonitor に渡す（ここでは再試行しない）。

use crate::bus_voltage::BusVoltage;
use crate::config::AdcScaling;
use crate::ports::AdcFrame;

/// 絶対零度 [°C]
const ABSOLUTE_ZERO_C: f32 = -273.15;

/// One channel's samples for one control period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFrame {
    /// Phase currents U/V/W [A]
    pub currents: [f32; 3],
    /// DC bus voltage of this period [V], shared by all channels
    pub bus_voltage: f32,
    /// Low-pass filtered DC bus voltage [V]
    pub bus_voltage_filtered: f32,
    /// Board temperature [°C]
    pub temperature_c: f32,
    /// Pulse width captured since the previous period [µs]
    pub command_pulse_us: Option<u32>,
    pub timestamp_us: u32,
    /// `false` marks the frame stale
    pub valid: bool,
}

impl SampleFrame {
    /// Largest absolute phase current [A]
    pub fn peak_current(&self) -> f32 {
        self.currents
            .iter()
            .fold(0.0f32, |peak, current| peak.max(current.abs()))
    }
}

/// 起動時の相電流オフセット平均化
struct OffsetCalibration {
    remaining: u16,
    total: u16,
    sums: [u32; 3],
}

impl OffsetCalibration {
    fn new(samples: u16) -> Self {
        Self {
            remaining: samples,
            total: samples,
            sums: [0; 3],
        }
    }

    /// 1サンプル加算し、完了した周期で平均値を返す
    fn accumulate(&mut self, counts: &[u16; 3]) -> Option<[f32; 3]> {
        if self.remaining == 0 {
            return None;
        }
        for (sum, &count) in self.sums.iter_mut().zip(counts) {
            *sum += count as u32;
        }
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }
        let n = self.total as f32;
        Some([
            self.sums[0] as f32 / n,
            self.sums[1] as f32 / n,
            self.sums[2] as f32 / n,
        ])
    }

    fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

/// チャネルごとの信号取り込み
pub struct SignalAcquisition {
    scaling: AdcScaling,
    amps_per_count: f32,
    offsets: [f32; 3],
    calibration: OffsetCalibration,
    last_timestamp: Option<u32>,
}

impl SignalAcquisition {
    /// # Arguments
    /// * `scaling` - ADC変換パラメータ
    /// * `calibration_samples` - オフセット平均化のサンプル数（0 なら公称オフセットを使用）
    pub fn new(scaling: &AdcScaling, calibration_samples: u16) -> Self {
        let volts_per_count = scaling.vref / scaling.adc_max as f32;
        let nominal = scaling.phase_offset_counts as f32;
        Self {
            scaling: *scaling,
            amps_per_count: volts_per_count / scaling.phase_volts_per_amp,
            offsets: [nominal; 3],
            calibration: OffsetCalibration::new(calibration_samples),
            last_timestamp: None,
        }
    }

    /// オフセットキャリブレーションが終わっているか
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_done()
    }

    /// 現在の相電流オフセット [counts]
    pub fn offsets(&self) -> [f32; 3] {
        self.offsets
    }

    /// 1周期分のサンプルを作成
    ///
    /// オフセットキャリブレーション中は出力が安全デューティに固定されている前提で
    /// 生値を平均化する。
    pub fn acquire(
        &mut self,
        raw: &AdcFrame,
        bus: BusVoltage,
        command_pulse_us: Option<u32>,
    ) -> SampleFrame {
        let fresh = raw.complete && self.last_timestamp != Some(raw.timestamp_us);
        if raw.complete {
            self.last_timestamp = Some(raw.timestamp_us);
        }

        if fresh {
            if let Some(offsets) = self.calibration.accumulate(&raw.phase_counts) {
                self.offsets = offsets;
                info!(
                    "Phase current offsets calibrated: {}, {}, {}",
                    offsets[0], offsets[1], offsets[2]
                );
            }
        }

        let currents = self.phase_currents(&raw.phase_counts);
        let temperature_c = self.temperature(raw.temperature_counts);

        let full_scale = self.scaling.phase_full_scale_a;
        let currents_plausible = currents.iter().all(|i| i.abs() <= full_scale);
        let temperature_plausible =
            temperature_c > ABSOLUTE_ZERO_C && temperature_c <= self.scaling.temp_ceiling_c;

        SampleFrame {
            currents,
            bus_voltage: bus.instantaneous,
            bus_voltage_filtered: bus.voltage,
            temperature_c,
            command_pulse_us,
            timestamp_us: raw.timestamp_us,
            valid: fresh && bus.valid && currents_plausible && temperature_plausible,
        }
    }

    fn phase_currents(&self, counts: &[u16; 3]) -> [f32; 3] {
        let u = (counts[0] as f32 - self.offsets[0]) * self.amps_per_count;
        let v = (counts[1] as f32 - self.offsets[1]) * self.amps_per_count;
        let w = if self.scaling.sensed_phases == 2 {
            -(u + v)
        } else {
            (counts[2] as f32 - self.offsets[2]) * self.amps_per_count
        };
        [u, v, w]
    }

    fn temperature(&self, counts: u16) -> f32 {
        let volts = counts as f32 / self.scaling.adc_max as f32 * self.scaling.vref;
        (volts - self.scaling.temp_volts_at_zero_c) / self.scaling.temp_volts_per_c
    }

    /// 電流 [A] に相当するADC生値（テスト・シミュレーション用）
    pub fn current_to_counts(&self, phase: usize, current: f32) -> u16 {
        let counts = self.offsets[phase] + current / self.amps_per_count;
        libm::roundf(counts).clamp(0.0, u16::MAX as f32) as u16
    }

    /// 温度 [°C] に相当するADC生値（テスト・シミュレーション用）
    pub fn temperature_to_counts(&self, temperature_c: f32) -> u16 {
        let volts = temperature_c * self.scaling.temp_volts_per_c + self.scaling.temp_volts_at_zero_c;
        let counts = volts / self.scaling.vref * self.scaling.adc_max as f32;
        libm::roundf(counts).clamp(0.0, u16::MAX as f32) as u16
    }
}
