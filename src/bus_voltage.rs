//! DC Bus Voltage Monitoring
//!
//! 両チャネルで共有するDCバス電圧を分圧回路から逆算する。
//! しきい値判定（SafetyMonitor、ブレーキ抵抗）は周期ごとの生の電圧で行い、
//! ノイズ除去はデバウンスに任せる。ローパスフィルタ値は電圧制限と表示に使う。

use crate::config::AdcScaling;

/// バス電圧の計測結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusVoltage {
    /// 今周期の電圧 [V]（フィルタなし、しきい値判定用）
    pub instantaneous: f32,
    /// 現在の電圧 [V]（フィルタ済み）
    pub voltage: f32,
    /// 今周期の変換が有効か
    pub valid: bool,
}

/// バス電圧モニタ
pub struct BusVoltageMonitor {
    adc_max: u16,
    vref: f32,
    divider_ratio: f32,
    filter_alpha: f32,
    instantaneous: f32,
    voltage: f32,
    seeded: bool,
}

impl BusVoltageMonitor {
    pub fn new(scaling: &AdcScaling) -> Self {
        Self {
            adc_max: scaling.adc_max,
            vref: scaling.vref,
            // V_bus = V_adc * (R_upper + R_lower) / R_lower
            divider_ratio: (scaling.bus_r_upper + scaling.bus_r_lower) / scaling.bus_r_lower,
            filter_alpha: scaling.bus_filter_alpha,
            instantaneous: 0.0,
            voltage: 0.0,
            seeded: false,
        }
    }

    /// ADC生値から実電圧を計算
    pub fn adc_to_voltage(&self, adc_raw: u16) -> f32 {
        let v_adc = (adc_raw.min(self.adc_max) as f32 / self.adc_max as f32) * self.vref;
        v_adc * self.divider_ratio
    }

    /// 電圧を更新
    ///
    /// 変換が無かった周期は前回の値を保持し、`valid = false` を返す。
    /// 最初の有効サンプルでフィルタを初期化する（起動時の低電圧誤検出防止）。
    pub fn update(&mut self, adc_raw: Option<u16>) -> BusVoltage {
        let Some(raw) = adc_raw else {
            return BusVoltage {
                instantaneous: self.instantaneous,
                voltage: self.voltage,
                valid: false,
            };
        };

        let voltage_raw = self.adc_to_voltage(raw);
        self.instantaneous = voltage_raw;
        if self.seeded {
            // filtered = alpha * raw + (1 - alpha) * filtered_prev
            self.voltage =
                self.filter_alpha * voltage_raw + (1.0 - self.filter_alpha) * self.voltage;
        } else {
            self.voltage = voltage_raw;
            self.seeded = true;
            debug!("Bus voltage filter seeded at {}V", voltage_raw);
        }

        BusVoltage {
            instantaneous: voltage_raw,
            voltage: self.voltage,
            valid: true,
        }
    }

    /// 電圧 [V] に相当するADC生値（テスト・シミュレーション用）
    pub fn voltage_to_adc(&self, voltage: f32) -> u16 {
        let counts = voltage / self.divider_ratio / self.vref * self.adc_max as f32;
        libm::roundf(counts).clamp(0.0, self.adc_max as f32) as u16
    }
}
