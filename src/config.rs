//! Configuration module
//!
//! 起動時に一度だけ与えられ、以後変更されない制御パラメータ一式。
//! 電圧しきい値はセル数から導出するが、すべて個別に上書きできる。

pub mod params;

use core::fmt;

use crate::foc::ControlMode;

pub use params::*;

/// 同時に駆動できるチャネル数の上限
pub const MAX_CHANNELS: usize = 2;

/// 過電圧しきい値のセル電圧 [V/cell]
const CELL_OVERVOLTAGE: f32 = 4.3;

/// PI gains in `kp * e + ki * ∫e dt` form.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PiGains {
    pub kp: f32,
    pub ki: f32,
}

impl PiGains {
    pub const fn new(kp: f32, ki: f32) -> Self {
        Self { kp, ki }
    }
}

/// Command pulse width range [µs].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseRange {
    pub min_us: f32,
    pub neutral_us: f32,
    pub max_us: f32,
}

/// 指令信号の取り込み方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandInput {
    /// タイマーのインプットキャプチャでエッジ間隔を計測
    Capture,
    /// 低速の周期タスクで入力レベルをサンプリング
    ///
    /// パルス幅の分解能はポーリング周期（`command::POLL_RESOLUTION_US`）で決まる。
    /// エッジ時刻を前後のサンプルの中点とするため、誤差は最大で1周期分。
    Polled,
}

/// 指令の向き
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandDirection {
    /// min..max → -1..+1
    Bidirectional,
    /// min..max → 0..+1
    Unidirectional,
}

/// ADC生値から物理量への変換パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcScaling {
    /// ADCフルスケール（12ビット = 4096）
    pub adc_max: u16,
    /// ADC基準電圧 [V]
    pub vref: f32,
    /// バス電圧分圧抵抗の上側 [Ω]
    pub bus_r_upper: f32,
    /// バス電圧分圧抵抗の下側 [Ω]
    pub bus_r_lower: f32,
    /// バス電圧ローパスフィルタ係数（0.0-1.0、大きいほど応答が速い）
    pub bus_filter_alpha: f32,
    /// 電流センス感度 [V/A]
    pub phase_volts_per_amp: f32,
    /// 無電流時のADC値
    pub phase_offset_counts: u16,
    /// 電流センサのフルスケール [A]
    pub phase_full_scale_a: f32,
    /// 計測している相の数（2 の場合 W 相は -(U+V) で再構成）
    pub sensed_phases: u8,
    /// 温度センサ感度 [V/°C]
    pub temp_volts_per_c: f32,
    /// 0°C でのセンサ出力 [V]
    pub temp_volts_at_zero_c: f32,
    /// 温度センサの測定上限 [°C]
    pub temp_ceiling_c: f32,
}

impl Default for AdcScaling {
    fn default() -> Self {
        Self {
            adc_max: adc::ADC_MAX,
            vref: adc::VREF,
            bus_r_upper: adc::BUS_R_UPPER,
            bus_r_lower: adc::BUS_R_LOWER,
            bus_filter_alpha: adc::BUS_FILTER_ALPHA,
            phase_volts_per_amp: adc::PHASE_VOLTS_PER_AMP,
            phase_offset_counts: adc::PHASE_OFFSET_COUNTS,
            phase_full_scale_a: adc::PHASE_FULL_SCALE_A,
            sensed_phases: 3,
            temp_volts_per_c: adc::TEMP_VOLTS_PER_C,
            temp_volts_at_zero_c: adc::TEMP_VOLTS_AT_ZERO_C,
            temp_ceiling_c: adc::TEMP_CEILING_C,
        }
    }
}

/// ブレーキ抵抗の熱モデル
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResistorThermal {
    /// 抵抗値 [Ω]
    pub resistance_ohm: f32,
    /// 熱抵抗 [K/W]
    pub thermal_resistance: f32,
    /// 熱時定数 [s]
    pub time_constant_s: f32,
    /// 周囲温度 [°C]
    pub ambient_c: f32,
    /// 許容温度 [°C]
    pub max_temperature_c: f32,
}

impl Default for ResistorThermal {
    fn default() -> Self {
        Self {
            resistance_ohm: brake::DEFAULT_RESISTANCE_OHM,
            thermal_resistance: brake::DEFAULT_THERMAL_RESISTANCE,
            time_constant_s: brake::DEFAULT_THERMAL_TIME_CONSTANT_S,
            ambient_c: brake::DEFAULT_AMBIENT_C,
            max_temperature_c: brake::DEFAULT_MAX_TEMPERATURE_C,
        }
    }
}

/// チャネルごとのキャリブレーション値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelConfig {
    /// 電気角オフセット [rad]（エンコーダ原点と d 軸のずれ）
    pub electrical_offset: f32,
    /// エンコーダの回転方向反転
    pub direction_inversed: bool,
}

/// 制御コア全体の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub channel_count: u8,
    pub control_frequency_hz: u32,
    pub control_mode: ControlMode,

    pub cell_count: u8,
    pub pole_pairs: u8,
    pub encoder_counts_per_rev: u32,

    pub current_loop_gains: PiGains,
    pub speed_loop_gains: PiGains,
    pub max_duty: f32,
    /// q軸電流指令の上限 [A]
    pub max_current: f32,
    /// 速度指令のフルスケール [rad/s]
    pub max_speed: f32,
    /// 指令ランプ [フルスケール/s]
    pub reference_ramp_per_s: f32,
    pub velocity_filter_alpha: f32,

    pub overvoltage_threshold: f32,
    pub undervoltage_threshold: f32,
    pub overcurrent_threshold: f32,
    pub fault_debounce_count: u16,
    pub recovery_debounce_count: u16,
    pub encoder_loss_periods: u32,
    /// 故障中に全相へ出力するデューティ
    pub safe_duty: f32,

    pub brake_resistor_enabled: bool,
    pub brake_threshold: f32,
    pub brake_hysteresis: f32,
    pub brake_full_duty_span: f32,
    /// Duty held while engaged, until the bus falls below `threshold - hysteresis`
    pub brake_min_duty: f32,
    pub resistor: ResistorThermal,

    pub command_input: CommandInput,
    pub command_direction: CommandDirection,
    pub command_pulse_range: PulseRange,
    pub command_pulse_tolerance_us: f32,
    pub command_deadband: f32,
    pub command_timeout_periods: u32,

    pub adc: AdcScaling,
    pub offset_calibration_samples: u16,
    pub channels: [ChannelConfig; MAX_CHANNELS],
}

impl Config {
    /// セル数から電圧しきい値を導出したデフォルト設定
    pub fn for_cells(cell_count: u8) -> Self {
        let cells = cell_count as f32;
        Self {
            channel_count: 2,
            control_frequency_hz: DEFAULT_CONTROL_FREQUENCY_HZ,
            control_mode: ControlMode::Torque,

            cell_count,
            pole_pairs: DEFAULT_POLE_PAIRS,
            encoder_counts_per_rev: DEFAULT_ENCODER_COUNTS_PER_REV,

            current_loop_gains: PiGains::new(DEFAULT_CURRENT_KP, DEFAULT_CURRENT_KI),
            speed_loop_gains: PiGains::new(DEFAULT_SPEED_KP, DEFAULT_SPEED_KI),
            max_duty: DEFAULT_MAX_DUTY,
            max_current: DEFAULT_MAX_CURRENT,
            max_speed: DEFAULT_MAX_SPEED,
            reference_ramp_per_s: DEFAULT_REFERENCE_RAMP_PER_S,
            velocity_filter_alpha: DEFAULT_VELOCITY_FILTER_ALPHA,

            overvoltage_threshold: cells * CELL_OVERVOLTAGE,
            undervoltage_threshold: cells * CELL_CUTOFF_VOLTAGE,
            overcurrent_threshold: DEFAULT_OVERCURRENT_THRESHOLD,
            fault_debounce_count: DEFAULT_FAULT_DEBOUNCE_COUNT,
            recovery_debounce_count: DEFAULT_RECOVERY_DEBOUNCE_COUNT,
            encoder_loss_periods: DEFAULT_ENCODER_LOSS_PERIODS,
            safe_duty: DEFAULT_SAFE_DUTY,

            brake_resistor_enabled: true,
            brake_threshold: cells * CELL_FULL_VOLTAGE,
            brake_hysteresis: brake::DEFAULT_HYSTERESIS,
            brake_full_duty_span: brake::DEFAULT_FULL_DUTY_SPAN,
            brake_min_duty: brake::DEFAULT_MIN_ENGAGED_DUTY,
            resistor: ResistorThermal::default(),

            command_input: CommandInput::Capture,
            command_direction: CommandDirection::Bidirectional,
            command_pulse_range: PulseRange {
                min_us: command::DEFAULT_MIN_US,
                neutral_us: command::DEFAULT_NEUTRAL_US,
                max_us: command::DEFAULT_MAX_US,
            },
            command_pulse_tolerance_us: command::DEFAULT_TOLERANCE_US,
            command_deadband: command::DEFAULT_DEADBAND,
            command_timeout_periods: command::DEFAULT_TIMEOUT_PERIODS,

            adc: AdcScaling::default(),
            offset_calibration_samples: adc::DEFAULT_OFFSET_CALIBRATION_SAMPLES,
            channels: [ChannelConfig::default(); MAX_CHANNELS],
        }
    }

    /// セル数から見た公称電圧帯 [V]（満充電～公称）
    pub fn nominal_band(&self) -> (f32, f32) {
        let cells = self.cell_count as f32;
        (cells * CELL_NOMINAL_VOLTAGE, cells * CELL_FULL_VOLTAGE)
    }

    /// 制御周期 [s]
    pub fn period_s(&self) -> f32 {
        1.0 / self.control_frequency_hz as f32
    }

    /// 有効なチャネル数
    pub fn active_channels(&self) -> usize {
        (self.channel_count as usize).min(MAX_CHANNELS)
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 || self.channel_count as usize > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannelCount(self.channel_count));
        }
        if self.control_frequency_hz == 0 {
            return Err(ConfigError::ZeroControlFrequency);
        }
        if self.pole_pairs == 0 {
            return Err(ConfigError::ZeroPolePairs);
        }
        if self.encoder_counts_per_rev == 0 || self.encoder_counts_per_rev > i32::MAX as u32 {
            return Err(ConfigError::InvalidCountsPerRev(self.encoder_counts_per_rev));
        }
        if !(self.max_duty > 0.0 && self.max_duty <= 1.0) {
            return Err(ConfigError::InvalidMaxDuty);
        }
        if !(self.safe_duty >= 0.0 && self.safe_duty <= self.max_duty) {
            return Err(ConfigError::InvalidSafeDuty);
        }
        if !(self.undervoltage_threshold >= 0.0
            && self.undervoltage_threshold < self.overvoltage_threshold)
        {
            return Err(ConfigError::InvertedVoltageThresholds);
        }
        if !(self.max_current > 0.0 && self.overcurrent_threshold > 0.0) {
            return Err(ConfigError::InvalidCurrentLimit);
        }
        if self.max_speed <= 0.0 || self.reference_ramp_per_s <= 0.0 {
            return Err(ConfigError::InvalidReferenceScaling);
        }
        if !(self.velocity_filter_alpha > 0.0 && self.velocity_filter_alpha <= 1.0) {
            return Err(ConfigError::InvalidFilterAlpha);
        }
        if self.fault_debounce_count == 0 || self.recovery_debounce_count == 0 {
            return Err(ConfigError::ZeroDebounceCount);
        }
        let range = &self.command_pulse_range;
        if !(range.min_us > 0.0 && range.min_us < range.neutral_us && range.neutral_us < range.max_us)
            || self.command_pulse_tolerance_us < 0.0
            || !(0.0..1.0).contains(&self.command_deadband)
        {
            return Err(ConfigError::InvalidPulseRange);
        }
        if self.command_timeout_periods == 0 {
            return Err(ConfigError::ZeroCommandTimeout);
        }
        if self.brake_resistor_enabled
            && !(self.brake_threshold > self.undervoltage_threshold
                && self.brake_hysteresis >= 0.0
                && self.brake_hysteresis < self.brake_threshold
                && self.brake_full_duty_span > 0.0
                && (0.0..=1.0).contains(&self.brake_min_duty)
                && self.resistor.resistance_ohm > 0.0
                && self.resistor.time_constant_s > 0.0)
        {
            return Err(ConfigError::InvalidBrakeSettings);
        }
        let adc = &self.adc;
        if adc.adc_max == 0
            || adc.bus_r_lower <= 0.0
            || adc.phase_volts_per_amp <= 0.0
            || adc.temp_volts_per_c <= 0.0
            || !(adc.bus_filter_alpha > 0.0 && adc.bus_filter_alpha <= 1.0)
            || !(adc.sensed_phases == 2 || adc.sensed_phases == 3)
        {
            return Err(ConfigError::InvalidAdcScaling);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_cells(DEFAULT_CELL_COUNT)
    }
}

/// 設定の検証エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    InvalidChannelCount(u8),
    ZeroControlFrequency,
    ZeroPolePairs,
    InvalidCountsPerRev(u32),
    InvalidMaxDuty,
    InvalidSafeDuty,
    InvertedVoltageThresholds,
    InvalidCurrentLimit,
    InvalidReferenceScaling,
    InvalidFilterAlpha,
    ZeroDebounceCount,
    InvalidPulseRange,
    ZeroCommandTimeout,
    InvalidBrakeSettings,
    InvalidAdcScaling,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannelCount(n) => write!(f, "channel count must be 1 or 2, got {}", n),
            Self::ZeroControlFrequency => f.write_str("control frequency must be nonzero"),
            Self::ZeroPolePairs => f.write_str("pole pair count must be nonzero"),
            Self::InvalidCountsPerRev(n) => write!(f, "invalid encoder counts per revolution: {}", n),
            Self::InvalidMaxDuty => f.write_str("max duty must be in (0, 1]"),
            Self::InvalidSafeDuty => f.write_str("safe duty must be in [0, max duty]"),
            Self::InvertedVoltageThresholds => {
                f.write_str("undervoltage threshold must be below overvoltage threshold")
            }
            Self::InvalidCurrentLimit => f.write_str("current limits must be positive"),
            Self::InvalidReferenceScaling => f.write_str("speed scale and reference ramp must be positive"),
            Self::InvalidFilterAlpha => f.write_str("velocity filter coefficient must be in (0, 1]"),
            Self::ZeroDebounceCount => f.write_str("debounce counts must be nonzero"),
            Self::InvalidPulseRange => f.write_str("command pulse range must satisfy min < neutral < max"),
            Self::ZeroCommandTimeout => f.write_str("command timeout must be nonzero"),
            Self::InvalidBrakeSettings => f.write_str("invalid brake resistor settings"),
            Self::InvalidAdcScaling => f.write_str("invalid ADC scaling"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_thresholds_follow_cell_count() {
        let config = Config::for_cells(10);
        let (low, high) = config.nominal_band();
        assert!((low - 37.0).abs() < 1e-4);
        assert!((high - 42.0).abs() < 1e-4);
        assert!((config.brake_threshold - 42.0).abs() < 1e-4);
        assert!(config.overvoltage_threshold > high);
        assert!(config.undervoltage_threshold < low);
    }

    #[test]
    fn test_rejects_zero_pole_pairs() {
        let config = Config {
            pole_pairs: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPolePairs));
    }

    #[test]
    fn test_rejects_zero_counts_per_rev() {
        let config = Config {
            encoder_counts_per_rev: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidCountsPerRev(0)));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let config = Config {
            undervoltage_threshold: 45.0,
            overvoltage_threshold: 40.0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvertedVoltageThresholds));
    }

    #[test]
    fn test_rejects_bad_channel_count() {
        let config = Config {
            channel_count: 3,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidChannelCount(3)));
    }

    #[test]
    fn test_rejects_unordered_pulse_range() {
        let config = Config {
            command_pulse_range: PulseRange {
                min_us: 1500.0,
                neutral_us: 1500.0,
                max_us: 2000.0,
            },
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPulseRange));
    }
}
