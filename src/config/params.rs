//! モーター制御とハードウェアの設定パラメータ（デフォルト値）
//!
//! ここの値はボード・バッテリー依存の初期値であり、`Config` で上書きできる。

/// 制御周波数 [Hz]（PWMキャリア 20kHz の 1/2）
pub const DEFAULT_CONTROL_FREQUENCY_HZ: u32 = 10_000;

/// 直列セル数（10S = 公称 37V）
pub const DEFAULT_CELL_COUNT: u8 = 10;

/// セル電圧 [V/cell]
pub const CELL_NOMINAL_VOLTAGE: f32 = 3.7;
pub const CELL_FULL_VOLTAGE: f32 = 4.2;
pub const CELL_CUTOFF_VOLTAGE: f32 = 3.3;

/// ホバーボードモーターの極対数（30極 / 2）
pub const DEFAULT_POLE_PAIRS: u8 = 15;

/// エンコーダの1回転あたりカウント数（4逓倍後）
pub const DEFAULT_ENCODER_COUNTS_PER_REV: u32 = 4096;

/// 電流PIゲイン（帯域 ~500Hz, L=0.2mH, R=0.2Ω 想定）
pub const DEFAULT_CURRENT_KP: f32 = 0.6;
pub const DEFAULT_CURRENT_KI: f32 = 600.0;

/// 速度PIゲイン [A/(rad/s)]
pub const DEFAULT_SPEED_KP: f32 = 0.05;
pub const DEFAULT_SPEED_KI: f32 = 0.6;

/// 最大デューティ比（0.0～1.0、ブートストラップ充電のため 1.0 未満）
pub const DEFAULT_MAX_DUTY: f32 = 0.95;

/// 最大q軸電流 [A]
pub const DEFAULT_MAX_CURRENT: f32 = 10.0;

/// 過電流しきい値 [A]
pub const DEFAULT_OVERCURRENT_THRESHOLD: f32 = 15.0;

/// 速度指令のフルスケール [rad/s]（機械角）
pub const DEFAULT_MAX_SPEED: f32 = 100.0;

/// 指令ランプ [フルスケール/s]
pub const DEFAULT_REFERENCE_RAMP_PER_S: f32 = 20.0;

/// エンコーダ速度フィルタ係数
pub const DEFAULT_VELOCITY_FILTER_ALPHA: f32 = 0.05;

/// 故障判定のデバウンス周期数
pub const DEFAULT_FAULT_DEBOUNCE_COUNT: u16 = 3;

/// 故障復帰に必要な連続正常周期数（10kHzで 50ms）
pub const DEFAULT_RECOVERY_DEBOUNCE_COUNT: u16 = 500;

/// エンコーダ信号喪失判定の周期数（10kHzで 200ms）
pub const DEFAULT_ENCODER_LOSS_PERIODS: u32 = 2_000;

/// 安全デューティ（全相）
pub const DEFAULT_SAFE_DUTY: f32 = 0.0;

/// ブレーキ抵抗パラメータ
pub mod brake {
    /// 動作開始からの超過分がこの値でデューティ 100% [V]
    pub const DEFAULT_FULL_DUTY_SPAN: f32 = 4.0;

    /// ヒステリシス幅 [V]
    pub const DEFAULT_HYSTERESIS: f32 = 0.5;

    /// 動作中に保持する最小デューティ（解除電圧まで下がるまで）
    pub const DEFAULT_MIN_ENGAGED_DUTY: f32 = 0.05;

    /// 抵抗値 [Ω]
    pub const DEFAULT_RESISTANCE_OHM: f32 = 4.7;

    /// 熱抵抗 [K/W]
    pub const DEFAULT_THERMAL_RESISTANCE: f32 = 2.5;

    /// 熱時定数 [s]
    pub const DEFAULT_THERMAL_TIME_CONSTANT_S: f32 = 60.0;

    /// 周囲温度 [°C]
    pub const DEFAULT_AMBIENT_C: f32 = 25.0;

    /// 許容温度 [°C]
    pub const DEFAULT_MAX_TEMPERATURE_C: f32 = 150.0;

    /// 過熱解除のヒステリシス [°C]
    pub const OVERTEMP_RELEASE_BAND_C: f32 = 10.0;
}

/// 指令パルス（RCサーボ互換）
pub mod command {
    /// パルス幅 [µs]
    pub const DEFAULT_MIN_US: f32 = 1_000.0;
    pub const DEFAULT_NEUTRAL_US: f32 = 1_500.0;
    pub const DEFAULT_MAX_US: f32 = 2_000.0;

    /// 範囲外として棄却するまでの余裕 [µs]
    pub const DEFAULT_TOLERANCE_US: f32 = 200.0;

    /// ニュートラル付近の不感帯（正規化値）
    pub const DEFAULT_DEADBAND: f32 = 0.02;

    /// 指令喪失判定の周期数（10kHzで 100ms）
    pub const DEFAULT_TIMEOUT_PERIODS: u32 = 1_000;

    /// ソフトウェアポーリング周期 [Hz]
    pub const POLL_FREQUENCY_HZ: u32 = 20_000;

    /// ポーリング方式のパルス幅分解能 [µs]（1–2ms の指令で約 0.1 刻み）
    pub const POLL_RESOLUTION_US: u32 = 1_000_000 / POLL_FREQUENCY_HZ;
}

/// ADC変換パラメータ
pub mod adc {
    /// 12ビットADC
    pub const ADC_MAX: u16 = 4096;

    /// ADC基準電圧 [V]
    pub const VREF: f32 = 3.3;

    /// バス電圧分圧抵抗 [Ω]
    pub const BUS_R_UPPER: f32 = 68_000.0;
    pub const BUS_R_LOWER: f32 = 4_700.0;

    /// バス電圧フィルタ係数
    pub const BUS_FILTER_ALPHA: f32 = 0.2;

    /// 電流センス: シャント 3mΩ × OPAMP 16倍 → 1A あたり 48mV
    pub const PHASE_VOLTS_PER_AMP: f32 = 0.048;

    /// 無電流時のオフセット（中点）[counts]
    pub const PHASE_OFFSET_COUNTS: u16 = 2048;

    /// 電流センサのフルスケール [A]
    pub const PHASE_FULL_SCALE_A: f32 = 30.0;

    /// 温度センサ（MCP9700: 10mV/°C, 0°C で 500mV）
    pub const TEMP_VOLTS_PER_C: f32 = 0.010;
    pub const TEMP_VOLTS_AT_ZERO_C: f32 = 0.5;

    /// 温度センサの上限 [°C]
    pub const TEMP_CEILING_C: f32 = 125.0;

    /// 起動時オフセットキャリブレーションのサンプル数
    pub const DEFAULT_OFFSET_CALIBRATION_SAMPLES: u16 = 1_024;
}
