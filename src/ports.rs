//! ハードウェア境界のインターフェース
//!
//! 制御コアはレジスタへ直接触れず、ここで定義するポート経由でのみ
//! サンプル取得とPWM出力を行う。ファームウェアは実ペリフェラルで、
//! テストはシミュレーションボードで実装する。

/// ADC conversion results of one channel for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdcFrame {
    /// Phase current counts (U, V, W). W is ignored when only two phases are sensed.
    pub phase_counts: [u16; 3],
    /// Board temperature sensor counts
    pub temperature_counts: u16,
    /// Conversion finished since the previous period
    pub complete: bool,
    /// Conversion timestamp [µs], wrapping
    pub timestamp_us: u32,
}

/// Three-phase duty vector, each phase in `[0, max_duty]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DutyVector {
    pub u: f32,
    pub v: f32,
    pub w: f32,
}

impl DutyVector {
    pub const fn uniform(duty: f32) -> Self {
        Self {
            u: duty,
            v: duty,
            w: duty,
        }
    }

    /// Largest phase duty
    pub fn peak(&self) -> f32 {
        self.u.max(self.v).max(self.w)
    }

    /// Clamp every phase into `[0, max_duty]`
    pub fn clamped(self, max_duty: f32) -> Self {
        Self {
            u: self.u.clamp(0.0, max_duty),
            v: self.v.clamp(0.0, max_duty),
            w: self.w.clamp(0.0, max_duty),
        }
    }
}

/// 電流・電圧・温度のサンプル源
pub trait SampleSource {
    /// 共有DCバス電圧のADC生値。変換未完了なら `None`
    fn read_bus(&mut self) -> Option<u16>;

    /// チャネルの相電流・温度のADC生値
    fn read_phases(&mut self, channel: usize) -> AdcFrame;
}

/// 直交エンコーダのエッジ源
pub trait EncoderSource {
    /// 前回呼び出しからのエッジ数（符号付き）
    fn read_edges(&mut self, channel: usize) -> i32;
}

/// 指令信号源
pub trait CommandSource {
    /// 前回呼び出し以降に確定したパルス幅 [µs]。新しいパルスが無ければ `None`
    fn poll_pulse(&mut self, channel: usize) -> Option<u32>;
}

/// 3相PWM出力
pub trait PwmSink {
    /// 全チャネルのデューティを同一周期内にまとめて反映する
    fn apply_duties(&mut self, duties: &[DutyVector]);
}

/// ブレーキ抵抗スイッチ
pub trait BrakeSink {
    /// デューティ 0.0～1.0
    fn set_brake_duty(&mut self, duty: f32);
}
