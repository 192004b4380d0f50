//! 指令デコーダ
//!
//! RCサーボ形式のパルス幅を正規化指令に変換する。
//! パルス幅の取得方式（インプットキャプチャ／ソフトウェアポーリング）は
//! `capture` / `polled` にあり、どちらも `CommandHandoff` 経由で制御周期に渡される。

pub mod capture;
pub mod polled;

pub use capture::PulseCapture;
pub use polled::{CommandHandoff, HandoffReader, PolledPulseDemodulator};

use crate::config::{CommandDirection, Config, PulseRange};

/// Decoded reference for one control period
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reference {
    /// Normalized command: [-1, 1] bidirectional, [0, 1] unidirectional
    pub value: f32,
    /// No valid pulse within the timeout; `value` is neutral
    pub stale: bool,
}

/// パルス幅 → 正規化指令
pub struct CommandDecoder {
    range: PulseRange,
    tolerance_us: f32,
    direction: CommandDirection,
    deadband: f32,
    timeout_periods: u32,
    /// 直近3パルス（メディアンフィルタ用）
    history: [f32; 3],
    history_pos: usize,
    value: f32,
    /// 有効パルスが無かった連続周期数
    idle_periods: u32,
    stale: bool,
}

impl CommandDecoder {
    pub fn new(config: &Config) -> Self {
        let neutral = config.command_pulse_range.neutral_us;
        Self {
            range: config.command_pulse_range,
            tolerance_us: config.command_pulse_tolerance_us,
            direction: config.command_direction,
            deadband: config.command_deadband,
            timeout_periods: config.command_timeout_periods,
            history: [neutral; 3],
            history_pos: 0,
            value: 0.0,
            idle_periods: config.command_timeout_periods,
            // 起動直後は信号を受けるまでニュートラル
            stale: true,
        }
    }

    /// 1制御周期分の更新
    ///
    /// # Arguments
    /// * `pulse_us` - 前周期以降に確定したパルス幅 [µs]
    pub fn update(&mut self, pulse_us: Option<u32>) -> Reference {
        let width = pulse_us.map(|w| w as f32).filter(|&w| self.is_plausible(w));

        match width {
            Some(width) => {
                if self.stale {
                    // 復帰直後は古い履歴を使わない
                    self.history = [width; 3];
                    self.stale = false;
                    info!("Command signal acquired: {}us", width);
                } else {
                    self.history[self.history_pos] = width;
                }
                self.history_pos = (self.history_pos + 1) % self.history.len();
                self.idle_periods = 0;
                self.value = self.normalize(median3(self.history));
            }
            None => {
                self.idle_periods = self.idle_periods.saturating_add(1);
                if self.idle_periods > self.timeout_periods && !self.stale {
                    self.stale = true;
                    self.value = 0.0;
                    warn!(
                        "Command signal lost for {} periods, falling back to neutral",
                        self.idle_periods
                    );
                }
            }
        }

        self.reference()
    }

    pub fn reference(&self) -> Reference {
        Reference {
            value: self.value,
            stale: self.stale,
        }
    }

    fn is_plausible(&self, width: f32) -> bool {
        width >= self.range.min_us - self.tolerance_us
            && width <= self.range.max_us + self.tolerance_us
    }

    /// パルス幅を指令値に線形変換（範囲外はクランプ、デッドバンド適用）
    pub fn normalize(&self, width: f32) -> f32 {
        let range = &self.range;
        match self.direction {
            CommandDirection::Bidirectional => {
                let raw = if width >= range.neutral_us {
                    (width - range.neutral_us) / (range.max_us - range.neutral_us)
                } else {
                    (width - range.neutral_us) / (range.neutral_us - range.min_us)
                };
                let raw = raw.clamp(-1.0, 1.0);
                let magnitude = apply_deadband(raw.abs(), self.deadband);
                if raw < 0.0 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            CommandDirection::Unidirectional => {
                let raw = ((width - range.min_us) / (range.max_us - range.min_us)).clamp(0.0, 1.0);
                apply_deadband(raw, self.deadband)
            }
        }
    }
}

/// デッドバンド内はゼロ、外側は 0..1 に再スケールして連続にする
fn apply_deadband(magnitude: f32, deadband: f32) -> f32 {
    if magnitude <= deadband {
        0.0
    } else {
        (magnitude - deadband) / (1.0 - deadband)
    }
}

fn median3([a, b, c]: [f32; 3]) -> f32 {
    a.max(b).min(a.min(b).max(c))
}
