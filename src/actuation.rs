//! PWM出力
//!
//! 全チャネルのデューティを確定してから1回の書き込みで反映し、
//! 同じ周期のうちにブレーキ抵抗のデューティも出力する。

use crate::config::{Config, MAX_CHANNELS};
use crate::ports::{BrakeSink, DutyVector, PwmSink};
use crate::safety::FaultState;

pub struct ActuationOutput {
    channel_count: usize,
    max_duty: f32,
    safe_duty: f32,
    duties: [DutyVector; MAX_CHANNELS],
}

impl ActuationOutput {
    pub fn new(config: &Config) -> Self {
        let safe_duty = config.safe_duty.clamp(0.0, config.max_duty);
        Self {
            channel_count: config.active_channels(),
            max_duty: config.max_duty,
            safe_duty,
            duties: [DutyVector::uniform(safe_duty); MAX_CHANNELS],
        }
    }

    /// チャネルの最終デューティを確定
    ///
    /// `Normal` 以外では制御器の出力に関係なく全相を安全デューティにする。
    pub fn compose(&mut self, channel: usize, fault: &FaultState, requested: DutyVector) -> DutyVector {
        let duty = if fault.is_normal() {
            requested.clamped(self.max_duty)
        } else {
            DutyVector::uniform(self.safe_duty)
        };
        self.duties[channel] = duty;
        duty
    }

    /// 確定したデューティとブレーキデューティを出力
    pub fn apply<S: PwmSink + BrakeSink>(&self, sink: &mut S, brake_duty: f32) {
        sink.apply_duties(&self.duties[..self.channel_count]);
        sink.set_brake_duty(brake_duty.clamp(0.0, 1.0));
    }

    pub fn duties(&self) -> &[DutyVector] {
        &self.duties[..self.channel_count]
    }
}
