//! 制御コアのポートをペリフェラルに接続する
//!
//! ## ピン割り当て
//! - チャネル0 相電流: PA0/PA1/PA2 (ADC1)、温度: PB12 (ADC1_IN11)
//! - チャネル1 相電流: PA6/PA7/PC4 (ADC2)、温度: PB2 (ADC2_IN12)
//! - バス電圧: PC1 (ADC1_IN7)
//!
//! ADCの変換はハードウェアが進める（`adc_seq`）。制御ループは完了フラグを見て読むだけ
//! - チャネル0 PWM: TIM1 (PE9/PE8, PE11/PE10, PE13/PE12)
//! - チャネル1 PWM: TIM8 (PC6/PC10, PC7/PC11, PC8/PC12)

use embassy_stm32::{
    adc::Adc,
    peripherals::{ADC1, ADC2, TIM1, TIM8},
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use embassy_time::Instant;
use g4_torque_driver::command::HandoffReader;
use g4_torque_driver::config::MAX_CHANNELS;
use g4_torque_driver::ports::{
    AdcFrame, BrakeSink, CommandSource, DutyVector, EncoderSource, PwmSink, SampleSource,
};

use crate::adc_seq::{BusConversion, PhaseSequence};
use crate::brake_tim;
use crate::command_tim::COMMAND_HANDOFF;
use crate::encoder_tim::EncoderCounters;

/// 3相PWM出力（TIM1 / TIM8）
struct PhasePwm<'d, T: embassy_stm32::timer::AdvancedInstance4Channel> {
    pwm: ComplementaryPwm<'d, T>,
    max_duty: u16,
}

impl<'d, T: embassy_stm32::timer::AdvancedInstance4Channel> PhasePwm<'d, T> {
    fn new(pwm: ComplementaryPwm<'d, T>) -> Self {
        let max_duty = pwm.get_max_duty();
        Self { pwm, max_duty }
    }

    fn counts(&self, duty: f32) -> u16 {
        (duty.clamp(0.0, 1.0) * self.max_duty as f32) as u16
    }

    fn set(&mut self, duty: &DutyVector) {
        let (u, v, w) = (self.counts(duty.u), self.counts(duty.v), self.counts(duty.w));
        self.pwm.set_duty(Channel::Ch1, u);
        self.pwm.set_duty(Channel::Ch2, v);
        self.pwm.set_duty(Channel::Ch3, w);
    }
}

pub struct Board {
    // 有効化したADCを保持する（drop で無効化されないように）
    _adcs: (Adc<'static, ADC1>, Adc<'static, ADC2>),
    sequences: [PhaseSequence; MAX_CHANNELS],
    bus: BusConversion,
    pwm0: PhasePwm<'static, TIM1>,
    pwm1: PhasePwm<'static, TIM8>,
    encoders: EncoderCounters,
    readers: [HandoffReader; MAX_CHANNELS],
}

impl Board {
    pub fn new(
        adcs: (Adc<'static, ADC1>, Adc<'static, ADC2>),
        sequences: [PhaseSequence; MAX_CHANNELS],
        bus: BusConversion,
        pwm0: ComplementaryPwm<'static, TIM1>,
        pwm1: ComplementaryPwm<'static, TIM8>,
    ) -> Self {
        Self {
            _adcs: adcs,
            sequences,
            bus,
            pwm0: PhasePwm::new(pwm0),
            pwm1: PhasePwm::new(pwm1),
            encoders: EncoderCounters::new(),
            readers: [HandoffReader::new(), HandoffReader::new()],
        }
    }
}

impl SampleSource for Board {
    fn read_bus(&mut self) -> Option<u16> {
        self.bus.take()
    }

    fn read_phases(&mut self, channel: usize) -> AdcFrame {
        let timestamp_us = Instant::now().as_micros() as u32;
        self.sequences[channel].read(timestamp_us)
    }
}

impl EncoderSource for Board {
    fn read_edges(&mut self, channel: usize) -> i32 {
        self.encoders.read_edges(channel)
    }
}

impl CommandSource for Board {
    fn poll_pulse(&mut self, channel: usize) -> Option<u32> {
        self.readers[channel].take(&COMMAND_HANDOFF[channel])
    }
}

impl PwmSink for Board {
    fn apply_duties(&mut self, duties: &[DutyVector]) {
        // プリロード有効なので、同じ周期内に書けば次の更新イベントで揃って反映される
        if let Some(duty) = duties.first() {
            self.pwm0.set(duty);
        }
        if let Some(duty) = duties.get(1) {
            self.pwm1.set(duty);
        }
    }
}

impl BrakeSink for Board {
    fn set_brake_duty(&mut self, duty: f32) {
        brake_tim::set_duty(duty);
    }
}
