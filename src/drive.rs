//! 制御周期の実行
//!
//! 設定・チャネル群・共有モニタを保持し、1周期ごとに
//! 信号取り込み → エンコーダ → 指令 → 故障監視 → FOC → ブレーキ → PWM出力
//! の順で処理する。チャネル間で共有するのはバス電圧と抵抗過熱のみ。

use crate::actuation::ActuationOutput;
use crate::brake::BrakeResistorModulator;
use crate::bus_voltage::BusVoltageMonitor;
use crate::channel::{ChannelInputs, ControlState, MotorChannel};
use crate::config::{Config, ConfigError, MAX_CHANNELS};
use crate::ports::{BrakeSink, CommandSource, DutyVector, EncoderSource, PwmSink, SampleSource};
use crate::safety::FaultState;

/// One channel's result for one period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReport {
    pub state: ControlState,
    pub fault: FaultState,
    /// Duty actually written (after the fault override)
    pub duty: DutyVector,
}

impl Default for ChannelReport {
    fn default() -> Self {
        Self {
            state: ControlState::default(),
            fault: FaultState::arming(),
            duty: DutyVector::default(),
        }
    }
}

/// Result of one control period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub bus_voltage: f32,
    pub brake_duty: f32,
    pub channel_count: usize,
    pub channels: [ChannelReport; MAX_CHANNELS],
}

impl TickReport {
    pub fn active(&self) -> &[ChannelReport] {
        &self.channels[..self.channel_count]
    }
}

/// Dual-channel torque drive
pub struct Drive {
    config: Config,
    bus: BusVoltageMonitor,
    channels: [MotorChannel; MAX_CHANNELS],
    brake: BrakeResistorModulator,
    actuation: ActuationOutput,
}

impl Drive {
    /// 設定を検証してドライブを構築
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        info!(
            "Drive: {} channel(s), {}Hz, mode={}, cells={}",
            config.channel_count,
            config.control_frequency_hz,
            config.control_mode,
            config.cell_count
        );
        info!(
            "Thresholds: UV={}V, OV={}V, OC={}A, brake={}V",
            config.undervoltage_threshold,
            config.overvoltage_threshold,
            config.overcurrent_threshold,
            config.brake_threshold
        );

        Ok(Self {
            bus: BusVoltageMonitor::new(&config.adc),
            channels: [MotorChannel::new(0, &config), MotorChannel::new(1, &config)],
            brake: BrakeResistorModulator::new(&config),
            actuation: ActuationOutput::new(&config),
            config,
        })
    }

    /// 1制御周期を実行
    pub fn tick<H>(&mut self, hw: &mut H) -> TickReport
    where
        H: SampleSource + EncoderSource + CommandSource + PwmSink + BrakeSink,
    {
        let channel_count = self.config.active_channels();

        // バス電圧は全チャネル共通で1回だけ読む
        let bus = self.bus.update(hw.read_bus());
        let resistor_overtemp = self.brake.is_overtemp();

        let mut channels = [ChannelReport::default(); MAX_CHANNELS];
        for (index, channel) in self.channels[..channel_count].iter_mut().enumerate() {
            let adc = hw.read_phases(index);
            let inputs = ChannelInputs {
                adc: &adc,
                bus,
                encoder_edges: hw.read_edges(index),
                command_pulse_us: hw.poll_pulse(index),
                resistor_overtemp,
            };

            let (fault, requested) = channel.step(&inputs);
            let duty = self.actuation.compose(index, &fault, requested);

            channels[index] = ChannelReport {
                state: *channel.state(),
                fault,
                duty,
            };
        }

        // ブレーキはチャネルの故障状態に関係なく、今周期の電圧で動作
        let brake_duty = self.brake.update(bus.instantaneous);

        self.actuation.apply(hw, brake_duty);

        TickReport {
            bus_voltage: bus.voltage,
            brake_duty,
            channel_count,
            channels,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channel(&self, index: usize) -> Option<&MotorChannel> {
        self.channels[..self.config.active_channels()].get(index)
    }

    pub fn brake(&self) -> &BrakeResistorModulator {
        &self.brake
    }
}
