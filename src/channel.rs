//! モーターチャネル
//!
//! 1チャネル分の状態と処理段（取り込み → エンコーダ → 指令 → 故障監視 → FOC）を
//! まとめる。チャネル間で状態は共有しない。

use crate::acquisition::{SampleFrame, SignalAcquisition};
use crate::bus_voltage::BusVoltage;
use crate::command::{CommandDecoder, Reference};
use crate::config::Config;
use crate::encoder::EncoderEstimator;
use crate::foc::{FieldOrientedController, FocInputs};
use crate::ports::{AdcFrame, DutyVector};
use crate::safety::{FaultState, SafetyInputs, SafetyMonitor};

/// Per-channel control state, kept for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    /// Multi-turn mechanical position [rad]
    pub mechanical_position: f32,
    /// Mechanical velocity [rad/s]
    pub velocity: f32,
    /// Electrical angle [rad], [0, 2π)
    pub electrical_angle: f32,
    /// Last decoded command
    pub reference: Reference,
    /// Controller duty request before the fault override
    pub duty: DutyVector,
    pub id: f32,
    pub iq: f32,
}

/// Raw inputs of one channel for one period
pub struct ChannelInputs<'a> {
    pub adc: &'a AdcFrame,
    pub bus: BusVoltage,
    pub encoder_edges: i32,
    pub command_pulse_us: Option<u32>,
    /// Brake resistor overtemperature from the previous period
    pub resistor_overtemp: bool,
}

pub struct MotorChannel {
    safe_duty: DutyVector,
    state: ControlState,
    acquisition: SignalAcquisition,
    encoder: EncoderEstimator,
    decoder: CommandDecoder,
    monitor: SafetyMonitor,
    foc: FieldOrientedController,
}

impl MotorChannel {
    pub fn new(index: u8, config: &Config) -> Self {
        let calibration = config.channels[index as usize];
        let mut encoder = EncoderEstimator::new(
            config.encoder_counts_per_rev,
            config.pole_pairs,
            config.period_s(),
            config.velocity_filter_alpha,
            config.encoder_loss_periods,
        );
        encoder.set_calibration(calibration.electrical_offset, calibration.direction_inversed);

        Self {
            safe_duty: DutyVector::uniform(config.safe_duty),
            state: ControlState::default(),
            acquisition: SignalAcquisition::new(&config.adc, config.offset_calibration_samples),
            encoder,
            decoder: CommandDecoder::new(config),
            monitor: SafetyMonitor::new(index, config),
            foc: FieldOrientedController::new(config),
        }
    }

    /// 1周期分の処理
    ///
    /// # Returns
    /// 故障判定後の状態と、制御器が要求するデューティ（上書き前）
    pub fn step(&mut self, inputs: &ChannelInputs) -> (FaultState, DutyVector) {
        // 1. 信号取り込み
        let frame: SampleFrame = self
            .acquisition
            .acquire(inputs.adc, inputs.bus, inputs.command_pulse_us);

        // 2. エンコーダ（前周期の指令で信号喪失判定）
        let commanded = self.state.reference.value != 0.0;
        let estimate = self.encoder.update(inputs.encoder_edges, commanded);

        // 3. 指令デコード
        let reference = self.decoder.update(frame.command_pulse_us);

        // 4. 故障監視
        let fault = self.monitor.evaluate(&SafetyInputs {
            bus_voltage: frame.bus_voltage,
            peak_current: frame.peak_current(),
            stale_sample: !frame.valid,
            encoder_signal_loss: estimate.signal_loss,
            resistor_overtemp: inputs.resistor_overtemp,
            calibrated: self.acquisition.is_calibrated(),
        });

        // 5. FOC（Normal 以外では積分器とランプをリセット）
        let (duty, id, iq) = if fault.is_normal() {
            let output = self.foc.update(&FocInputs {
                currents: frame.currents,
                electrical_angle: estimate.electrical_angle,
                velocity: estimate.velocity,
                bus_voltage: frame.bus_voltage_filtered,
                reference: reference.value,
            });
            (output.duty, output.id, output.iq)
        } else {
            self.foc.reset();
            (self.safe_duty, 0.0, 0.0)
        };

        self.state = ControlState {
            mechanical_position: self.encoder.position(),
            velocity: estimate.velocity,
            electrical_angle: estimate.electrical_angle,
            reference,
            duty,
            id,
            iq,
        };

        (fault, duty)
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn is_calibrated(&self) -> bool {
        self.acquisition.is_calibrated()
    }
}
