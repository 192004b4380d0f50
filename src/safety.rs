//! 故障検出とラッチ
//!
//! 条件ごとにデバウンスカウンタを持ち、所定周期連続で成立したらフラグを立てる。
//! フラグが1つでも立てば即座に `Faulted`、全フラグ解除で `Recovering`、
//! 解除状態が回復デバウンス周期続けば `Normal` に戻る。

use crate::config::Config;

/// 故障フラグ（ビットセット）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultFlags(u8);

impl FaultFlags {
    pub const NONE: Self = Self(0);
    pub const OVERVOLTAGE: Self = Self(1 << 0);
    pub const UNDERVOLTAGE: Self = Self(1 << 1);
    pub const OVERCURRENT: Self = Self(1 << 2);
    pub const ENCODER_SIGNAL_LOSS: Self = Self(1 << 3);
    pub const STALE_SAMPLE: Self = Self(1 << 4);
    pub const RESISTOR_OVERTEMP: Self = Self(1 << 5);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

/// Fault latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LatchState {
    Normal,
    Faulted,
    Recovering,
}

/// チャネルごとの故障状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultState {
    pub flags: FaultFlags,
    pub latch: LatchState,
}

impl FaultState {
    /// 起動直後は回復待ち（アーミング期間）
    pub const fn arming() -> Self {
        Self {
            flags: FaultFlags::NONE,
            latch: LatchState::Recovering,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.latch == LatchState::Normal
    }
}

/// One period of measurements for the monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyInputs {
    pub bus_voltage: f32,
    /// Largest absolute phase current [A]
    pub peak_current: f32,
    pub stale_sample: bool,
    pub encoder_signal_loss: bool,
    pub resistor_overtemp: bool,
    /// Current offset calibration finished
    pub calibrated: bool,
}

/// 評価順（デバウンスカウンタの添字）
const CONDITIONS: [FaultFlags; 6] = [
    FaultFlags::OVERVOLTAGE,
    FaultFlags::UNDERVOLTAGE,
    FaultFlags::OVERCURRENT,
    FaultFlags::ENCODER_SIGNAL_LOSS,
    FaultFlags::STALE_SAMPLE,
    FaultFlags::RESISTOR_OVERTEMP,
];

/// 故障監視
pub struct SafetyMonitor {
    channel: u8,
    overvoltage: f32,
    undervoltage: f32,
    overcurrent: f32,
    fault_debounce: u16,
    recovery_debounce: u16,
    counters: [u16; CONDITIONS.len()],
    clean_periods: u16,
    state: FaultState,
}

impl SafetyMonitor {
    pub fn new(channel: u8, config: &Config) -> Self {
        Self {
            channel,
            overvoltage: config.overvoltage_threshold,
            undervoltage: config.undervoltage_threshold,
            overcurrent: config.overcurrent_threshold,
            fault_debounce: config.fault_debounce_count.max(1),
            recovery_debounce: config.recovery_debounce_count.max(1),
            counters: [0; CONDITIONS.len()],
            clean_periods: 0,
            state: FaultState::arming(),
        }
    }

    /// 1周期分の評価
    ///
    /// 無効サンプルの周期は電圧・電流の判定を保留し、カウンタとフラグを保持する。
    pub fn evaluate(&mut self, inputs: &SafetyInputs) -> FaultState {
        let measured = !inputs.stale_sample;
        let present = [
            measured.then_some(inputs.bus_voltage > self.overvoltage),
            measured.then_some(inputs.bus_voltage < self.undervoltage),
            measured.then_some(inputs.peak_current > self.overcurrent),
            Some(inputs.encoder_signal_loss),
            Some(inputs.stale_sample),
            Some(inputs.resistor_overtemp),
        ];

        let mut flags = self.state.flags;
        for ((flag, condition), counter) in CONDITIONS
            .iter()
            .zip(present)
            .zip(self.counters.iter_mut())
        {
            match condition {
                Some(true) => {
                    *counter = counter.saturating_add(1);
                    if *counter >= self.fault_debounce {
                        flags.insert(*flag);
                    }
                }
                Some(false) => {
                    *counter = 0;
                    flags.remove(*flag);
                }
                None => {}
            }
        }

        let previous = self.state.latch;
        let latch = if !flags.is_empty() {
            self.clean_periods = 0;
            LatchState::Faulted
        } else {
            match previous {
                LatchState::Faulted => {
                    self.clean_periods = 0;
                    LatchState::Recovering
                }
                LatchState::Recovering => {
                    self.clean_periods = self.clean_periods.saturating_add(1);
                    if self.clean_periods >= self.recovery_debounce && inputs.calibrated {
                        LatchState::Normal
                    } else {
                        LatchState::Recovering
                    }
                }
                LatchState::Normal => LatchState::Normal,
            }
        };

        if latch != previous {
            match latch {
                LatchState::Faulted => error!(
                    "Channel {}: FAULT (flags={:#x}, bus={}V, peak={}A)",
                    self.channel,
                    flags.bits(),
                    inputs.bus_voltage,
                    inputs.peak_current
                ),
                LatchState::Recovering => {
                    warn!("Channel {}: faults cleared, recovering", self.channel)
                }
                LatchState::Normal => info!("Channel {}: armed", self.channel),
            }
        }

        self.state = FaultState { flags, latch };
        self.state
    }

    pub fn state(&self) -> FaultState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            fault_debounce_count: 3,
            recovery_debounce_count: 5,
            ..Config::for_cells(10)
        }
    }

    fn nominal() -> SafetyInputs {
        SafetyInputs {
            bus_voltage: 38.0,
            peak_current: 1.0,
            stale_sample: false,
            encoder_signal_loss: false,
            resistor_overtemp: false,
            calibrated: true,
        }
    }

    fn arm(monitor: &mut SafetyMonitor) {
        for _ in 0..5 {
            monitor.evaluate(&nominal());
        }
        assert_eq!(monitor.state().latch, LatchState::Normal);
    }

    #[test]
    fn test_flags() {
        let mut flags = FaultFlags::NONE;
        assert!(flags.is_empty());
        flags.insert(FaultFlags::OVERCURRENT);
        flags.insert(FaultFlags::STALE_SAMPLE);
        assert!(flags.contains(FaultFlags::OVERCURRENT));
        assert!(!flags.contains(FaultFlags::OVERVOLTAGE));
        flags.remove(FaultFlags::OVERCURRENT);
        assert_eq!(flags, FaultFlags::STALE_SAMPLE);
    }

    #[test]
    fn test_arming_requires_calibration() {
        let mut monitor = SafetyMonitor::new(0, &config());
        assert_eq!(monitor.state().latch, LatchState::Recovering);
        let uncalibrated = SafetyInputs {
            calibrated: false,
            ..nominal()
        };
        for _ in 0..20 {
            assert_eq!(monitor.evaluate(&uncalibrated).latch, LatchState::Recovering);
        }
        assert_eq!(monitor.evaluate(&nominal()).latch, LatchState::Normal);
    }

    #[test]
    fn test_overvoltage_debounce() {
        let mut monitor = SafetyMonitor::new(0, &config());
        arm(&mut monitor);

        let high = SafetyInputs {
            bus_voltage: 44.0,
            ..nominal()
        };
        assert!(monitor.evaluate(&high).is_normal());
        assert!(monitor.evaluate(&high).is_normal());
        let state = monitor.evaluate(&high);
        assert_eq!(state.latch, LatchState::Faulted);
        assert!(state.flags.contains(FaultFlags::OVERVOLTAGE));
    }

    #[test]
    fn test_single_spike_is_ignored() {
        let mut monitor = SafetyMonitor::new(0, &config());
        arm(&mut monitor);
        let spike = SafetyInputs {
            peak_current: 50.0,
            ..nominal()
        };
        monitor.evaluate(&spike);
        monitor.evaluate(&spike);
        assert!(monitor.evaluate(&nominal()).is_normal());
        monitor.evaluate(&spike);
        assert!(monitor.evaluate(&spike).is_normal());
    }

    #[test]
    fn test_recovery_sequence() {
        let mut monitor = SafetyMonitor::new(0, &config());
        arm(&mut monitor);
        let low = SafetyInputs {
            bus_voltage: 30.0,
            ..nominal()
        };
        for _ in 0..3 {
            monitor.evaluate(&low);
        }
        // 故障中も評価を続ける
        for _ in 0..10 {
            let state = monitor.evaluate(&low);
            assert_eq!(state.latch, LatchState::Faulted);
            assert!(state.flags.contains(FaultFlags::UNDERVOLTAGE));
        }

        // 条件解除でフラグは即座に落ち、Recovering へ
        let state = monitor.evaluate(&nominal());
        assert!(state.flags.is_empty());
        assert_eq!(state.latch, LatchState::Recovering);

        for _ in 0..4 {
            assert_eq!(monitor.evaluate(&nominal()).latch, LatchState::Recovering);
        }
        assert_eq!(monitor.evaluate(&nominal()).latch, LatchState::Normal);
    }

    #[test]
    fn test_fault_during_recovery_relatches() {
        let mut monitor = SafetyMonitor::new(0, &config());
        arm(&mut monitor);
        let loss = SafetyInputs {
            encoder_signal_loss: true,
            ..nominal()
        };
        for _ in 0..3 {
            monitor.evaluate(&loss);
        }
        monitor.evaluate(&nominal());
        monitor.evaluate(&nominal());
        assert_eq!(monitor.state().latch, LatchState::Recovering);

        for _ in 0..3 {
            monitor.evaluate(&loss);
        }
        assert_eq!(monitor.state().latch, LatchState::Faulted);
        assert!(monitor.state().flags.contains(FaultFlags::ENCODER_SIGNAL_LOSS));
    }

    #[test]
    fn test_stale_sample_holds_measurement_flags() {
        let mut monitor = SafetyMonitor::new(0, &config());
        arm(&mut monitor);
        let high = SafetyInputs {
            bus_voltage: 44.0,
            ..nominal()
        };
        for _ in 0..3 {
            monitor.evaluate(&high);
        }
        // 無効サンプルの値（0V）では過電圧を解除しないし、低電圧も立てない
        let stale = SafetyInputs {
            bus_voltage: 0.0,
            stale_sample: true,
            ..nominal()
        };
        for _ in 0..3 {
            monitor.evaluate(&stale);
        }
        let state = monitor.state();
        assert!(state.flags.contains(FaultFlags::OVERVOLTAGE));
        assert!(state.flags.contains(FaultFlags::STALE_SAMPLE));
        assert!(!state.flags.contains(FaultFlags::UNDERVOLTAGE));
    }

    #[test]
    fn test_resistor_overtemp_faults() {
        let mut monitor = SafetyMonitor::new(1, &config());
        arm(&mut monitor);
        let hot = SafetyInputs {
            resistor_overtemp: true,
            ..nominal()
        };
        for _ in 0..3 {
            monitor.evaluate(&hot);
        }
        assert!(monitor.state().flags.contains(FaultFlags::RESISTOR_OVERTEMP));
        assert_eq!(monitor.state().latch, LatchState::Faulted);
    }
}
