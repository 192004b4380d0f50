// Field oriented controller: transform chain and cascaded PI loops

use libm::sqrtf;

use super::pi_controller::PiController;
use super::svpwm::{calculate_svpwm, voltage_limit};
use super::transforms::{clarke, inverse_park, park, SinCos};
use super::{ControlMode, ReferenceRamp};
use crate::config::Config;
use crate::ports::DutyVector;

/// Measurements and command for one control period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocInputs {
    /// Phase currents U/V/W [A]
    pub currents: [f32; 3],
    /// Electrical angle [rad]
    pub electrical_angle: f32,
    /// Mechanical velocity [rad/s]
    pub velocity: f32,
    /// DC bus voltage [V]
    pub bus_voltage: f32,
    /// Normalized reference [-1, 1]
    pub reference: f32,
}

/// Controller result for one control period
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FocOutput {
    pub duty: DutyVector,
    /// Measured d/q currents [A]
    pub id: f32,
    pub iq: f32,
    /// Commanded d/q voltages [V]
    pub vd: f32,
    pub vq: f32,
    /// q-axis current target [A]
    pub iq_target: f32,
    /// Reference after the ramp
    pub reference: f32,
}

/// Per-channel FOC: Clarke/Park → PI loops → inverse Park → SVPWM
pub struct FieldOrientedController {
    mode: ControlMode,
    dt: f32,
    max_duty: f32,
    max_current: f32,
    max_speed: f32,
    ramp: ReferenceRamp,
    speed_pi: PiController,
    id_pi: PiController,
    iq_pi: PiController,
}

impl FieldOrientedController {
    pub fn new(config: &Config) -> Self {
        let dt = config.period_s();
        let current = config.current_loop_gains;
        let speed = config.speed_loop_gains;
        Self {
            mode: config.control_mode,
            dt,
            max_duty: config.max_duty,
            max_current: config.max_current,
            max_speed: config.max_speed,
            ramp: ReferenceRamp::new(config.reference_ramp_per_s, dt),
            speed_pi: PiController::new_symmetric(speed.kp, speed.ki, config.max_current),
            // Voltage limits follow the bus every period
            id_pi: PiController::new_symmetric(current.kp, current.ki, 0.0),
            iq_pi: PiController::new_symmetric(current.kp, current.ki, 0.0),
        }
    }

    /// Run one control period
    pub fn update(&mut self, inputs: &FocInputs) -> FocOutput {
        let angle = SinCos::new(inputs.electrical_angle);

        // Clarke → Park
        let [i_u, i_v, i_w] = inputs.currents;
        let (i_alpha, i_beta) = clarke(i_u, i_v, i_w);
        let (id, iq) = park(i_alpha, i_beta, angle);

        let reference = self.ramp.update(inputs.reference.clamp(-1.0, 1.0));
        let v_limit = voltage_limit(inputs.bus_voltage, self.max_duty);

        let (vd, vq, iq_target) = match self.mode {
            ControlMode::Voltage => (0.0, reference * v_limit, 0.0),
            ControlMode::Speed => {
                let target_speed = reference * self.max_speed;
                let iq_target = self.speed_pi.update(target_speed, inputs.velocity, self.dt);
                let (vd, vq) = self.current_loops(id, iq, iq_target, v_limit);
                (vd, vq, iq_target)
            }
            ControlMode::Torque => {
                let iq_target = reference * self.max_current;
                let (vd, vq) = self.current_loops(id, iq, iq_target, v_limit);
                (vd, vq, iq_target)
            }
        };

        // Park逆変換（dq → αβ）→ SVPWM
        let (v_alpha, v_beta) = inverse_park(vd, vq, angle);
        let duty = calculate_svpwm(v_alpha, v_beta, inputs.bus_voltage, self.max_duty);

        FocOutput {
            duty,
            id,
            iq,
            vd,
            vq,
            iq_target,
            reference,
        }
    }

    /// d/q current PI loops, d axis first; q gets what is left of the voltage circle
    fn current_loops(&mut self, id: f32, iq: f32, iq_target: f32, v_limit: f32) -> (f32, f32) {
        self.id_pi.set_symmetric_limit(v_limit);
        let vd = self.id_pi.update(0.0, id, self.dt);

        let vq_limit = sqrtf((v_limit * v_limit - vd * vd).max(0.0));
        self.iq_pi.set_symmetric_limit(vq_limit);
        let vq = self.iq_pi.update(iq_target, iq, self.dt);

        (vd, vq)
    }

    /// Clear all integrators and the reference ramp
    pub fn reset(&mut self) {
        self.ramp.reset();
        self.speed_pi.reset();
        self.id_pi.reset();
        self.iq_pi.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PiGains;
    use crate::sim::{PmsmParams, PmsmPlant};

    const BUS: f32 = 24.0;

    fn config(mode: ControlMode) -> Config {
        Config {
            control_mode: mode,
            current_loop_gains: PiGains::new(0.377, 377.0),
            speed_loop_gains: PiGains::new(0.05, 0.6),
            ..Config::default()
        }
    }

    fn run(
        foc: &mut FieldOrientedController,
        plant: &mut PmsmPlant,
        reference: f32,
        bus_voltage: f32,
        periods: u32,
    ) -> FocOutput {
        let dt = 1e-4;
        let mut output = FocOutput::default();
        for _ in 0..periods {
            output = foc.update(&FocInputs {
                currents: plant.phase_currents(),
                electrical_angle: plant.electrical_angle(),
                velocity: plant.velocity(),
                bus_voltage,
                reference,
            });
            plant.step(&output.duty, bus_voltage, dt);
        }
        output
    }

    /// `settle_after` 周期以降の誤差の最大値
    fn worst_error_after(
        foc: &mut FieldOrientedController,
        plant: &mut PmsmPlant,
        reference: f32,
        periods: u32,
        settle_after: u32,
        error: impl Fn(&PmsmPlant) -> f32,
    ) -> f32 {
        let mut worst = 0.0f32;
        for period in 0..periods {
            run(foc, plant, reference, BUS, 1);
            if period >= settle_after {
                worst = worst.max(error(plant).abs());
            }
        }
        worst
    }

    #[test]
    fn test_current_step_locked_rotor() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Torque));
        let mut plant = PmsmPlant::locked(PmsmParams::default(), 0.37);

        // 0.3 × 10A = 3A
        let output = run(&mut foc, &mut plant, 0.3, BUS, 1000);
        let (id, iq) = plant.dq_currents();
        assert!((iq - 3.0).abs() < 0.05, "iq = {}", iq);
        assert!(id.abs() < 0.05, "id = {}", id);
        assert!((output.iq_target - 3.0).abs() < 1e-4);
        // 定常状態では vq = R·iq
        assert!((output.vq - 0.6).abs() < 0.05);
    }

    #[test]
    fn test_current_step_settles_without_oscillation() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Torque));
        let mut plant = PmsmPlant::locked(PmsmParams::default(), 1.2);

        // ランプ（150周期）完了後 300周期までに収束し、以後は帯の外に出ない
        let worst = worst_error_after(&mut foc, &mut plant, 0.3, 3000, 300, |p| {
            p.dq_currents().1 - 3.0
        });
        assert!(worst < 0.1, "worst iq error = {}", worst);
        assert!(plant.dq_currents().0.abs() < 0.1);
    }

    #[test]
    fn test_speed_step_response() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Speed));
        let mut plant = PmsmPlant::new(PmsmParams::default());

        // 0.5 × 100 rad/s
        run(&mut foc, &mut plant, 0.5, BUS, 10_000);
        assert!((plant.velocity() - 50.0).abs() < 0.5, "velocity = {}", plant.velocity());

        // Reverse direction through zero
        run(&mut foc, &mut plant, -0.2, BUS, 10_000);
        assert!((plant.velocity() + 20.0).abs() < 0.5, "velocity = {}", plant.velocity());
    }

    #[test]
    fn test_speed_step_settles_without_oscillation() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Speed));
        let mut plant = PmsmPlant::new(PmsmParams::default());

        let worst = worst_error_after(&mut foc, &mut plant, 0.5, 10_000, 3_000, |p| {
            p.velocity() - 50.0
        });
        assert!(worst < 0.5, "worst speed error = {}", worst);
    }

    #[test]
    fn test_voltage_mode_scales_with_bus() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Voltage));
        let mut plant = PmsmPlant::locked(PmsmParams::default(), 0.0);
        let output = run(&mut foc, &mut plant, 0.5, BUS, 1000);
        assert!((output.vq - 0.5 * voltage_limit(BUS, 0.95)).abs() < 1e-4);
        assert_eq!(output.vd, 0.0);
    }

    #[test]
    fn test_duty_never_exceeds_max() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Torque));
        for i in 0..2000 {
            let t = i as f32;
            let output = foc.update(&FocInputs {
                currents: [libm::sinf(t) * 20.0, libm::cosf(t * 0.7) * 20.0, -5.0],
                electrical_angle: t * 0.37,
                velocity: 0.0,
                bus_voltage: 10.0 + (i % 40) as f32,
                reference: if i % 2 == 0 { 1.0 } else { -1.0 },
            });
            assert!(output.duty.peak() <= 0.95);
            assert!(output.duty.u >= 0.0 && output.duty.v >= 0.0 && output.duty.w >= 0.0);
        }
    }

    #[test]
    fn test_integrator_frozen_when_bus_too_low() {
        // 2V バスでは 10A を流せない（R·I = 2V > 1.1V）
        let mut foc = FieldOrientedController::new(&config(ControlMode::Torque));
        let mut plant = PmsmPlant::locked(PmsmParams::default(), 0.0);
        let low_bus = 2.0;
        let output = run(&mut foc, &mut plant, 1.0, low_bus, 5000);

        let v_limit = voltage_limit(low_bus, 0.95);
        assert!((output.vq - v_limit).abs() < 1e-3);
        assert!(foc.iq_pi.is_saturated());
        // 積分項は飽和点を超えて蓄積しない
        assert!(foc.iq_pi.get_integral() * 377.0 < v_limit + 0.1);

        // 指令をゼロに戻すと、ランプ完了後すぐに追従する
        let recovered = run(&mut foc, &mut plant, 0.0, low_bus, 600);
        assert!(recovered.vq.abs() < 0.1, "vq = {}", recovered.vq);
        assert!(plant.dq_currents().1.abs() < 0.2);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut foc = FieldOrientedController::new(&config(ControlMode::Speed));
        let mut plant = PmsmPlant::new(PmsmParams::default());
        run(&mut foc, &mut plant, 0.5, BUS, 100);
        foc.reset();
        assert_eq!(foc.speed_pi.get_integral(), 0.0);
        assert_eq!(foc.iq_pi.get_integral(), 0.0);
        assert_eq!(foc.ramp.value(), 0.0);
    }
}
