//! ブレーキ抵抗スイッチ用PWM（TIM15_CH1 = PB14, AF1）

use embassy_stm32::pac;

use crate::config::{pwm, TIMER_CLOCK};

/// 自動リロード値（PWM周波数はモーター側と同じ）
const ARR: u16 = (TIMER_CLOCK.0 / pwm::FREQUENCY.0 - 1) as u16;

/// TIM15 をPWMモード1で起動（デューティ0）
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_brake_timer() {
    let rcc = pac::RCC;
    let tim15 = pac::TIM15;

    rcc.ahb2enr().modify(|w| w.set_gpioben(true));
    rcc.apb2enr().modify(|w| w.set_tim15en(true));

    let gpiob = pac::GPIOB;
    gpiob
        .moder()
        .modify(|w| w.set_moder(14, pac::gpio::vals::Moder::ALTERNATE));
    gpiob.afr(1).modify(|w| w.set_afr(6, 1)); // AF1 (PB14 = AFRH[6])
    gpiob
        .pupdr()
        .modify(|w| w.set_pupdr(14, pac::gpio::vals::Pupdr::PULL_DOWN)); // 起動中はオフ
    gpiob
        .ospeedr()
        .modify(|w| w.set_ospeedr(14, pac::gpio::vals::Ospeedr::HIGH_SPEED));

    tim15.cr1().modify(|w| w.set_cen(false));
    tim15.psc().write_value(0);
    tim15.arr().write(|w| w.set_arr(ARR));
    tim15.ccr(0).write(|w| w.set_ccr(0));

    tim15.ccmr_output(0).modify(|w| {
        w.set_ocm(0, pac::timer::vals::Ocm::PWM_MODE1);
        w.set_ocpe(0, true); // 更新イベントで反映
    });
    tim15.ccer().modify(|w| {
        w.set_cce(0, true);
        w.set_ccp(0, false);
    });
    // TIM15 は出力にMOEが必要
    tim15.bdtr().modify(|w| w.set_moe(true));

    tim15.egr().write(|w| w.set_ug(true));
    tim15.cr1().modify(|w| w.set_cen(true));
}

/// デューティ 0.0～1.0 を設定
#[inline(always)]
pub fn set_duty(duty: f32) {
    let compare = (duty.clamp(0.0, 1.0) * (ARR as f32 + 1.0)) as u16;
    pac::TIM15.ccr(0).write(|w| w.set_ccr(compare));
}
