//! 直交エンコーダ用タイマー（エンコーダモード3、4逓倍）
//!
//! ## ハードウェア構成
//! - チャネル0: TIM2_CH1 (PA15) / TIM2_CH2 (PB3), AF1
//! - チャネル1: TIM3_CH1 (PB4) / TIM3_CH2 (PB5), AF2
//!
//! どちらも下位16ビットだけを使い、前回読み出しとの差分をエッジ数とする。
//! 制御周期（100μs）の間に 32768 エッジを超えて回ることはない。

use embassy_stm32::pac;
use g4_torque_driver::config::MAX_CHANNELS;

/// GPIOをタイマーの代替機能に設定
pub(crate) fn set_alternate(port: pac::gpio::Gpio, pin: usize, af: u8) {
    port.moder()
        .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ALTERNATE));
    port.afr(pin / 8).modify(|w| w.set_afr(pin % 8, af));
    port.pupdr()
        .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::PULL_UP));
}

// TIM2 は32ビット、TIM3 は16ビットでレジスタ型が異なるためマクロで共通化
macro_rules! configure_encoder {
    ($tim:expr) => {{
        let tim = $tim;
        tim.cr1().modify(|w| w.set_cen(false));
        tim.psc().write_value(0);
        tim.arr().write(|w| w.set_arr(0xFFFF));

        // TI1/TI2 の両エッジでカウント
        tim.smcr()
            .modify(|w| w.set_sms(pac::timer::vals::Sms::ENCODER_MODE_3));
        tim.ccmr_input(0).modify(|w| {
            w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4); // IC1 -> TI1
            w.set_ccs(1, pac::timer::vals::CcmrInputCcs::TI4); // IC2 -> TI2
            w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
            w.set_icf(1, pac::timer::vals::FilterValue::FCK_INT_N8);
        });
        tim.ccer().modify(|w| {
            w.set_ccp(0, false);
            w.set_ccp(1, false);
        });

        tim.cnt().write(|w| w.set_cnt(0));
        tim.egr().write(|w| w.set_ug(true));
        tim.cr1().modify(|w| w.set_cen(true));
    }};
}

/// TIM2/TIM3 をエンコーダモードで起動
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_encoder_timers() {
    let rcc = pac::RCC;
    rcc.ahb2enr().modify(|w| {
        w.set_gpioaen(true);
        w.set_gpioben(true);
    });
    rcc.apb1enr1().modify(|w| {
        w.set_tim2en(true);
        w.set_tim3en(true);
    });

    set_alternate(pac::GPIOA, 15, 1); // TIM2_CH1
    set_alternate(pac::GPIOB, 3, 1); // TIM2_CH2
    set_alternate(pac::GPIOB, 4, 2); // TIM3_CH1
    set_alternate(pac::GPIOB, 5, 2); // TIM3_CH2

    configure_encoder!(pac::TIM2);
    configure_encoder!(pac::TIM3);
}

fn read_counter(channel: usize) -> u16 {
    match channel {
        0 => pac::TIM2.cnt().read().cnt() as u16,
        _ => pac::TIM3.cnt().read().cnt() as u16,
    }
}

/// 前回読み出しからのエッジ数を返すカウンタ
pub struct EncoderCounters {
    last: [u16; MAX_CHANNELS],
}

impl EncoderCounters {
    /// 現在のカウンタ値を基準にする
    pub fn new() -> Self {
        let mut last = [0; MAX_CHANNELS];
        for (channel, last) in last.iter_mut().enumerate() {
            *last = read_counter(channel);
        }
        Self { last }
    }

    pub fn read_edges(&mut self, channel: usize) -> i32 {
        let count = read_counter(channel);
        let edges = count.wrapping_sub(self.last[channel]) as i16;
        self.last[channel] = count;
        edges as i32
    }
}
