//! TIM4ベースの指令パルス入力
//!
//! ## ハードウェア構成
//! - TIM4_CH1 (PB6): チャネル0 の指令
//! - TIM4_CH2 (PB7): チャネル1 の指令
//! - クロック: 170MHz を PSC で 1MHz に分周（1カウント = 1μs、16ビットで約65ms周期）
//!
//! キャプチャ方式では両エッジでカウンタ値を取り込み、割り込みでピンのレベルを読んで
//! 立ち上がり/立ち下がりを判別する。確定したパルス幅は `COMMAND_HANDOFF` に書き、
//! 制御ループが周期ごとに読み出す。ポーリング方式では同じピンを入力として使う。

use core::cell::RefCell;

use embassy_stm32::pac;
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use g4_torque_driver::command::{CommandHandoff, PulseCapture};
use g4_torque_driver::config::MAX_CHANNELS;

use crate::config::{command, TIMER_CLOCK};
use crate::encoder_tim::set_alternate;

/// 指令ピン（GPIOB のビット番号）
const COMMAND_PINS: [usize; MAX_CHANNELS] = [6, 7];

/// 割り込み/ポーリングタスク → 制御ループのパルス幅受け渡し
pub static COMMAND_HANDOFF: [CommandHandoff; MAX_CHANNELS] =
    [CommandHandoff::new(), CommandHandoff::new()];

/// エッジ間隔の計測状態（TIM4割り込みからのみ更新）
static CAPTURES: Mutex<CriticalSectionRawMutex, RefCell<[PulseCapture; MAX_CHANNELS]>> =
    Mutex::new(RefCell::new([
        PulseCapture::new(command::TIMER_HZ, command::COUNTER_BITS),
        PulseCapture::new(command::TIMER_HZ, command::COUNTER_BITS),
    ]));

/// TIM4 インプットキャプチャの初期化
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_capture_timer() {
    let rcc = pac::RCC;
    let tim4 = pac::TIM4;

    rcc.ahb2enr().modify(|w| w.set_gpioben(true));
    rcc.apb1enr1().modify(|w| w.set_tim4en(true));

    for pin in COMMAND_PINS {
        set_alternate(pac::GPIOB, pin, 2); // AF2: TIM4_CH1/CH2
    }

    tim4.cr1().modify(|w| w.set_cen(false));
    tim4.psc()
        .write_value((TIMER_CLOCK.0 / command::TIMER_HZ - 1) as u16);
    tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));

    // CC1/CC2 を TI1/TI2 の入力キャプチャに
    tim4.ccmr_input(0).modify(|w| {
        w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4);
        w.set_ccs(1, pac::timer::vals::CcmrInputCcs::TI4);
        w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
        w.set_icf(1, pac::timer::vals::FilterValue::FCK_INT_N8);
    });

    // CCxP=1, CCxNP=1: 両エッジ
    tim4.ccer().modify(|w| {
        for ch in 0..MAX_CHANNELS {
            w.set_cce(ch, true);
            w.set_ccp(ch, true);
            w.set_ccnp(ch, true);
        }
    });

    tim4.dier().modify(|w| {
        w.set_ccie(0, true);
        w.set_ccie(1, true);
    });

    // 優先度は制御タスク（スレッドモード）より高ければよい
    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM4);
        let mut cp = cortex_m::Peripherals::steal();
        cp.NVIC.set_priority(pac::Interrupt::TIM4, 0x20);
    }

    tim4.cnt().write_value(pac::timer::regs::CntCore(0));
    tim4.sr().write(|w| w.0 = 0);
    tim4.egr().write(|w| w.set_ug(true)); // プリスケーラ反映
    tim4.cr1().modify(|w| {
        w.set_urs(pac::timer::vals::Urs::COUNTER_ONLY);
        w.set_cen(true);
    });
}

/// ポーリング方式用に PB6/PB7 をプルダウン付き入力に設定
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_polled_inputs() {
    pac::RCC.ahb2enr().modify(|w| w.set_gpioben(true));
    let gpiob = pac::GPIOB;
    for pin in COMMAND_PINS {
        gpiob
            .moder()
            .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::INPUT));
        gpiob
            .pupdr()
            .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::PULL_DOWN));
    }
}

/// 指令ピンの現在のレベル
#[inline(always)]
pub fn input_level(channel: usize) -> bool {
    pac::GPIOB.idr().read().idr(COMMAND_PINS[channel]) == pac::gpio::vals::Idr::HIGH
}

/// TIM4割り込みハンドラー（Capture/Compare 1, 2）
///
/// # Safety
/// 割り込みコンテキストで実行されるため、処理は最小限にする
#[inline(always)]
pub unsafe fn tim4_irq_handler() {
    let tim4 = pac::TIM4;
    let sr = tim4.sr().read();

    for channel in 0..MAX_CHANNELS {
        if !sr.ccif(channel) {
            continue;
        }
        tim4.sr().modify(|w| w.set_ccif(channel, false));

        // キャプチャ直後のレベルでエッジの向きを判定
        let ticks = tim4.ccr(channel).read().ccr() as u32;
        let rising = input_level(channel);

        // 取りこぼしたエッジがあれば途中のパルスは捨てる
        let overrun = sr.ccof(channel);
        if overrun {
            tim4.sr().modify(|w| w.set_ccof(channel, false));
        }

        let width = CAPTURES.lock(|captures| {
            let capture = &mut captures.borrow_mut()[channel];
            if overrun {
                capture.reset();
            }
            capture.on_edge(rising, ticks)
        });
        if let Some(width_us) = width {
            COMMAND_HANDOFF[channel].publish(width_us);
        }
    }
}

/// TIM4割り込みのRust側エントリーポイント
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM4() {
    tim4_irq_handler();
}
