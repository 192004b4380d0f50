//! ハードウェア初期化モジュール
//!
//! クロックと、embassy のドライバを使わずレジスタで設定するタイマーの初期化を集約します。

use embassy_stm32::Config;
use g4_torque_driver::config::CommandInput;

use crate::{brake_tim, command_tim, encoder_tim};

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, ClockMux};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R; // システムクロックをPLLに設定

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        config.rcc.mux = clock_mux;
    }
    config
}

/// エンコーダ・指令入力・ブレーキのタイマー初期化
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む。embassy に渡していないペリフェラルのみ触る
pub unsafe fn init_timers(command_input: CommandInput) {
    encoder_tim::init_encoder_timers();
    info!("Encoders: TIM2 (PA15/PB3), TIM3 (PB4/PB5)");

    match command_input {
        CommandInput::Capture => {
            command_tim::init_capture_timer();
            info!("Command input: TIM4 capture (PB6/PB7)");
        }
        CommandInput::Polled => {
            command_tim::init_polled_inputs();
            info!("Command input: polled GPIO (PB6/PB7)");
        }
    }

    brake_tim::init_brake_timer();
    info!("Brake resistor: TIM15_CH1 (PB14)");
}
