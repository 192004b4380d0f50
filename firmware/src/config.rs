//! ボード固有の設定
//!
//! 制御パラメータはビルド時に固定する（フラッシュ保存はしない）。

use embassy_stm32::time::Hertz;
use g4_torque_driver::config::{ChannelConfig, CommandInput, Config, PiGains};
use g4_torque_driver::foc::ControlMode;

/// PWM設定
pub mod pwm {
    use embassy_stm32::time::Hertz;

    /// PWM周波数（20kHz、制御周期の2倍）
    pub const FREQUENCY: Hertz = Hertz(20_000);

    /// デッドタイム（タイマークロック 170MHz のカウント数、約500ns）
    pub const DEAD_TIME: u16 = 85;
}

/// 指令入力タイマー（TIM4、PSC で 1MHz に分周）
pub mod command {
    pub const TIMER_HZ: u32 = 1_000_000;
    pub const COUNTER_BITS: u8 = 16;
}

/// タイマーのカーネルクロック（APB1/APB2 とも 170MHz）
pub const TIMER_CLOCK: Hertz = Hertz(170_000_000);

/// 2チャネル分の電流・エンコーダ・指令を持つボード用の設定
pub fn drive_config() -> Config {
    let mut config = Config::for_cells(10);
    config.control_mode = ControlMode::Torque;
    config.command_input = CommandInput::Capture;

    config.pole_pairs = 7;
    config.encoder_counts_per_rev = 4096;
    config.current_loop_gains = PiGains::new(0.4, 400.0);

    // 組み付け時に測定した電気角オフセット
    config.channels = [
        ChannelConfig {
            electrical_offset: 0.0,
            direction_inversed: false,
        },
        ChannelConfig {
            electrical_offset: 0.0,
            direction_inversed: true,
        },
    ];
    config
}
