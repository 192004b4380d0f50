#![no_std]
#![no_main]

// ログマクロを他モジュールより先に定義
mod fmt;

mod adc_seq;
mod board;
mod brake_tim;
mod command_tim;
mod config;
mod encoder_tim;
mod hardware;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::Adc,
    gpio::OutputType,
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
        Channel,
    },
};
use embassy_time::{Duration, Timer};
use g4_torque_driver::config::CommandInput;
use g4_torque_driver::Drive;

use board::Board;
use tasks::{command_poll_task, control_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let p = embassy_stm32::init(hardware::create_clock_config());

    info!("===================================================");
    info!("  G4 Torque Driver - dual encoder FOC");
    info!("  STM32G431VB @ 170MHz");
    info!("===================================================");

    // 設定が不正なら PWM を有効化せずに止まる
    let drive_config = config::drive_config();
    let drive = match Drive::new(drive_config) {
        Ok(drive) => drive,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            loop {
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    };

    // ADCの有効化と校正（変換シーケンスは PWM 開始後に設定）
    let adc1 = Adc::new(p.ADC1);
    let adc2 = Adc::new(p.ADC2);

    // PWM初期化（TIM1 = チャネル0、TIM8 = チャネル1、3相補完PWM）
    let mut pwm0 = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        Some(PwmPin::new(p.PE13, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE12, OutputType::PushPull)),
        None,
        None,
        config::pwm::FREQUENCY,
        CountingMode::EdgeAlignedUp,
    );
    let mut pwm1 = ComplementaryPwm::new(
        p.TIM8,
        Some(PwmPin::new(p.PC6, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PC10, OutputType::PushPull)),
        Some(PwmPin::new(p.PC7, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PC11, OutputType::PushPull)),
        Some(PwmPin::new(p.PC8, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PC12, OutputType::PushPull)),
        None,
        None,
        config::pwm::FREQUENCY,
        CountingMode::EdgeAlignedUp,
    );

    // 安全デューティ（全相同電位）から開始
    let safe_duty = (drive.config().safe_duty * pwm0.get_max_duty() as f32) as u16;
    for channel in [Channel::Ch1, Channel::Ch2, Channel::Ch3] {
        pwm0.disable(channel);
        pwm1.disable(channel);
        pwm0.set_duty(channel, safe_duty);
        pwm1.set_duty(channel, safe_duty);
    }
    pwm0.set_dead_time(config::pwm::DEAD_TIME);
    pwm1.set_dead_time(config::pwm::DEAD_TIME);
    for channel in [Channel::Ch1, Channel::Ch2, Channel::Ch3] {
        pwm0.enable(channel);
        pwm1.enable(channel);
    }

    // エンコーダ・指令入力・ブレーキのタイマー
    let command_input = drive.config().command_input;
    unsafe {
        hardware::init_timers(command_input);
    }

    if command_input == CommandInput::Polled {
        let channel_count = drive.config().active_channels();
        unwrap!(spawner.spawn(command_poll_task(channel_count)));
    }

    // TIM1 更新で相電流・温度を変換、バス電圧は制御周期ごと
    let (sequences, bus) = unsafe { adc_seq::init_sequences() };
    info!("ADC: injected sequences on TIM1 TRGO, bus on ADC1 regular");

    let board = Board::new((adc1, adc2), sequences, bus, pwm0, pwm1);

    info!("Starting control loop...");
    unwrap!(spawner.spawn(control_task(drive, board)));

    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
