//! 指令のポーリングタスク（キャプチャタイマーが使えない構成用）
//!
//! 指令ピンを一定周期でサンプリングし、確定したパルス幅を `COMMAND_HANDOFF` に書く。
//! 分解能はポーリング周期で決まる。

use embassy_time::{Duration, Instant, Ticker};
use g4_torque_driver::command::PolledPulseDemodulator;
use g4_torque_driver::config::{command::POLL_FREQUENCY_HZ, MAX_CHANNELS};

use crate::command_tim::{input_level, COMMAND_HANDOFF};

#[embassy_executor::task]
pub async fn command_poll_task(channel_count: usize) {
    info!("Command poll task started: {}Hz", POLL_FREQUENCY_HZ);

    let mut demodulators = [PolledPulseDemodulator::new(), PolledPulseDemodulator::new()];
    let mut ticker = Ticker::every(Duration::from_hz(POLL_FREQUENCY_HZ as u64));

    loop {
        ticker.next().await;

        let now_us = Instant::now().as_micros() as u32;
        for channel in 0..channel_count.min(MAX_CHANNELS) {
            demodulators[channel].sample_into(
                input_level(channel),
                now_us,
                &COMMAND_HANDOFF[channel],
            );
        }
    }
}
