//! 制御タスク
//!
//! 制御周期ごとに `Drive::tick` を1回呼ぶ。取り込みから出力までは
//! すべてこのタスク内で同期的に完了する。

use embassy_time::{Duration, Ticker};
use g4_torque_driver::Drive;

use crate::board::Board;

/// 状態ログの間隔 [s]
const LOG_INTERVAL_S: u32 = 1;

#[embassy_executor::task]
pub async fn control_task(mut drive: Drive, mut board: Board) {
    let frequency_hz = drive.config().control_frequency_hz;
    info!("Control task started: {}Hz", frequency_hz);

    let mut ticker = Ticker::every(Duration::from_hz(frequency_hz as u64));
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        let report = drive.tick(&mut board);

        log_counter += 1;
        if log_counter >= frequency_hz * LOG_INTERVAL_S {
            log_counter = 0;
            for (index, channel) in report.active().iter().enumerate() {
                info!(
                    "[Ch{}] {} flags={:#x} ref={} vel={}rad/s iq={}A",
                    index,
                    channel.fault.latch,
                    channel.fault.flags.bits(),
                    channel.state.reference.value,
                    channel.state.velocity,
                    channel.state.iq
                );
            }
            info!(
                "[Bus] {}V, brake duty={}, resistor={}C",
                report.bus_voltage,
                report.brake_duty,
                drive.brake().resistor_temperature()
            );
        }
    }
}
