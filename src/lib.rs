//! Dual-channel encoder FOC torque drive core
//!
//! ハードウェアに依存しない制御コア。ペリフェラルは `ports` のトレイト経由で
//! 注入し、`Drive::tick` を PWM キャリアに同期した固定周期で呼び出す。

#![cfg_attr(not(test), no_std)]

// 他モジュールより先に読み込み、ログマクロを全体で使えるようにする
mod fmt;

pub mod acquisition;
pub mod actuation;
pub mod brake;
pub mod bus_voltage;
pub mod channel;
pub mod command;
pub mod config;
pub mod drive;
pub mod encoder;
pub mod foc;
pub mod ports;
pub mod safety;

#[cfg(test)]
mod sim;

pub use config::{Config, ConfigError};
pub use drive::{Drive, TickReport};
pub use safety::{FaultFlags, FaultState, LatchState};
