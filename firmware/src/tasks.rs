//! タスクモジュール

pub mod command_poll;
pub mod control;

pub use command_poll::command_poll_task;
pub use control::control_task;
