//! ソフトウェアポーリングによるパルス幅復元と、制御周期への受け渡し
//!
//! 低速タスク（約1kHz）が入力レベルをサンプリングし、連続するサンプルの
//! レベル変化からエッジを復元する。エッジ時刻は前後サンプルの中点とみなす。
//!
//! 確定したパルス幅は `CommandHandoff` に書き込み、制御周期が1回だけ読む。
//! 書き込み側・読み出し側ともに1つずつなのでロックは不要。

use core::sync::atomic::{AtomicU32, Ordering};

/// Single-writer/single-reader pulse width handoff
///
/// Packs `width_us` (low 16 bits) and a sequence number (high 16 bits)
/// into one atomic word so a reader never sees a torn update.
pub struct CommandHandoff {
    word: AtomicU32,
}

impl CommandHandoff {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
        }
    }

    /// Publish a new pulse width. Only one context may call this.
    pub fn publish(&self, width_us: u32) {
        let previous = self.word.load(Ordering::Relaxed);
        let sequence = ((previous >> 16) as u16).wrapping_add(1);
        let width = width_us.min(u16::MAX as u32);
        self.word
            .store(((sequence as u32) << 16) | width, Ordering::Release);
    }

    fn load(&self) -> (u16, u32) {
        let word = self.word.load(Ordering::Acquire);
        ((word >> 16) as u16, word & 0xFFFF)
    }
}

impl Default for CommandHandoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a `CommandHandoff`; remembers the last consumed sequence
#[derive(Debug, Clone, Copy, Default)]
pub struct HandoffReader {
    last_sequence: u16,
}

impl HandoffReader {
    pub const fn new() -> Self {
        Self { last_sequence: 0 }
    }

    /// Take the newest width if it was published since the previous call
    pub fn take(&mut self, handoff: &CommandHandoff) -> Option<u32> {
        let (sequence, width) = handoff.load();
        if sequence == self.last_sequence {
            return None;
        }
        self.last_sequence = sequence;
        Some(width)
    }
}

/// 入力レベルのサンプル列からパルス幅を復元
pub struct PolledPulseDemodulator {
    last_level: bool,
    last_sample_us: Option<u32>,
    rising_us: Option<u32>,
}

impl PolledPulseDemodulator {
    pub const fn new() -> Self {
        Self {
            last_level: false,
            last_sample_us: None,
            rising_us: None,
        }
    }

    /// 1サンプル処理
    ///
    /// # Arguments
    /// * `level` - 入力ピンのレベル
    /// * `now_us` - サンプル時刻 [µs]（ラップアラウンド可）
    ///
    /// # Returns
    /// 立ち下がりエッジでパルスが確定した場合にパルス幅 [µs]
    pub fn sample(&mut self, level: bool, now_us: u32) -> Option<u32> {
        let previous = self.last_sample_us.replace(now_us);
        let was_high = core::mem::replace(&mut self.last_level, level);

        // 最初のサンプルではエッジを判定しない
        let previous = previous?;
        if level == was_high {
            return None;
        }

        let edge_us = previous.wrapping_add(now_us.wrapping_sub(previous) / 2);
        if level {
            self.rising_us = Some(edge_us);
            None
        } else {
            let rising = self.rising_us.take()?;
            Some(edge_us.wrapping_sub(rising))
        }
    }

    /// サンプルしてそのままハンドオフに書き込む
    pub fn sample_into(&mut self, level: bool, now_us: u32, handoff: &CommandHandoff) {
        if let Some(width) = self.sample(level, now_us) {
            handoff.publish(width);
        }
    }
}

impl Default for PolledPulseDemodulator {
    fn default() -> Self {
        Self::new()
    }
}
