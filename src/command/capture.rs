//! インプットキャプチャによるパルス幅計測
//!
//! タイマーが両エッジでカウンタ値をキャプチャし、割り込みハンドラが
//! 立ち上がり→立ち下がりのカウント差からパルス幅を求める。
//! カウンタのオーバーフロー（1回まで）はマスク付き減算で吸収する。

/// Edge timestamps (timer ticks) → pulse width [µs]
pub struct PulseCapture {
    timer_hz: u32,
    /// Counter wrap mask (`2^bits - 1`)
    counter_mask: u32,
    rising_ticks: Option<u32>,
}

impl PulseCapture {
    /// # Arguments
    /// * `timer_hz` - Timer counting frequency after the prescaler
    /// * `counter_bits` - Counter width (16 or 32)
    pub const fn new(timer_hz: u32, counter_bits: u8) -> Self {
        let counter_mask = if counter_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << counter_bits) - 1
        };
        Self {
            timer_hz,
            counter_mask,
            rising_ticks: None,
        }
    }

    /// Feed one captured edge
    ///
    /// # Returns
    /// Pulse width [µs] on a falling edge that follows a rising edge
    pub fn on_edge(&mut self, rising: bool, ticks: u32) -> Option<u32> {
        if rising {
            self.rising_ticks = Some(ticks);
            return None;
        }

        let start = self.rising_ticks.take()?;
        let width_ticks = ticks.wrapping_sub(start) & self.counter_mask;
        Some(self.ticks_to_us(width_ticks))
    }

    pub fn ticks_to_us(&self, ticks: u32) -> u32 {
        if self.timer_hz == 0 {
            return 0;
        }
        (ticks as u64 * 1_000_000 / self.timer_hz as u64) as u32
    }

    /// Drop a half-seen pulse (e.g. after a capture overrun)
    pub fn reset(&mut self) {
        self.rising_ticks = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_from_edges() {
        // 1MHz → 1 tick = 1µs
        let mut capture = PulseCapture::new(1_000_000, 16);
        assert_eq!(capture.on_edge(true, 1000), None);
        assert_eq!(capture.on_edge(false, 2500), Some(1500));
    }

    #[test]
    fn test_counter_wrap() {
        let mut capture = PulseCapture::new(1_000_000, 16);
        capture.on_edge(true, 65_000);
        // 65000 → 65535 → 0 → 1464 = 2000 ticks
        assert_eq!(capture.on_edge(false, 1464), Some(2000));
    }

    #[test]
    fn test_prescaled_timer() {
        // 170MHz（プリスケーラなし）で 1.0ms
        let mut capture = PulseCapture::new(170_000_000, 32);
        capture.on_edge(true, u32::MAX - 1000);
        assert_eq!(capture.on_edge(false, 169_000 - 1), Some(1000));
    }

    #[test]
    fn test_falling_without_rising_is_ignored() {
        let mut capture = PulseCapture::new(1_000_000, 16);
        assert_eq!(capture.on_edge(false, 100), None);
        capture.on_edge(true, 200);
        capture.reset();
        assert_eq!(capture.on_edge(false, 1700), None);
    }
}
