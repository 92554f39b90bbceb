//! Feedback devices.
//!
//! The server has no speaker or LEDs of its own; [`LoggingFeedbackDevice`]
//! logs every tone and LED change and keeps the last LED bits so they can
//! be inspected.  A platform backend would implement [`FeedbackDevice`]
//! the same way.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::info;

use crate::application::accessx_feedback::{FeedbackDevice, FeedbackError};

/// Feedback device that writes to the log.
#[derive(Debug, Default)]
pub struct LoggingFeedbackDevice {
    leds: AtomicU32,
}

impl LoggingFeedbackDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current LED bits.
    pub fn leds(&self) -> u32 {
        self.leds.load(Ordering::Relaxed)
    }
}

impl FeedbackDevice for LoggingFeedbackDevice {
    fn set_tone(&self, pitch: u16, duration: u16, percent: u8) -> Result<(), FeedbackError> {
        info!(pitch, duration, percent, "bell");
        Ok(())
    }

    fn set_led_bits(&self, mask: u32, values: u32) -> Result<(), FeedbackError> {
        let old = self.leds.load(Ordering::Relaxed);
        let new = (old & !mask) | (values & mask);
        self.leds.store(new, Ordering::Relaxed);
        info!(leds = format_args!("{new:#010x}"), "indicators");
        Ok(())
    }
}
