//! Audible AccessX feedback: plays beep sequences on a feedback device.
//!
//! # How a sequence plays (for beginners)
//!
//! Each [`FeedbackSituation`] maps to a short list of tones.  The first tone
//! is played straight away, on the caller's stack.  If more tones follow,
//! a one-shot Tokio task sleeps for the gap, plays the next tone and goes
//! round again until the list runs out.
//!
//! The task may fire long after the operation that armed it has finished,
//! so it never captures the keyboard controls.  Instead it reads a small
//! [`BeepGate`] that the keyboard device keeps in sync.  Switching the
//! AudibleBell control off silences a running sequence at its next tone.
//!
//! Starting a new sequence, or calling [`BeepSequencer::cancel`], aborts the
//! armed task.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, trace, warn};
use xkb_core::{
    accessx::{BeepSequence, BeepStep},
    keymap::controls::{ctrls, Controls},
    FeedbackSituation,
};

/// Error type for feedback device calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("feedback device unavailable: {0}")]
    Unavailable(String),
}

/// The bell and LED hardware behind one keyboard.
#[cfg_attr(test, automock)]
pub trait FeedbackDevice: Send + Sync {
    /// Sounds one tone.  `percent` is the bell volume.
    fn set_tone(&self, pitch: u16, duration: u16, percent: u8) -> Result<(), FeedbackError>;

    /// Sets the LEDs selected by `mask` to the matching bits of `values`.
    fn set_led_bits(&self, mask: u32, values: u32) -> Result<(), FeedbackError>;
}

/// The two values a beep sequence needs at every firing.
#[derive(Debug)]
pub struct BeepGate {
    enabled_ctrls: AtomicU32,
    percent: AtomicU8,
}

impl BeepGate {
    pub fn new(enabled_ctrls: u32, percent: u8) -> Self {
        Self {
            enabled_ctrls: AtomicU32::new(enabled_ctrls),
            percent: AtomicU8::new(percent),
        }
    }

    /// Mirrors the device's enabled controls.
    pub fn sync(&self, controls: &Controls) {
        self.enabled_ctrls
            .store(controls.enabled_ctrls, Ordering::Relaxed);
    }

    pub fn set_percent(&self, percent: u8) {
        self.percent.store(percent, Ordering::Relaxed);
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    /// `true` while the AudibleBell control is enabled.
    pub fn audible(&self) -> bool {
        self.enabled_ctrls.load(Ordering::Relaxed) & ctrls::AUDIBLE_BELL != 0
    }
}

fn play(device: &dyn FeedbackDevice, gate: &BeepGate, step: &BeepStep) {
    let tone = step.tone;
    trace!(pitch = tone.pitch, duration = tone.duration, "beep");
    if let Err(e) = device.set_tone(tone.pitch, tone.duration, gate.percent()) {
        warn!("tone dropped: {e}");
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Plays the rest of `sequence` after the first tone.
async fn continue_sequence(
    device: Arc<dyn FeedbackDevice>,
    gate: Arc<BeepGate>,
    sequence: BeepSequence,
    mut delay: u64,
) {
    let mut count = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        count += 1;
        let Some(step) = sequence.step(count) else {
            return;
        };
        if !gate.audible() {
            debug!(count, "audible bell disabled, stopping sequence");
            return;
        }
        let started = Instant::now();
        play(device.as_ref(), &gate, &step);
        match step.next_delay(elapsed_ms(started)) {
            Some(next) => delay = next,
            None => return,
        }
    }
}

/// Sequences AccessX beeps for one keyboard device.
pub struct BeepSequencer {
    device: Arc<dyn FeedbackDevice>,
    gate: Arc<BeepGate>,
    armed: Mutex<Option<JoinHandle<()>>>,
}

impl BeepSequencer {
    pub fn new(device: Arc<dyn FeedbackDevice>, gate: Arc<BeepGate>) -> Self {
        Self {
            device,
            gate,
            armed: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &Arc<BeepGate> {
        &self.gate
    }

    /// Starts the tone sequence for `situation`, replacing any sequence that
    /// is still playing.
    pub fn beep(&self, situation: FeedbackSituation) {
        self.cancel();
        if !self.gate.audible() {
            trace!(?situation, "audible bell disabled");
            return;
        }
        let sequence = situation.sequence();
        let Some(first) = sequence.step(0) else {
            return;
        };
        debug!(?situation, tones = sequence.tones.len(), "starting beep sequence");

        let started = Instant::now();
        play(self.device.as_ref(), &self.gate, &first);
        let Some(delay) = first.next_delay(elapsed_ms(started)) else {
            return;
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(?situation, "no async runtime, playing the first tone only");
                return;
            }
        };
        let task = handle.spawn(continue_sequence(
            Arc::clone(&self.device),
            Arc::clone(&self.gate),
            sequence,
            delay,
        ));
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Aborts the armed sequence, if any.
    pub fn cancel(&self) {
        let armed = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = armed {
            task.abort();
        }
    }

    /// `true` while further tones of a sequence are pending.
    pub fn is_playing(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for BeepSequencer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use xkb_core::accessx::{duration, pitch};

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Records every tone with the paused-clock time it was played at.
    struct RecordingDevice {
        start: Instant,
        tones: Mutex<Vec<(u64, u16, u16, u8)>>,
    }

    impl RecordingDevice {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                start: Instant::now(),
                tones: Mutex::new(Vec::new()),
            })
        }

        fn times(&self) -> Vec<u64> {
            self.tones.lock().unwrap().iter().map(|t| t.0).collect()
        }

        fn pitches(&self) -> Vec<u16> {
            self.tones.lock().unwrap().iter().map(|t| t.1).collect()
        }
    }

    impl FeedbackDevice for RecordingDevice {
        fn set_tone(&self, pitch: u16, duration: u16, percent: u8) -> Result<(), FeedbackError> {
            let at = self.start.elapsed().as_millis() as u64;
            self.tones
                .lock()
                .unwrap()
                .push((at, pitch, duration, percent));
            Ok(())
        }

        fn set_led_bits(&self, _mask: u32, _values: u32) -> Result<(), FeedbackError> {
            Ok(())
        }
    }

    fn make_gate() -> Arc<BeepGate> {
        Arc::new(BeepGate::new(ctrls::AUDIBLE_BELL, 50))
    }

    // ── Sequencing ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_slow_warn_plays_three_tones_at_fixed_offsets() {
        // Arrange
        let device = RecordingDevice::new();
        let sequencer = BeepSequencer::new(device.clone(), make_gate());

        // Act
        sequencer.beep(FeedbackSituation::SlowWarn);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(device.times(), vec![0, 190, 380]);
        assert_eq!(device.pitches(), vec![pitch::HIGH; 3]);
        assert!(!sequencer.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sticky_latch_plays_low_then_high() {
        // Arrange
        let device = RecordingDevice::new();
        let sequencer = BeepSequencer::new(device.clone(), make_gate());

        // Act
        sequencer.beep(FeedbackSituation::StickyLatch);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(device.pitches(), vec![pitch::LOW, pitch::HIGH]);
        assert_eq!(device.times(), vec![0, 110]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tone_sequence_arms_nothing() {
        // Arrange
        let device = RecordingDevice::new();
        let sequencer = BeepSequencer::new(device.clone(), make_gate());

        // Act
        sequencer.beep(FeedbackSituation::FeatureOn);

        // Assert
        assert_eq!(device.times(), vec![0]);
        assert!(!sequencer.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_tones() {
        // Arrange
        let device = RecordingDevice::new();
        let sequencer = BeepSequencer::new(device.clone(), make_gate());
        sequencer.beep(FeedbackSituation::SlowWarn);
        assert!(sequencer.is_playing());

        // Act
        sequencer.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(device.times(), vec![0]);
        assert!(!sequencer.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_sequence_replaces_pending_one() {
        // Arrange
        let device = RecordingDevice::new();
        let sequencer = BeepSequencer::new(device.clone(), make_gate());
        sequencer.beep(FeedbackSituation::SlowWarn);

        // Act
        sequencer.beep(FeedbackSituation::LedOff);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(device.pitches(), vec![pitch::HIGH, pitch::LOW]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_audible_bell_silences_running_sequence() {
        // Arrange
        let device = RecordingDevice::new();
        let gate = make_gate();
        let sequencer = BeepSequencer::new(device.clone(), gate.clone());
        sequencer.beep(FeedbackSituation::SlowWarn);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut controls = Controls::default();
        controls.enabled_ctrls &= !ctrls::AUDIBLE_BELL;

        // Act
        gate.sync(&controls);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(device.times(), vec![0, 190]);
    }

    #[tokio::test]
    async fn test_inaudible_gate_plays_nothing() {
        // Arrange
        let mut device = MockFeedbackDevice::new();
        device.expect_set_tone().never();
        let sequencer = BeepSequencer::new(Arc::new(device), Arc::new(BeepGate::new(0, 50)));

        // Act
        sequencer.beep(FeedbackSituation::LedOn);

        // Assert
        assert!(!sequencer.is_playing());
    }

    #[tokio::test]
    async fn test_first_tone_uses_gate_percent() {
        // Arrange
        let mut device = MockFeedbackDevice::new();
        device
            .expect_set_tone()
            .with(eq(pitch::HIGH), eq(duration::LONG), eq(80))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let gate = make_gate();
        gate.set_percent(80);
        let sequencer = BeepSequencer::new(Arc::new(device), gate);

        // Act / Assert
        sequencer.beep(FeedbackSituation::FeatureOn);
    }

    #[tokio::test]
    async fn test_device_error_is_not_fatal() {
        // Arrange
        let mut device = MockFeedbackDevice::new();
        device
            .expect_set_tone()
            .times(1)
            .returning(|_, _, _| Err(FeedbackError::Unavailable("unplugged".into())));
        let sequencer = BeepSequencer::new(Arc::new(device), make_gate());

        // Act / Assert
        sequencer.beep(FeedbackSituation::SlowReject);
    }

    #[test]
    fn test_beep_outside_runtime_plays_first_tone_only() {
        // Arrange
        let mut device = MockFeedbackDevice::new();
        device
            .expect_set_tone()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let sequencer = BeepSequencer::new(Arc::new(device), make_gate());

        // Act
        sequencer.beep(FeedbackSituation::StickyLock);

        // Assert
        assert!(!sequencer.is_playing());
    }

    #[test]
    fn test_gate_follows_audible_bell_control() {
        // Arrange
        let gate = BeepGate::new(0, 50);
        let mut controls = Controls::default();
        controls.enabled_ctrls = ctrls::AUDIBLE_BELL | ctrls::SLOW_KEYS;

        // Act
        gate.sync(&controls);

        // Assert
        assert!(gate.audible());
    }
}
