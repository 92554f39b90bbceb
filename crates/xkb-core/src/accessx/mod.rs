//! AccessX feedback tables and control transitions.
//!
//! # Beep sequences (for beginners)
//!
//! Accessibility features such as sticky keys or slow keys give audible
//! feedback: a short high tone when a feature switches on, a low one when it
//! switches off, a low-then-high pair when a modifier latches, and so on.
//! Each [`FeedbackSituation`] maps to a fixed [`BeepSequence`]: a list of
//! tones separated by a constant gap.
//!
//! This module only describes the sequences.  Playing them takes a timer,
//! so the server crate owns the sequencer: it plays step 0 at once, asks
//! [`BeepSequence::step`] for the next step, sleeps for
//! [`BeepStep::next_delay`] and repeats until a step reports no follow-up.
//!
//! The rest of the module holds the pure parts of AccessX control changes:
//! diffing two control blocks into a notification, applying the timeout
//! policy, and picking sticky-key feedback from a state transition.

use crate::changes::ControlsChanges;
use crate::keymap::controls::{ax_opts, ctrls};
use crate::keymap::Controls;
use crate::state::KeyboardState;

// ── Tone constants ────────────────────────────────────────────────────────────

/// Tone pitches in Hz.
pub mod pitch {
    pub const HIGH: u16 = 2000;
    pub const CLICK: u16 = 1500;
    pub const MID: u16 = 1000;
    pub const LOW: u16 = 500;
    pub const DEFAULT: u16 = 400;
}

/// Tone durations in milliseconds.
pub mod duration {
    pub const CLICK: u16 = 1;
    pub const SHORT: u16 = 50;
    pub const LONG: u16 = 100;
    pub const VERY_LONG: u16 = 200;
}

/// Silence between consecutive tones, in milliseconds.
pub mod gap {
    pub const SHORT_DELAY: u16 = 60;
    pub const LONG_DELAY: u16 = 140;
}

/// `detail` values carried by AccessX notifications.
pub mod detail {
    pub const SK_PRESS: u16 = 0;
    pub const SK_ACCEPT: u16 = 1;
    pub const SK_REJECT: u16 = 2;
    pub const SK_RELEASE: u16 = 3;
    pub const BK_ACCEPT: u16 = 4;
    pub const BK_REJECT: u16 = 5;
    pub const AXK_WARNING: u16 = 6;
}

// ── Situations and sequences ──────────────────────────────────────────────────

/// Something worth an audible cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackSituation {
    FeatureOn,
    FeatureOff,
    FeatureChange,
    SlowWarn,
    SlowPress,
    SlowAccept,
    SlowReject,
    SlowRelease,
    StickyLatch,
    StickyLock,
    StickyUnlock,
    LedOn,
    LedOff,
    LedChange,
    BounceReject,
}

/// A single tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub pitch: u16,
    pub duration: u16,
}

impl Tone {
    pub const fn new(pitch: u16, duration: u16) -> Self {
        Self { pitch, duration }
    }
}

const HIGH_SHORT: Tone = Tone::new(pitch::HIGH, duration::SHORT);
const HIGH_LONG: Tone = Tone::new(pitch::HIGH, duration::LONG);
const LOW_SHORT: Tone = Tone::new(pitch::LOW, duration::SHORT);
const LOW_LONG: Tone = Tone::new(pitch::LOW, duration::LONG);
const LOW_CLICK: Tone = Tone::new(pitch::LOW, duration::CLICK);
const CLICK: Tone = Tone::new(pitch::CLICK, duration::CLICK);
const DEFAULT_SHORT: Tone = Tone::new(pitch::DEFAULT, duration::SHORT);

/// The fixed tone list for one situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepSequence {
    pub tones: &'static [Tone],
    /// Silence after each tone before the next one starts.
    pub gap: u16,
}

/// One tone of a sequence plus whether another one follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepStep {
    pub tone: Tone,
    /// Gap before the next tone, or `None` when this is the last one.
    pub follow_up: Option<u16>,
}

impl BeepStep {
    /// Milliseconds to wait after starting this tone before playing the next.
    ///
    /// `elapsed` is how long emitting the tone already took; the delay is
    /// shortened by that much and never goes below zero.
    pub fn next_delay(&self, elapsed: u64) -> Option<u64> {
        self.follow_up.map(|gap| {
            let full = u64::from(gap) + u64::from(self.tone.duration);
            full.saturating_sub(elapsed)
        })
    }
}

impl FeedbackSituation {
    /// The tone list for this situation.
    pub fn sequence(self) -> BeepSequence {
        use FeedbackSituation::*;
        const SHORT: u16 = gap::SHORT_DELAY;
        let (tones, gap): (&'static [Tone], u16) = match self {
            FeatureOn => (&[HIGH_LONG], SHORT),
            FeatureOff => (&[LOW_LONG], SHORT),
            FeatureChange | LedChange => (&[HIGH_SHORT, LOW_SHORT], SHORT),
            LedOn => (&[HIGH_SHORT], SHORT),
            LedOff => (&[LOW_SHORT], SHORT),
            SlowWarn => (&[HIGH_SHORT, HIGH_SHORT, HIGH_SHORT], gap::LONG_DELAY),
            SlowPress => (&[CLICK], SHORT),
            SlowAccept | SlowRelease => (&[DEFAULT_SHORT], SHORT),
            SlowReject => (&[LOW_SHORT], SHORT),
            BounceReject => (&[LOW_CLICK], SHORT),
            StickyLatch => (&[LOW_SHORT, HIGH_SHORT], SHORT),
            StickyLock => (&[LOW_SHORT, HIGH_SHORT, HIGH_SHORT], SHORT),
            StickyUnlock => (&[LOW_SHORT], SHORT),
        };
        BeepSequence { tones, gap }
    }

    /// The LED cue for an indicator whose effective state is `effective`.
    pub fn for_indicator_state(effective: u32) -> Self {
        if effective != 0 {
            FeedbackSituation::LedOn
        } else {
            FeedbackSituation::LedOff
        }
    }
}

impl BeepSequence {
    /// Step `count` of the sequence, or `None` once it is exhausted.
    pub fn step(&self, count: usize) -> Option<BeepStep> {
        let tone = *self.tones.get(count)?;
        let follow_up = (count + 1 < self.tones.len()).then_some(self.gap);
        Some(BeepStep { tone, follow_up })
    }
}

// ── Control transitions ───────────────────────────────────────────────────────

/// Diffs two control blocks into the payload of a controls notification.
///
/// Returns `None` when no setting changed and the group count is the same.
pub fn compute_controls_notify(old: &Controls, new: &Controls) -> Option<ControlsChanges> {
    let changed_ctrls = old.changed_controls(new);
    let num_groups_changed = old.num_groups != new.num_groups;
    if changed_ctrls == 0 && !num_groups_changed {
        return None;
    }
    Some(ControlsChanges {
        changed_ctrls,
        enabled_ctrls_changes: old.enabled_ctrls ^ new.enabled_ctrls,
        num_groups_changed,
    })
}

/// Which AccessX feature a toggle switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessXFeature {
    /// Slow keys and/or bounce keys; carries the [`ctrls`] bits to enable.
    KeyboardResponse(u32),
    StickyKeys,
}

impl AccessXFeature {
    fn mask(self, on: bool) -> u32 {
        match self {
            // Turning the response group off always clears both halves.
            AccessXFeature::KeyboardResponse(bits) if on => bits & ctrls::KRG,
            AccessXFeature::KeyboardResponse(_) => ctrls::KRG,
            AccessXFeature::StickyKeys => ctrls::STICKY_KEYS,
        }
    }
}

/// Outcome of switching an AccessX feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggle {
    pub notify: Option<ControlsChanges>,
    /// Feature cue to play, if feature feedback is enabled.
    pub feedback: Option<FeedbackSituation>,
    /// Sticky keys went off: every latch and lock must be released.
    pub clear_latches: bool,
}

/// Switches `feature` on or off in `controls`.
pub fn set_accessx_feature(
    controls: &mut Controls,
    feature: AccessXFeature,
    on: bool,
) -> FeatureToggle {
    let old = controls.clone();
    let mask = feature.mask(on);
    if on {
        controls.enabled_ctrls |= mask;
    } else {
        controls.enabled_ctrls &= !mask;
    }
    let feedback = controls.need_feedback(ax_opts::FEATURE_FB).then_some(if on {
        FeedbackSituation::FeatureOn
    } else {
        FeedbackSituation::FeatureOff
    });
    FeatureToggle {
        notify: compute_controls_notify(&old, controls),
        feedback,
        clear_latches: !on && feature == AccessXFeature::StickyKeys,
    }
}

/// Applies the AccessX timeout: the configured controls and options are
/// forced to their timeout values.
///
/// Returns the controls notification (if any) and the feature cue.  Both
/// set and cleared options give a "change" cue, only set ones "on", only
/// cleared ones "off".
pub fn accessx_timeout_expired(
    controls: &mut Controls,
) -> (Option<ControlsChanges>, Option<FeedbackSituation>) {
    let old = controls.clone();
    controls.enabled_ctrls &= !controls.axt_ctrls_mask;
    controls.enabled_ctrls |= controls.axt_ctrls_values & controls.axt_ctrls_mask;
    if controls.axt_opts_mask != 0 {
        controls.ax_options &= !controls.axt_opts_mask;
        controls.ax_options |= controls.axt_opts_values & controls.axt_opts_mask;
    }
    let notify = compute_controls_notify(&old, controls);
    let set = controls.ax_options & !old.ax_options;
    let cleared = !controls.ax_options & old.ax_options;
    let feedback = match (set != 0, cleared != 0) {
        (true, true) => Some(FeedbackSituation::FeatureChange),
        (true, false) => Some(FeedbackSituation::FeatureOn),
        (false, true) => Some(FeedbackSituation::FeatureOff),
        (false, false) => None,
    };
    (notify, feedback)
}

/// Picks the sticky-keys cue for a latch or lock transition.
///
/// Returns `None` unless sticky keys and their feedback are enabled.  An
/// unlock outranks a new lock, which outranks a new latch.
pub fn sticky_feedback(
    controls: &Controls,
    old: &KeyboardState,
    new: &KeyboardState,
) -> Option<FeedbackSituation> {
    if !controls.is_enabled(ctrls::STICKY_KEYS)
        || !controls.need_feedback(ax_opts::STICKY_KEYS_FB)
    {
        return None;
    }
    let unlocked = (old.locked_mods & !new.locked_mods != 0)
        || (old.locked_group != 0 && new.locked_group == 0);
    let locked = (new.locked_mods & !old.locked_mods != 0)
        || (new.locked_group != old.locked_group && new.locked_group != 0);
    let latched = (new.latched_mods & !old.latched_mods != 0)
        || (new.latched_group != old.latched_group && new.latched_group != 0);
    if unlocked {
        Some(FeedbackSituation::StickyUnlock)
    } else if locked {
        Some(FeedbackSituation::StickyLock)
    } else if latched {
        Some(FeedbackSituation::StickyLatch)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::mods;

    fn make_sticky_controls() -> Controls {
        let mut controls = Controls::default();
        controls.enabled_ctrls |= ctrls::STICKY_KEYS;
        controls
    }

    // ── Sequences ─────────────────────────────────────────────────────────────

    #[test]
    fn test_slow_warn_is_three_short_high_tones() {
        // Arrange
        let sequence = FeedbackSituation::SlowWarn.sequence();

        // Act
        let steps: Vec<BeepStep> = (0..).map_while(|i| sequence.step(i)).collect();

        // Assert
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.tone == HIGH_SHORT));
        assert_eq!(steps[0].follow_up, Some(gap::LONG_DELAY));
        assert_eq!(steps[1].follow_up, Some(gap::LONG_DELAY));
        assert_eq!(steps[2].follow_up, None);
    }

    #[test]
    fn test_sticky_latch_is_low_then_high() {
        let sequence = FeedbackSituation::StickyLatch.sequence();
        assert_eq!(sequence.tones, &[LOW_SHORT, HIGH_SHORT]);
        assert_eq!(FeedbackSituation::StickyLock.sequence().tones.len(), 3);
    }

    #[test]
    fn test_single_tone_situations_have_no_follow_up() {
        for situation in [
            FeedbackSituation::FeatureOn,
            FeedbackSituation::FeatureOff,
            FeedbackSituation::SlowPress,
            FeedbackSituation::BounceReject,
            FeedbackSituation::StickyUnlock,
        ] {
            let step = situation.sequence().step(0).expect("first step");
            assert_eq!(step.follow_up, None, "{situation:?}");
        }
    }

    #[test]
    fn test_next_delay_subtracts_elapsed_and_saturates() {
        // Arrange
        let step = FeedbackSituation::FeatureChange.sequence().step(0).expect("step");

        // Act / Assert
        assert_eq!(step.next_delay(0), Some(110));
        assert_eq!(step.next_delay(30), Some(80));
        assert_eq!(step.next_delay(500), Some(0));
    }

    // ── Controls ──────────────────────────────────────────────────────────────

    #[test]
    fn test_compute_controls_notify_none_when_unchanged() {
        let controls = Controls::default();
        assert_eq!(compute_controls_notify(&controls, &controls.clone()), None);
    }

    #[test]
    fn test_compute_controls_notify_reports_group_count_only_change() {
        // Arrange
        let old = Controls::default();
        let mut new = old.clone();
        new.num_groups = 2;

        // Act
        let notify = compute_controls_notify(&old, &new).expect("notify");

        // Assert
        assert_eq!(notify.changed_ctrls, 0);
        assert!(notify.num_groups_changed);
    }

    #[test]
    fn test_enabling_slow_keys_beeps_feature_on() {
        // Arrange
        let mut controls = Controls::default();

        // Act
        let toggle = set_accessx_feature(
            &mut controls,
            AccessXFeature::KeyboardResponse(ctrls::SLOW_KEYS),
            true,
        );

        // Assert
        assert!(controls.is_enabled(ctrls::SLOW_KEYS));
        assert!(!controls.is_enabled(ctrls::BOUNCE_KEYS));
        let notify = toggle.notify.expect("notify");
        assert_eq!(notify.enabled_ctrls_changes, ctrls::SLOW_KEYS);
        assert_eq!(toggle.feedback, Some(FeedbackSituation::FeatureOn));
        assert!(!toggle.clear_latches);
    }

    #[test]
    fn test_disabling_sticky_keys_requests_latch_clear() {
        // Arrange
        let mut controls = make_sticky_controls();
        controls.enabled_ctrls &= !ctrls::ACCESSX_FEEDBACK;

        // Act
        let toggle = set_accessx_feature(&mut controls, AccessXFeature::StickyKeys, false);

        // Assert
        assert!(!controls.is_enabled(ctrls::STICKY_KEYS));
        assert!(toggle.clear_latches);
        assert_eq!(toggle.feedback, None, "feature feedback is off");
    }

    #[test]
    fn test_timeout_clears_masked_controls_and_cues_off() {
        // Arrange
        let mut controls = make_sticky_controls();
        controls.ax_options |= ax_opts::INDICATOR_FB;

        // Act
        let (notify, feedback) = accessx_timeout_expired(&mut controls);

        // Assert
        assert!(!controls.is_enabled(ctrls::STICKY_KEYS));
        assert_eq!(controls.ax_options & ax_opts::INDICATOR_FB, 0);
        assert!(notify.is_some());
        assert_eq!(feedback, Some(FeedbackSituation::FeatureOff));
    }

    #[test]
    fn test_timeout_with_set_and_cleared_options_cues_change() {
        // Arrange
        let mut controls = Controls::default();
        controls.axt_opts_mask = ax_opts::INDICATOR_FB | ax_opts::SK_PRESS_FB;
        controls.axt_opts_values = ax_opts::INDICATOR_FB;

        // Act
        let (_, feedback) = accessx_timeout_expired(&mut controls);

        // Assert
        assert_eq!(feedback, Some(FeedbackSituation::FeatureChange));
    }

    // ── Sticky keys ───────────────────────────────────────────────────────────

    #[test]
    fn test_sticky_feedback_classifies_transitions() {
        // Arrange
        let controls = make_sticky_controls();
        let idle = KeyboardState::new();
        let latched = KeyboardState {
            latched_mods: mods::SHIFT,
            ..idle
        };
        let locked = KeyboardState {
            locked_mods: mods::SHIFT,
            ..idle
        };

        // Act / Assert
        assert_eq!(
            sticky_feedback(&controls, &idle, &latched),
            Some(FeedbackSituation::StickyLatch)
        );
        assert_eq!(
            sticky_feedback(&controls, &latched, &locked),
            Some(FeedbackSituation::StickyLock)
        );
        assert_eq!(
            sticky_feedback(&controls, &locked, &idle),
            Some(FeedbackSituation::StickyUnlock)
        );
        assert_eq!(sticky_feedback(&controls, &idle, &idle), None);
    }

    #[test]
    fn test_sticky_feedback_silent_when_sticky_keys_off() {
        let controls = Controls::default();
        let latched = KeyboardState {
            latched_mods: mods::CONTROL,
            ..KeyboardState::new()
        };
        assert_eq!(sticky_feedback(&controls, &KeyboardState::new(), &latched), None);
    }
}
