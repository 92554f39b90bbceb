//! KeyboardDevice: one keyboard's keymap, state, indicators and clients.
//!
//! This is the aggregate every keyboard operation goes through.  Each
//! public method follows the same shape:
//!
//! 1. Mutate the keymap or state and collect what changed in a fresh
//!    [`Changes`] record.
//! 2. Re-evaluate the indicators that depend on what changed.
//! 3. Flush: push new LED bits to the feedback device, play the LED cue,
//!    then let the [`NotificationDispatcher`] tell interested clients.
//!
//! The device performs no locking of its own.  The binary keeps it behind a
//! `tokio::sync::Mutex` so state-changing operations never interleave.

use std::sync::Arc;

use tracing::{debug, info, warn};
use xkb_core::{
    accessx::{self, AccessXFeature},
    changes::{Changes, ClientId, EventCause},
    indicators::{LedId, LedRegistry, KBD_FEEDBACK_CLASS},
    keymap::{
        controls::{ax_opts, ctrls, Controls},
        IndicatorMap, Keymap, NUM_INDICATORS,
    },
    protocol::events::{
        nkn_detail, AccessXNotify, ActionMessageNotify, BellNotify, ControlsNotify,
        ExtensionDeviceNotify, NewKeyboardNotify,
    },
    FeedbackSituation, KeyboardState,
};

use super::accessx_feedback::{BeepGate, BeepSequencer, FeedbackDevice};
use super::dispatch_notifications::{ClientInterest, InterestList, NotificationDispatcher};

/// Pitch of the core bell in Hz.
pub const DEFAULT_BELL_PITCH: u16 = 400;
/// Duration of the core bell in milliseconds.
pub const DEFAULT_BELL_DURATION: u16 = 100;

/// A bell request from a client or from the server itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BellRequest {
    pub percent: u8,
    /// Ring even when AudibleBell is off, and notify nobody.
    pub force: bool,
    /// Notify clients without making a sound.
    pub event_only: bool,
    pub name: u32,
    pub window: u32,
}

/// One keyboard and everything hanging off it.
pub struct KeyboardDevice {
    id: u8,
    keymap: Keymap,
    state: KeyboardState,
    leds: LedRegistry,
    interests: InterestList,
    dispatcher: Arc<NotificationDispatcher>,
    feedback: Arc<dyn FeedbackDevice>,
    beeper: BeepSequencer,
    bell_pitch: u16,
    bell_duration: u16,
}

impl KeyboardDevice {
    /// Builds a device around `keymap` with neutral state.
    ///
    /// Indicators are evaluated once without notifying anybody.
    pub fn new(
        mut keymap: Keymap,
        dispatcher: Arc<NotificationDispatcher>,
        feedback: Arc<dyn FeedbackDevice>,
        bell_percent: u8,
    ) -> Self {
        let gate = Arc::new(BeepGate::new(keymap.ctrls.enabled_ctrls, bell_percent));
        let beeper = BeepSequencer::new(Arc::clone(&feedback), gate);
        let mut state = KeyboardState::new();
        state.compute_derived_state(&keymap);

        let mut leds = LedRegistry::new();
        let present = leds.default_led(&mut keymap).maps_present;
        let mut scratch = Changes::default();
        leds.update_indicators(present, &mut keymap, &state, &mut scratch);

        Self {
            id: dispatcher.device_id(),
            keymap,
            state,
            leds,
            interests: InterestList::new(),
            dispatcher,
            feedback,
            beeper,
            bell_pitch: DEFAULT_BELL_PITCH,
            bell_duration: DEFAULT_BELL_DURATION,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn state(&self) -> &KeyboardState {
        &self.state
    }

    pub fn leds(&self) -> &LedRegistry {
        &self.leds
    }

    pub fn interests(&self) -> &InterestList {
        &self.interests
    }

    pub fn beeper(&self) -> &BeepSequencer {
        &self.beeper
    }

    /// Effective state of the default indicator feedback.
    pub fn led_state(&self) -> u32 {
        self.leds
            .get(LedId::DEFAULT)
            .map_or(0, |info| info.effective_state)
    }

    pub fn set_bell_tone(&mut self, pitch: u16, duration: u16) {
        self.bell_pitch = pitch;
        self.bell_duration = duration;
    }

    // ── State ─────────────────────────────────────────────────────────────────

    /// Applies `mutate` to the keyboard state, re-derives it and notifies.
    ///
    /// Plays the sticky-keys cue when a latch or lock came or went.
    pub fn update_state<F>(&mut self, cause: &EventCause, mutate: F) -> Changes
    where
        F: FnOnce(&mut KeyboardState, &Keymap),
    {
        let old = self.state;
        mutate(&mut self.state, &self.keymap);
        let mut changes = Changes::default();
        let state_changes = self
            .state
            .check_secondary_effects(&old, &self.keymap, &mut changes);
        if state_changes != 0 {
            self.leds.update_all_device_indicators(
                state_changes,
                0,
                &mut self.keymap,
                &self.state,
                &mut changes,
            );
            if let Some(cue) = accessx::sticky_feedback(&self.keymap.ctrls, &old, &self.state) {
                self.beeper.beep(cue);
            }
        }
        self.flush(&changes, cause);
        changes
    }

    // ── Controls ──────────────────────────────────────────────────────────────

    /// Replaces the whole control block.
    ///
    /// Turning sticky keys off releases every latch and lock.
    pub fn set_controls(&mut self, new: Controls, cause: &EventCause) -> Changes {
        let mut changes = Changes::default();
        let old = std::mem::replace(&mut self.keymap.ctrls, new);
        self.beeper.gate().sync(&self.keymap.ctrls);
        let Some(diff) = accessx::compute_controls_notify(&old, &self.keymap.ctrls) else {
            return changes;
        };
        changes.ctrls = diff;
        self.after_controls_change(&old, &mut changes);
        self.flush(&changes, cause);
        changes
    }

    /// Turns the controls in `change` on or off according to `values`.
    ///
    /// With a `cause` the controls notification is sent at once; without
    /// one the change is folded into `changes` for the caller to flush.
    /// Returns `false` when no control changed.
    pub fn enable_disable_controls(
        &mut self,
        change: u32,
        values: u32,
        cause: Option<&EventCause>,
        changes: &mut Changes,
    ) -> bool {
        let old = self.keymap.ctrls.enabled_ctrls;
        let new = (old & !change) | (change & values);
        if new == old {
            return false;
        }
        self.keymap.ctrls.enabled_ctrls = new;
        self.beeper.gate().sync(&self.keymap.ctrls);
        let diff = old ^ new;

        match cause {
            Some(cause) => {
                let mut immediate = Changes::default();
                immediate.ctrls.changed_ctrls = ctrls::CONTROLS_ENABLED;
                immediate.ctrls.enabled_ctrls_changes = diff;
                let notify = ControlsNotify::from_changes(
                    &immediate.ctrls,
                    &self.keymap.ctrls,
                    cause,
                );
                self.dispatcher
                    .send_controls_notify(&self.interests, &notify);
            }
            None => {
                changes.ctrls.enabled_ctrls_changes ^= diff;
                if changes.ctrls.enabled_ctrls_changes != 0 {
                    changes.ctrls.changed_ctrls |= ctrls::CONTROLS_ENABLED;
                } else {
                    changes.ctrls.changed_ctrls &= !ctrls::CONTROLS_ENABLED;
                }
            }
        }

        let uses_controls = self.leds.default_led(&mut self.keymap).uses_controls;
        self.leds
            .update_indicators(uses_controls, &mut self.keymap, &self.state, changes);
        true
    }

    /// Switches an AccessX feature and plays the feature cue.
    pub fn set_accessx_feature(
        &mut self,
        feature: AccessXFeature,
        on: bool,
        cause: &EventCause,
    ) -> Changes {
        let old = self.keymap.ctrls.clone();
        let toggle = accessx::set_accessx_feature(&mut self.keymap.ctrls, feature, on);
        self.beeper.gate().sync(&self.keymap.ctrls);
        let mut changes = Changes::default();
        if let Some(diff) = toggle.notify {
            changes.ctrls = diff;
            self.after_controls_change(&old, &mut changes);
        }
        info!(?feature, on, "accessx feature toggled");
        if let Some(cue) = toggle.feedback {
            self.beeper.beep(cue);
        }
        self.flush(&changes, cause);
        changes
    }

    /// Applies the AccessX inactivity timeout.
    pub fn accessx_timeout(&mut self, cause: &EventCause) -> Changes {
        let old = self.keymap.ctrls.clone();
        let (notify, cue) = accessx::accessx_timeout_expired(&mut self.keymap.ctrls);
        self.beeper.gate().sync(&self.keymap.ctrls);
        let mut changes = Changes::default();
        if let Some(diff) = notify {
            changes.ctrls = diff;
            self.after_controls_change(&old, &mut changes);
        }
        if let Some(cue) = cue {
            self.beeper.beep(cue);
        }
        self.flush(&changes, cause);
        changes
    }

    /// Indicator and state follow-up shared by every control change.
    fn after_controls_change(&mut self, old: &Controls, changes: &mut Changes) {
        let sticky_off = old.enabled_ctrls & ctrls::STICKY_KEYS != 0
            && !self.keymap.ctrls.is_enabled(ctrls::STICKY_KEYS);
        if sticky_off {
            self.state
                .clear_all_latches_and_locks(&self.keymap, changes);
        }
        if changes.ctrls.num_groups_changed {
            let before = self.state;
            self.state
                .check_secondary_effects(&before, &self.keymap, changes);
        }
        self.leds.update_all_device_indicators(
            changes.state_changes,
            changes.ctrls.enabled_ctrls_changes,
            &mut self.keymap,
            &self.state,
            changes,
        );
    }

    // ── Indicators ────────────────────────────────────────────────────────────

    /// Explicit indicator change on the default feedback.
    pub fn set_indicators(&mut self, affect: u32, values: u32, cause: &EventCause) -> Changes {
        let mut changes = Changes::default();
        self.leds.set_indicators(
            affect,
            values,
            &mut self.keymap,
            &mut self.state,
            &mut changes,
        );
        self.flush(&changes, cause);
        changes
    }

    /// Replaces the default feedback's maps for the indicators in `which`.
    pub fn set_indicator_maps(
        &mut self,
        which: u32,
        maps: &[IndicatorMap; NUM_INDICATORS],
        cause: &EventCause,
    ) -> Changes {
        let mut changes = Changes::default();
        self.leds.set_led_maps(
            LedId::DEFAULT,
            which,
            maps,
            &mut self.keymap,
            &self.state,
            &mut changes,
        );
        self.flush(&changes, cause);
        changes
    }

    // ── Keymap ────────────────────────────────────────────────────────────────

    /// Installs a new keymap and announces the new keyboard.
    pub fn apply_keymap(&mut self, new: &Keymap, cause: &EventCause) -> Changes {
        let old_min = self.keymap.min_key_code;
        let old_max = self.keymap.max_key_code;
        self.keymap.copy_keymap(new);
        self.beeper.gate().sync(&self.keymap.ctrls);
        self.leds.refresh(&mut self.keymap);

        let mut changes = Changes::default();
        let old_state = self.state;
        self.state
            .check_secondary_effects(&old_state, &self.keymap, &mut changes);
        let present = self.leds.default_led(&mut self.keymap).maps_present;
        self.leds
            .update_indicators(present, &mut self.keymap, &self.state, &mut changes);
        info!(
            min = self.keymap.min_key_code,
            max = self.keymap.max_key_code,
            "installed new keymap"
        );

        let notify = NewKeyboardNotify {
            old_device_id: self.id,
            min_key_code: self.keymap.min_key_code,
            max_key_code: self.keymap.max_key_code,
            old_min_key_code: old_min,
            old_max_key_code: old_max,
            request_major: cause.major,
            request_minor: cause.minor,
            changed: nkn_detail::KEYCODES,
        };
        self.dispatcher.send_new_keyboard_notify(&notify);
        self.flush(&changes, cause);
        changes
    }

    // ── Bell and AccessX cues ─────────────────────────────────────────────────

    /// Rings the bell and tells interested clients.
    ///
    /// Returns the number of clients notified.
    pub fn ring_bell(&self, request: &BellRequest) -> usize {
        let audible = self.keymap.ctrls.is_enabled(ctrls::AUDIBLE_BELL);
        if (request.force || audible) && !request.event_only {
            if let Err(e) =
                self.feedback
                    .set_tone(self.bell_pitch, self.bell_duration, request.percent)
            {
                warn!("bell dropped: {e}");
            }
        }
        if request.force {
            return 0;
        }
        let notify = BellNotify {
            bell_class: KBD_FEEDBACK_CLASS as u8,
            bell_id: 0,
            percent: request.percent,
            pitch: self.bell_pitch,
            duration: self.bell_duration,
            name: request.name,
            window: request.window,
            event_only: request.event_only,
        };
        self.dispatcher.send_bell_notify(&self.interests, &notify)
    }

    /// Plays the cue for `situation` if AccessX feedback allows `option`.
    ///
    /// Returns `true` if a sequence was started.
    pub fn accessx_beep(&self, option: u16, situation: FeedbackSituation) -> bool {
        if !self.keymap.ctrls.need_feedback(option) {
            return false;
        }
        self.beeper.beep(situation);
        true
    }

    /// Reports an AccessX event (slow keys, bounce keys, timeout warning).
    pub fn send_accessx_notify(&self, detail: u16, keycode: u8) -> usize {
        let notify = AccessXNotify {
            keycode,
            detail,
            slow_keys_delay: self.keymap.ctrls.slow_keys_delay,
            debounce_delay: self.keymap.ctrls.debounce_delay,
        };
        self.dispatcher.send_access_x_notify(&self.interests, &notify)
    }

    pub fn send_action_message(&self, notify: ActionMessageNotify) -> usize {
        self.dispatcher
            .send_action_message(&self.interests, &self.state, notify)
    }

    // ── Client interests ──────────────────────────────────────────────────────

    pub fn add_client_resource(
        &mut self,
        client: ClientId,
        resource: u32,
    ) -> Option<&mut ClientInterest> {
        self.interests.add_client_resource(client, resource)
    }

    pub fn find_client_resource(&mut self, client: ClientId) -> Option<&mut ClientInterest> {
        self.interests.find_client_resource(client)
    }

    /// Drops the selection made under `resource` and reverts the controls
    /// its client asked to have restored.
    pub fn remove_resource_client(&mut self, resource: u32) -> Option<ClientInterest> {
        let interest = self.interests.remove_resource_client(resource)?;
        debug!(client = %interest.client, resource, "removed client interest");
        if interest.auto_ctrls != 0 {
            let cause = EventCause::request(interest.client, 0, 0);
            let mut changes = Changes::default();
            self.enable_disable_controls(
                interest.auto_ctrls,
                interest.auto_ctrls_values,
                Some(&cause),
                &mut changes,
            );
            self.flush(&changes, &cause);
        }
        Some(interest)
    }

    // ── Flush ─────────────────────────────────────────────────────────────────

    fn flush(&self, changes: &Changes, cause: &EventCause) {
        let led_state = self.led_state();
        let led_changes = changes.indicators.state_changes;
        if led_changes != 0 {
            if let Err(e) = self.feedback.set_led_bits(led_changes, led_state) {
                warn!("LED update dropped: {e}");
            }
            if self.keymap.ctrls.need_feedback(ax_opts::INDICATOR_FB) {
                self.beeper
                    .beep(FeedbackSituation::for_indicator_state(led_state));
            }
        }
        if changes.is_empty() {
            return;
        }
        self.dispatcher.send_notification(
            &self.interests,
            changes,
            cause,
            &self.keymap,
            &self.state,
            led_state,
        );
        for device in &changes.ext_devices {
            self.dispatcher
                .send_extension_device_notify(&self.interests, &ExtensionDeviceNotify::from(device));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
