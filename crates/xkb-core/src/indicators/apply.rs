//! Explicit indicator changes, including indicators that drive the
//! keyboard, and indicator map changes.

use tracing::debug;

use super::{ext_dev, LedId, LedRegistry};
use crate::changes::Changes;
use crate::keymap::controls::ctrls;
use crate::keymap::indicator_map::{im_flags, im_use};
use crate::keymap::{Controls, IndicatorMap, Keymap, NUM_INDICATORS, NUM_KBD_GROUPS};
use crate::state::{state_changed_flags, KeyboardState};

/// First group in `groups` (`want == true`) or outside it (`want == false`).
fn first_group(groups: u8, want: bool) -> Option<u8> {
    (0..NUM_KBD_GROUPS as u8).find(|g| (groups & (1 << g) != 0) == want)
}

/// Turns an indicator change into a keyboard change for an indicator that
/// drives the keyboard.
///
/// Locked (or effective) conditions set or clear locks, latched conditions
/// set or clear latches, and a controls condition enables or disables those
/// controls.  Returns `true` if anything changed.
pub fn apply_led_change_to_keyboard(
    map: &IndicatorMap,
    on: bool,
    state: &mut KeyboardState,
    controls: &mut Controls,
    changes: &mut Changes,
) -> bool {
    let mut changed = false;

    if map.which_groups & im_use::ANY_GROUP != 0 && map.groups != 0 {
        if map.which_groups & (im_use::LOCKED | im_use::EFFECTIVE) != 0 {
            let in_set = map.groups & (1 << state.locked_group.min(7)) != 0;
            if on != in_set {
                if let Some(g) = first_group(map.groups, on) {
                    state.locked_group = g;
                    changed = true;
                }
            }
        } else if map.which_groups & im_use::LATCHED != 0 {
            let latched = state.latched_group;
            let in_set = (0..8).contains(&latched) && map.groups & (1 << latched) != 0;
            if on != in_set {
                if let Some(g) = first_group(map.groups, on) {
                    state.latched_group = i16::from(g);
                    changed = true;
                }
            }
        }
    }

    if map.which_mods & im_use::ANY_MODS != 0 && map.mods.mask != 0 {
        let mask = map.mods.mask;
        if map.which_mods & (im_use::LOCKED | im_use::EFFECTIVE) != 0 {
            let locked = if on {
                state.locked_mods | mask
            } else {
                state.locked_mods & !mask
            };
            changed |= locked != state.locked_mods;
            state.locked_mods = locked;
        } else if map.which_mods & im_use::LATCHED != 0 {
            let latched = if on {
                state.latched_mods | mask
            } else {
                state.latched_mods & !mask
            };
            changed |= latched != state.latched_mods;
            state.latched_mods = latched;
        }
    }

    if map.ctrls != 0 {
        let old = controls.enabled_ctrls;
        let new = if on { old | map.ctrls } else { old & !map.ctrls };
        if new != old {
            controls.enabled_ctrls = new;
            changes.ctrls.changed_ctrls |= ctrls::CONTROLS_ENABLED;
            changes.ctrls.enabled_ctrls_changes |= old ^ new;
            changed = true;
        }
    }
    changed
}

impl LedRegistry {
    /// Applies an explicit change of the indicators in `which` to `values`.
    ///
    /// Indicators flagged no-explicit ignore the change.  Indicators that
    /// drive the keyboard additionally change the keyboard state, in
    /// ascending index order (so the highest index wins a conflict); the
    /// state is then re-derived and every indicator on the feedback
    /// re-evaluated once.
    ///
    /// Returns `true` if the keyboard state or controls changed.
    pub fn apply_led_state_changes(
        &mut self,
        led: LedId,
        which: u32,
        values: u32,
        keymap: &mut Keymap,
        state: &mut KeyboardState,
        changes: &mut Changes,
    ) -> bool {
        let info = self.find_or_create(led, 0, keymap);
        let maps = *info.maps(keymap);
        let old_state = *state;
        let mut kb_changed = false;
        let mut no_explicit = 0u32;

        for (i, map) in maps.iter().enumerate().take(NUM_INDICATORS) {
            let bit = 1u32 << i;
            if which & bit == 0 {
                continue;
            }
            if map.flags & im_flags::NO_EXPLICIT != 0 {
                no_explicit |= bit;
                continue;
            }
            if map.drives_keyboard() {
                let on = values & bit != 0;
                kb_changed |=
                    apply_led_change_to_keyboard(map, on, state, &mut keymap.ctrls, changes);
            }
        }

        let affect = which & !no_explicit;
        info.explicit_state = (info.explicit_state & !affect) | (values & affect);
        info.explicit_state &= !no_explicit;
        let old_effective = info.effective_state;
        info.effective_state = info.auto_state | info.explicit_state;
        let flipped = old_effective ^ info.effective_state;
        if flipped != 0 {
            info.note_state_change(keymap, flipped, changes);
        }

        if kb_changed {
            state.compute_derived_state(keymap);
            let state_changes = state_changed_flags(&old_state, state);
            changes.state_changes |= state_changes;
            debug!(
                led = ?led,
                which,
                values,
                state_changes,
                "indicator change drove the keyboard"
            );
            let present = info.maps_present;
            info.update_led_auto_state(present, keymap, state, changes);
        }
        kb_changed
    }

    /// Explicit indicator change on the default feedback, followed by a
    /// pass over the other feedbacks affected by any resulting keyboard
    /// change.
    ///
    /// Bits in `affect` naming indicators flagged no-explicit are dropped
    /// without raising an error.
    pub fn set_indicators(
        &mut self,
        affect: u32,
        values: u32,
        keymap: &mut Keymap,
        state: &mut KeyboardState,
        changes: &mut Changes,
    ) {
        let kb_changed =
            self.apply_led_state_changes(LedId::DEFAULT, affect, values, keymap, state, changes);
        if !kb_changed {
            return;
        }
        let state_changes = changes.state_changes;
        let enabled_changes = changes.ctrls.enabled_ctrls_changes;
        for info in self.leds.iter_mut().filter(|l| !l.is_default()) {
            let which = info.indicators_to_update(state_changes, enabled_changes);
            if which != 0 {
                info.update_led_auto_state(which, keymap, state, changes);
            }
        }
    }

    /// Replaces the maps in `which` on `led` and applies the change.
    pub fn set_led_maps(
        &mut self,
        led: LedId,
        which: u32,
        maps: &[IndicatorMap; NUM_INDICATORS],
        keymap: &mut Keymap,
        state: &KeyboardState,
        changes: &mut Changes,
    ) {
        let info = self.find_or_create(led, ext_dev::INDICATOR_MAPS, keymap);
        let target = info.maps_mut(keymap);
        let mut changed = 0;
        for (i, slot) in target.iter_mut().enumerate() {
            if which & (1 << i) != 0 && *slot != maps[i] {
                *slot = maps[i];
                changed |= 1 << i;
            }
        }
        self.apply_led_map_changes(led, changed, keymap, state, changes);
    }

    /// Rebuilds caches after the maps in `changed_maps` were modified,
    /// records the change, and re-evaluates those indicators.
    pub fn apply_led_map_changes(
        &mut self,
        led: LedId,
        changed_maps: u32,
        keymap: &mut Keymap,
        state: &KeyboardState,
        changes: &mut Changes,
    ) {
        if changed_maps == 0 {
            return;
        }
        let info = self.find_or_create(led, ext_dev::INDICATOR_MAPS, keymap);
        info.check_indicator_maps(keymap);
        if info.is_default() {
            changes.indicators.map_changes |= changed_maps;
        }
        changes.note_ext_device(info.ext_device_change(keymap, ext_dev::INDICATOR_MAPS));
        info.update_led_auto_state(changed_maps, keymap, state, changes);
    }
}
