//! Indicator engine: automatic, explicit and effective LED state per
//! feedback device.
//!
//! # How an indicator decides to light (for beginners)
//!
//! Every indicator has a map ([`IndicatorMap`]) describing what it watches:
//! some modifiers, some groups, some controls.  Whenever the keyboard state
//! changes, the engine re-evaluates the maps of the indicators that watch
//! the changed components and sets their **automatic** bit.  Clients can
//! additionally force an indicator on with an **explicit** bit.  The
//! **effective** state a client sees is simply `automatic | explicit`.
//!
//! Re-scanning all 32 maps on every key press would be wasteful, so each
//! [`LedInfo`] caches which indicators use base, latched, locked, effective
//! or compat state, or controls.  [`LedInfo::indicators_to_update`] turns a
//! state change mask into the handful of indicators worth re-evaluating.

mod apply;

use tracing::trace;

use crate::changes::{Changes, ExtDeviceChange};
use crate::keymap::indicator_map::{im_flags, im_use};
use crate::keymap::names::parts;
use crate::keymap::{Atom, IndicatorMap, Keymap, NONE_ATOM, NUM_INDICATORS};
use crate::state::{state_parts, KeyboardState};

/// Feedback class of the core keyboard feedback.
pub const KBD_FEEDBACK_CLASS: u16 = 0;
/// Feedback class of stand-alone LED feedbacks.
pub const LED_FEEDBACK_CLASS: u16 = 4;

/// Extension-device change reasons and feature bits.
pub mod ext_dev {
    pub const KEYBOARDS: u16 = 1 << 0;
    pub const BUTTON_ACTIONS: u16 = 1 << 1;
    pub const INDICATOR_NAMES: u16 = 1 << 2;
    pub const INDICATOR_MAPS: u16 = 1 << 3;
    pub const INDICATOR_STATE: u16 = 1 << 4;
    pub const UNSUPPORTED_FEATURE: u16 = 1 << 15;
    /// Every feature this engine supports.
    pub const ALL_FEATURES: u16 = 0x001f;
}

/// [`LedInfo`] flag bits.
pub mod led_flags {
    /// The core keyboard feedback; maps and names live in the keymap.
    pub const IS_DEFAULT: u8 = 1 << 0;
    /// The feedback keeps its own LED state.
    pub const HAS_OWN_STATE: u8 = 1 << 1;
}

/// Identifies one LED feedback on a keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedId {
    pub class: u16,
    pub id: u16,
}

impl LedId {
    /// The core keyboard feedback.
    pub const DEFAULT: LedId = LedId {
        class: KBD_FEEDBACK_CLASS,
        id: 0,
    };
}

/// Runtime indicator information for one feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedInfo {
    pub led: LedId,
    pub flags: u8,
    pub phys_indicators: u32,
    pub auto_state: u32,
    pub explicit_state: u32,
    pub effective_state: u32,
    pub maps_present: u32,
    pub names_present: u32,
    pub uses_base: u32,
    pub uses_latched: u32,
    pub uses_locked: u32,
    pub uses_effective: u32,
    pub uses_compat: u32,
    pub uses_controls: u32,
    /// [`state_parts`] bits any indicator on this feedback watches.
    pub used_components: u16,
    /// Private maps; `None` for the default feedback.
    maps: Option<Box<[IndicatorMap; NUM_INDICATORS]>>,
    /// Private names; `None` for the default feedback.
    names: Option<Box<[Atom; NUM_INDICATORS]>>,
}

const NO_MAPS: [IndicatorMap; NUM_INDICATORS] = [IndicatorMap::EMPTY; NUM_INDICATORS];
const NO_NAMES: [Atom; NUM_INDICATORS] = [NONE_ATOM; NUM_INDICATORS];

impl LedInfo {
    fn new(led: LedId, needed_parts: u16, initial_state: u32) -> Self {
        let is_default = led == LedId::DEFAULT;
        let own_maps = !is_default && needed_parts & ext_dev::INDICATOR_MAPS != 0;
        let own_names = !is_default && needed_parts & ext_dev::INDICATOR_NAMES != 0;
        Self {
            led,
            flags: if is_default {
                led_flags::IS_DEFAULT | led_flags::HAS_OWN_STATE
            } else {
                led_flags::HAS_OWN_STATE
            },
            phys_indicators: 0,
            auto_state: 0,
            explicit_state: initial_state,
            effective_state: initial_state,
            maps_present: 0,
            names_present: 0,
            uses_base: 0,
            uses_latched: 0,
            uses_locked: 0,
            uses_effective: 0,
            uses_compat: 0,
            uses_controls: 0,
            used_components: 0,
            maps: own_maps.then(|| Box::new(NO_MAPS)),
            names: own_names.then(|| Box::new(NO_NAMES)),
        }
    }

    pub fn is_default(&self) -> bool {
        self.flags & led_flags::IS_DEFAULT != 0
    }

    /// The indicator maps of this feedback.
    pub fn maps<'a>(&'a self, keymap: &'a Keymap) -> &'a [IndicatorMap; NUM_INDICATORS] {
        if self.is_default() {
            return &keymap.indicators.maps;
        }
        self.maps.as_deref().unwrap_or(&NO_MAPS)
    }

    /// Mutable maps: the keymap's for the default feedback, otherwise the
    /// private ones (allocated on demand).
    pub fn maps_mut<'a>(
        &'a mut self,
        keymap: &'a mut Keymap,
    ) -> &'a mut [IndicatorMap; NUM_INDICATORS] {
        if self.is_default() {
            return &mut keymap.indicators.maps;
        }
        self.maps.get_or_insert_with(|| Box::new(NO_MAPS))
    }

    /// The indicator names of this feedback.
    pub fn names<'a>(&'a self, keymap: &'a Keymap) -> &'a [Atom; NUM_INDICATORS] {
        if self.is_default() {
            return keymap.names.as_ref().map_or(&NO_NAMES, |n| &n.indicators);
        }
        self.names.as_deref().unwrap_or(&NO_NAMES)
    }

    /// Rebuilds the "uses" caches and `maps_present`, and resolves every
    /// map's virtual modifiers into a real mask.
    pub fn check_indicator_maps(&mut self, keymap: &mut Keymap) {
        let mut maps = *self.maps(keymap);
        self.uses_base = 0;
        self.uses_latched = 0;
        self.uses_locked = 0;
        self.uses_effective = 0;
        self.uses_compat = 0;
        self.uses_controls = 0;
        self.maps_present = 0;

        for (i, map) in maps.iter_mut().enumerate() {
            let bit = 1u32 << i;
            if !map.is_in_use() {
                continue;
            }
            self.maps_present |= bit;
            map.mods.mask = map.mods.real_mods | keymap.mask_for_vmask(map.mods.vmods);
            if map.flags & im_flags::NO_AUTOMATIC != 0 {
                continue;
            }
            let watched =
                (map.which_groups & im_use::ANY_GROUP) | (map.which_mods & im_use::ANY_MODS);
            if watched & im_use::BASE != 0 {
                self.uses_base |= bit;
            }
            if watched & im_use::LATCHED != 0 {
                self.uses_latched |= bit;
            }
            if watched & im_use::LOCKED != 0 {
                self.uses_locked |= bit;
            }
            if watched & im_use::EFFECTIVE != 0 {
                self.uses_effective |= bit;
            }
            if watched & im_use::COMPAT != 0 {
                self.uses_compat |= bit;
            }
            if map.ctrls != 0 {
                self.uses_controls |= bit;
            }
        }
        *self.maps_mut(keymap) = maps;

        self.used_components = 0;
        if self.uses_base != 0 {
            self.used_components |= state_parts::MODIFIER_BASE | state_parts::GROUP_BASE;
        }
        if self.uses_latched != 0 {
            self.used_components |= state_parts::MODIFIER_LATCH | state_parts::GROUP_LATCH;
        }
        if self.uses_locked != 0 {
            self.used_components |= state_parts::MODIFIER_LOCK | state_parts::GROUP_LOCK;
        }
        if self.uses_effective != 0 {
            self.used_components |= state_parts::MODIFIER_STATE | state_parts::GROUP_STATE;
        }
        if self.uses_compat != 0 {
            self.used_components |= state_parts::COMPAT_STATE;
        }
    }

    /// Recomputes `names_present`.
    pub fn check_indicator_names(&mut self, keymap: &Keymap) {
        self.names_present = self
            .names(keymap)
            .iter()
            .enumerate()
            .filter(|(_, &atom)| atom != NONE_ATOM)
            .fold(0, |acc, (i, _)| acc | (1 << i));
    }

    /// Indicators whose automatic state may change given these state and
    /// enabled-control changes.
    pub fn indicators_to_update(&self, state_changes: u16, enabled_ctrl_changes: u32) -> u32 {
        let mut update = 0;
        if state_changes & (state_parts::MODIFIER_STATE | state_parts::GROUP_STATE) != 0 {
            update |= self.uses_effective;
        }
        if state_changes & (state_parts::MODIFIER_BASE | state_parts::GROUP_BASE) != 0 {
            update |= self.uses_base;
        }
        if state_changes & (state_parts::MODIFIER_LATCH | state_parts::GROUP_LATCH) != 0 {
            update |= self.uses_latched;
        }
        if state_changes & (state_parts::MODIFIER_LOCK | state_parts::GROUP_LOCK) != 0 {
            update |= self.uses_locked;
        }
        if state_changes & state_parts::COMPAT_STATE != 0 {
            update |= self.uses_compat;
        }
        if enabled_ctrl_changes != 0 {
            update |= self.uses_controls;
        }
        update
    }

    /// Re-evaluates the automatic state of the indicators in `which` and
    /// returns the indicators whose effective state flipped.
    ///
    /// Only indicators with a map are evaluated; the others keep their
    /// automatic bit.  Afterwards `effective == auto | explicit` holds.
    pub fn update_led_auto_state(
        &mut self,
        which: u32,
        keymap: &Keymap,
        state: &KeyboardState,
        changes: &mut Changes,
    ) -> u32 {
        let which = which & self.maps_present;
        let maps = self.maps(keymap);
        let mut auto_state = self.auto_state;
        for (i, map) in maps.iter().enumerate() {
            let bit = 1u32 << i;
            if which & bit == 0 {
                continue;
            }
            if compute_auto_state(map, state, keymap) {
                auto_state |= bit;
            } else {
                auto_state &= !bit;
            }
        }
        self.auto_state = auto_state;
        let old = self.effective_state;
        self.effective_state = self.auto_state | self.explicit_state;
        let flipped = old ^ self.effective_state;
        if flipped != 0 {
            trace!(led = ?self.led, flipped, effective = self.effective_state, "indicator state changed");
            self.note_state_change(keymap, flipped, changes);
        }
        flipped
    }

    fn note_state_change(&self, keymap: &Keymap, flipped: u32, changes: &mut Changes) {
        if self.is_default() {
            changes.indicators.state_changes |= flipped;
        }
        changes.note_ext_device(self.ext_device_change(keymap, ext_dev::INDICATOR_STATE));
    }

    fn ext_device_change(&self, keymap: &Keymap, reason: u16) -> ExtDeviceChange {
        let names_present = if self.is_default() {
            keymap.names.as_ref().map_or(0, |n| n.indicators_present())
        } else {
            self.names_present
        };
        ExtDeviceChange {
            reason,
            led_class: self.led.class,
            led_id: self.led.id,
            leds_defined: names_present | self.maps_present,
            led_state: self.effective_state,
            supported: ext_dev::ALL_FEATURES,
            ..ExtDeviceChange::default()
        }
    }
}

/// Evaluates one indicator map against the keyboard state.
///
/// A map without any condition lights unconditionally.
pub fn compute_auto_state(map: &IndicatorMap, state: &KeyboardState, keymap: &Keymap) -> bool {
    if map.flags & im_flags::NO_AUTOMATIC != 0 {
        return false;
    }
    if map.is_unconditional() {
        return true;
    }
    let mut on = false;
    if map.which_mods & im_use::ANY_MODS != 0 {
        let mut mods = 0;
        if map.which_mods & im_use::BASE != 0 {
            mods |= state.base_mods;
        }
        if map.which_mods & im_use::LATCHED != 0 {
            mods |= state.latched_mods;
        }
        if map.which_mods & im_use::LOCKED != 0 {
            mods |= state.locked_mods;
        }
        if map.which_mods & im_use::EFFECTIVE != 0 {
            mods |= state.mods;
        }
        if map.which_mods & im_use::COMPAT != 0 {
            mods |= state.compat_state;
        }
        on = map.mods.mask & mods != 0
            || (mods == 0 && map.mods.mask == 0 && map.mods.vmods == 0);
    }
    if map.which_groups & im_use::ANY_GROUP != 0 {
        let in_set = |group: i32| (0..8).contains(&group) && map.groups & (1 << group) != 0;
        if map.which_groups & im_use::BASE != 0 {
            on = on || in_set(i32::from(state.base_group));
        }
        if map.which_groups & im_use::LATCHED != 0 {
            on = on || in_set(i32::from(state.latched_group));
        }
        if map.which_groups & im_use::LOCKED != 0 {
            on = on || in_set(i32::from(state.locked_group));
        }
        if map.which_groups & im_use::EFFECTIVE != 0 {
            on = on || in_set(i32::from(state.group));
        }
    }
    if map.ctrls != 0 {
        on = on || keymap.ctrls.enabled_ctrls & map.ctrls != 0;
    }
    on
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// All LED feedbacks of one keyboard, created lazily on first reference.
#[derive(Debug, Clone, Default)]
pub struct LedRegistry {
    leds: Vec<LedInfo>,
}

impl LedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the feedback `led`, creating it when absent.
    ///
    /// A new non-default feedback gets private maps and names for the parts
    /// named by `needed_parts` ([`ext_dev`] bits).
    pub fn find_or_create(
        &mut self,
        led: LedId,
        needed_parts: u16,
        keymap: &mut Keymap,
    ) -> &mut LedInfo {
        let index = match self.leds.iter().position(|l| l.led == led) {
            Some(i) => i,
            None => {
                let mut info = LedInfo::new(led, needed_parts, 0);
                if info.is_default() {
                    info.phys_indicators = keymap.indicators.phys_indicators;
                }
                info.check_indicator_maps(keymap);
                info.check_indicator_names(keymap);
                self.leds.push(info);
                self.leds.len() - 1
            }
        };
        let info = &mut self.leds[index];
        if !info.is_default() {
            if needed_parts & ext_dev::INDICATOR_MAPS != 0 && info.maps.is_none() {
                info.maps = Some(Box::new(NO_MAPS));
            }
            if needed_parts & ext_dev::INDICATOR_NAMES != 0 && info.names.is_none() {
                info.names = Some(Box::new(NO_NAMES));
            }
        }
        info
    }

    /// The default keyboard feedback.
    pub fn default_led(&mut self, keymap: &mut Keymap) -> &mut LedInfo {
        self.find_or_create(LedId::DEFAULT, 0, keymap)
    }

    pub fn get(&self, led: LedId) -> Option<&LedInfo> {
        self.leds.iter().find(|l| l.led == led)
    }

    /// Removes a feedback when its device goes away.
    pub fn remove(&mut self, led: LedId) -> Option<LedInfo> {
        let index = self.leds.iter().position(|l| l.led == led)?;
        Some(self.leds.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedInfo> {
        self.leds.iter()
    }

    /// Rebuilds every feedback's caches, e.g. after a new keymap was
    /// installed.
    pub fn refresh(&mut self, keymap: &mut Keymap) {
        for info in &mut self.leds {
            if info.is_default() {
                info.phys_indicators = keymap.indicators.phys_indicators;
            }
            info.check_indicator_maps(keymap);
            info.check_indicator_names(keymap);
        }
    }

    /// Re-evaluates `which` indicators on the default feedback.
    ///
    /// Returns the indicators whose effective state flipped.
    pub fn update_indicators(
        &mut self,
        which: u32,
        keymap: &mut Keymap,
        state: &KeyboardState,
        changes: &mut Changes,
    ) -> u32 {
        let info = self.default_led(keymap);
        info.update_led_auto_state(which, keymap, state, changes)
    }

    /// Re-evaluates, on every feedback, the indicators affected by the given
    /// state and enabled-control changes.
    pub fn update_all_device_indicators(
        &mut self,
        state_changes: u16,
        enabled_ctrl_changes: u32,
        keymap: &mut Keymap,
        state: &KeyboardState,
        changes: &mut Changes,
    ) {
        self.default_led(keymap);
        for info in &mut self.leds {
            let which = info.indicators_to_update(state_changes, enabled_ctrl_changes);
            if which != 0 {
                info.update_led_auto_state(which, keymap, state, changes);
            }
        }
    }

    /// Recomputes `names_present` for `led` after names changed and records
    /// the change.
    pub fn apply_led_name_changes(
        &mut self,
        led: LedId,
        changed_names: u32,
        keymap: &mut Keymap,
        changes: &mut Changes,
    ) {
        if changed_names == 0 {
            return;
        }
        let info = self.find_or_create(led, ext_dev::INDICATOR_NAMES, keymap);
        info.check_indicator_names(keymap);
        if info.is_default() {
            changes.names.changed |= parts::INDICATOR_NAMES;
            changes.names.changed_indicators |= changed_names;
        }
        changes.note_ext_device(info.ext_device_change(keymap, ext_dev::INDICATOR_NAMES));
    }

    /// Sets the names of indicators in `which` on `led`.
    pub fn set_led_names(
        &mut self,
        led: LedId,
        which: u32,
        names: &[Atom; NUM_INDICATORS],
        keymap: &mut Keymap,
        changes: &mut Changes,
    ) {
        let info = self.find_or_create(led, ext_dev::INDICATOR_NAMES, keymap);
        let mut changed = 0;
        {
            let target: &mut [Atom; NUM_INDICATORS] = if info.is_default() {
                &mut keymap.names.get_or_insert_with(Default::default).indicators
            } else {
                info.names.get_or_insert_with(|| Box::new(NO_NAMES))
            };
            for (i, slot) in target.iter_mut().enumerate() {
                if which & (1 << i) != 0 && *slot != names[i] {
                    *slot = names[i];
                    changed |= 1 << i;
                }
            }
        }
        self.apply_led_name_changes(led, changed, keymap, changes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::controls::ctrls;
    use crate::keymap::tests::make_keymap;
    use crate::keymap::{mods, ModsDef};

    pub(crate) fn make_caps_map() -> IndicatorMap {
        IndicatorMap {
            which_mods: im_use::LOCKED,
            mods: ModsDef::real(mods::LOCK),
            ..IndicatorMap::EMPTY
        }
    }

    fn make_state(keymap: &Keymap, locked: u8) -> KeyboardState {
        let mut state = KeyboardState {
            locked_mods: locked,
            ..KeyboardState::new()
        };
        state.compute_derived_state(keymap);
        state
    }

    #[test]
    fn test_check_indicator_maps_builds_uses_caches() {
        // Arrange
        let mut keymap = make_keymap();
        keymap.indicators.maps[0] = make_caps_map();
        keymap.indicators.maps[3] = IndicatorMap {
            which_groups: im_use::EFFECTIVE,
            groups: 0b10,
            ..IndicatorMap::EMPTY
        };
        keymap.indicators.maps[5] = IndicatorMap {
            ctrls: ctrls::STICKY_KEYS,
            ..IndicatorMap::EMPTY
        };
        let mut registry = LedRegistry::new();

        // Act
        let info = registry.default_led(&mut keymap);

        // Assert
        assert_eq!(info.maps_present, 0b10_1001);
        assert_eq!(info.uses_locked, 0b1);
        assert_eq!(info.uses_effective, 0b1000);
        assert_eq!(info.uses_controls, 0b10_0000);
        assert_eq!(
            info.used_components,
            state_parts::MODIFIER_LOCK
                | state_parts::GROUP_LOCK
                | state_parts::MODIFIER_STATE
                | state_parts::GROUP_STATE
        );
    }

    #[test]
    fn test_check_indicator_maps_resolves_virtual_modifiers() {
        // Arrange
        let mut keymap = make_keymap();
        keymap.server.as_mut().expect("server").vmods[0] = mods::MOD2;
        keymap.indicators.maps[1] = IndicatorMap {
            which_mods: im_use::LOCKED,
            mods: ModsDef {
                mask: 0,
                real_mods: 0,
                vmods: 1,
            },
            ..IndicatorMap::EMPTY
        };
        let mut registry = LedRegistry::new();

        // Act
        registry.default_led(&mut keymap);

        // Assert
        assert_eq!(keymap.indicators.maps[1].mods.mask, mods::MOD2);
    }

    #[test]
    fn test_update_led_auto_state_lights_caps_lock() {
        // Arrange
        let mut keymap = make_keymap();
        keymap.indicators.maps[0] = make_caps_map();
        let mut registry = LedRegistry::new();
        let state = make_state(&keymap, mods::LOCK);
        let mut changes = Changes::default();

        // Act
        let flipped = registry.update_indicators(0b1, &mut keymap, &state, &mut changes);

        // Assert
        assert_eq!(flipped, 0b1);
        assert_eq!(changes.indicators.state_changes, 0b1);
        assert_eq!(changes.ext_devices.len(), 1);
        assert_eq!(changes.ext_devices[0].reason, ext_dev::INDICATOR_STATE);
        let info = registry.get(LedId::DEFAULT).expect("default led");
        assert_eq!(info.effective_state, info.auto_state | info.explicit_state);
    }

    #[test]
    fn test_update_leaves_indicators_outside_which_untouched() {
        // Arrange
        let mut keymap = make_keymap();
        keymap.indicators.maps[0] = make_caps_map();
        keymap.indicators.maps[1] = make_caps_map();
        let mut registry = LedRegistry::new();
        let state = make_state(&keymap, mods::LOCK);
        let mut changes = Changes::default();

        // Act
        registry.update_indicators(0b10, &mut keymap, &state, &mut changes);

        // Assert
        assert_eq!(registry.get(LedId::DEFAULT).expect("led").auto_state, 0b10);
    }

    #[test]
    fn test_unconditional_map_is_always_on() {
        let keymap = make_keymap();
        let map = IndicatorMap {
            which_mods: 0,
            mods: ModsDef::real(mods::SHIFT),
            ..IndicatorMap::EMPTY
        };
        assert!(compute_auto_state(&map, &KeyboardState::new(), &keymap));
    }

    #[test]
    fn test_no_automatic_map_is_never_on() {
        let keymap = make_keymap();
        let map = IndicatorMap {
            flags: im_flags::NO_AUTOMATIC,
            ..make_caps_map()
        };
        let state = make_state(&keymap, mods::LOCK);
        assert!(!compute_auto_state(&map, &state, &keymap));
    }

    #[test]
    fn test_group_condition_ignores_out_of_range_groups() {
        let keymap = make_keymap();
        let map = IndicatorMap {
            which_groups: im_use::BASE,
            groups: 0xff,
            ..IndicatorMap::EMPTY
        };
        let state = KeyboardState {
            base_group: -1,
            ..KeyboardState::new()
        };
        assert!(!compute_auto_state(&map, &state, &keymap));
    }

    #[test]
    fn test_controls_condition_follows_enabled_controls() {
        let mut keymap = make_keymap();
        let map = IndicatorMap {
            ctrls: ctrls::SLOW_KEYS,
            ..IndicatorMap::EMPTY
        };
        assert!(!compute_auto_state(&map, &KeyboardState::new(), &keymap));
        keymap.ctrls.enabled_ctrls |= ctrls::SLOW_KEYS;
        assert!(compute_auto_state(&map, &KeyboardState::new(), &keymap));
    }

    #[test]
    fn test_indicators_to_update_maps_state_bits_to_caches() {
        // Arrange
        let mut keymap = make_keymap();
        keymap.indicators.maps[0] = make_caps_map();
        keymap.indicators.maps[2] = IndicatorMap {
            ctrls: ctrls::MOUSE_KEYS,
            ..IndicatorMap::EMPTY
        };
        let mut registry = LedRegistry::new();
        let info = registry.default_led(&mut keymap);

        // Act / Assert
        assert_eq!(info.indicators_to_update(state_parts::MODIFIER_LOCK, 0), 0b1);
        assert_eq!(info.indicators_to_update(state_parts::MODIFIER_BASE, 0), 0);
        assert_eq!(info.indicators_to_update(0, ctrls::MOUSE_KEYS), 0b100);
    }

    #[test]
    fn test_private_feedback_owns_its_maps() {
        // Arrange
        let mut keymap = make_keymap();
        let mut registry = LedRegistry::new();
        let led = LedId {
            class: LED_FEEDBACK_CLASS,
            id: 2,
        };

        // Act
        let info = registry.find_or_create(led, ext_dev::INDICATOR_MAPS, &mut keymap);
        info.maps_mut(&mut keymap)[4] = make_caps_map();
        info.check_indicator_maps(&mut keymap);

        // Assert
        assert!(!info.is_default());
        assert_eq!(info.maps_present, 1 << 4);
        assert_eq!(keymap.indicators.maps[4], IndicatorMap::EMPTY);
        assert!(registry.remove(led).is_some());
        assert!(registry.get(led).is_none());
    }

    #[test]
    fn test_set_led_names_records_names_change() {
        // Arrange
        let mut keymap = make_keymap();
        let mut registry = LedRegistry::new();
        let mut names = [NONE_ATOM; NUM_INDICATORS];
        names[0] = 42;
        let mut changes = Changes::default();

        // Act
        registry.set_led_names(LedId::DEFAULT, 0b1, &names, &mut keymap, &mut changes);

        // Assert
        assert_eq!(changes.names.changed_indicators, 0b1);
        assert_eq!(registry.get(LedId::DEFAULT).expect("led").names_present, 0b1);
        assert_eq!(changes.ext_devices[0].reason, ext_dev::INDICATOR_NAMES);
    }
}
