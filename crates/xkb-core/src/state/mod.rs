//! Keyboard state: base, latched and locked components plus every view
//! derived from them.
//!
//! # State views (for beginners)
//!
//! Three private components are changed directly by key actions:
//!
//! - **base** – modifiers/group held down right now (Shift while pressed),
//! - **latched** – active until the next key press (sticky Shift),
//! - **locked** – active until toggled off (Caps Lock).
//!
//! Everything else is *derived* and recomputed by
//! [`KeyboardState::compute_derived_state`]:
//!
//! ```text
//! mods         = base | latched | locked
//! lookup_mods  = mods & !internal
//! grab_mods    = (lookup_mods & !ignore_lock) | ((base | latched) & ignore_lock)
//! group        = resolve(base_group + latched_group + locked_group)
//! compat_*     = the view above | compat map mask of the effective group
//! ```
//!
//! The compat views exist for legacy clients, which only understand eight
//! modifier bits and have no notion of groups.

use crate::changes::Changes;
use crate::keymap::controls::ctrls;
use crate::keymap::{Controls, Keymap, OutOfRange, NUM_KBD_GROUPS};

/// State component bits, used in state change masks.
pub mod state_parts {
    pub const MODIFIER_STATE: u16 = 1 << 0;
    pub const MODIFIER_BASE: u16 = 1 << 1;
    pub const MODIFIER_LATCH: u16 = 1 << 2;
    pub const MODIFIER_LOCK: u16 = 1 << 3;
    pub const GROUP_STATE: u16 = 1 << 4;
    pub const GROUP_BASE: u16 = 1 << 5;
    pub const GROUP_LATCH: u16 = 1 << 6;
    pub const GROUP_LOCK: u16 = 1 << 7;
    pub const COMPAT_STATE: u16 = 1 << 8;
    pub const GRAB_MODS: u16 = 1 << 9;
    pub const COMPAT_GRAB_MODS: u16 = 1 << 10;
    pub const LOOKUP_MODS: u16 = 1 << 11;
    pub const COMPAT_LOOKUP_MODS: u16 = 1 << 12;
    pub const POINTER_BUTTONS: u16 = 1 << 13;
    pub const ALL: u16 = 0x3fff;
}

/// Core-protocol pointer button bits in a 16-bit state field.
pub const BUTTON_MASK: u16 = 0x1f00;

/// Resolves a possibly out-of-range group number into `[0, num_groups)`
/// using the global out-of-range policy in `ctrls`.
///
/// A keyboard with no groups is treated as having one.
pub fn resolve_group(group: i32, ctrls: &Controls) -> u8 {
    let n = i32::from(ctrls.num_groups.clamp(1, NUM_KBD_GROUPS as u8));
    if (0..n).contains(&group) {
        return group as u8;
    }
    let resolved = match ctrls.groups_wrap.out_of_range() {
        OutOfRange::Clamp => {
            if group < 0 {
                0
            } else {
                n - 1
            }
        }
        OutOfRange::Redirect(g) => {
            if i32::from(g) < n {
                i32::from(g)
            } else {
                0
            }
        }
        OutOfRange::Wrap => group.rem_euclid(n),
    };
    resolved as u8
}

/// Builds the legacy 16-bit state field: modifiers in the low byte, group in
/// bits 13-14.
pub fn build_core_state(mods: u8, group: u8) -> u16 {
    u16::from(mods) | (u16::from(group & 0x03) << 13)
}

/// The live keyboard state of one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardState {
    /// Effective group.
    pub group: u8,
    pub locked_group: u8,
    pub base_group: i16,
    pub latched_group: i16,
    /// Effective modifiers.
    pub mods: u8,
    pub base_mods: u8,
    pub latched_mods: u8,
    pub locked_mods: u8,
    pub compat_state: u8,
    pub grab_mods: u8,
    pub compat_grab_mods: u8,
    pub lookup_mods: u8,
    pub compat_lookup_mods: u8,
    /// Core pointer button bits.
    pub ptr_buttons: u16,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes every derived view from the base, latched and locked
    /// components.
    ///
    /// The stored locked group is re-resolved as well, so a group count
    /// reduction never leaves it out of range.  Calling this twice in a row
    /// yields the same state.
    pub fn compute_derived_state(&mut self, keymap: &Keymap) {
        let controls = &keymap.ctrls;
        self.mods = self.base_mods | self.latched_mods | self.locked_mods;
        self.lookup_mods = self.mods & !controls.internal.mask;
        self.grab_mods = self.lookup_mods & !controls.ignore_lock.mask;
        self.grab_mods |= (self.base_mods | self.latched_mods) & controls.ignore_lock.mask;

        self.locked_group = resolve_group(i32::from(self.locked_group), controls);
        let sum = i32::from(self.locked_group)
            + i32::from(self.base_group)
            + i32::from(self.latched_group);
        self.group = resolve_group(sum, controls);

        self.compute_compat_state(keymap);
    }

    /// Recomputes the legacy-facing compat views.
    pub fn compute_compat_state(&mut self, keymap: &Keymap) {
        let Some(compat) = &keymap.compat else {
            self.compat_state = self.mods;
            self.compat_lookup_mods = self.lookup_mods;
            self.compat_grab_mods = self.grab_mods;
            return;
        };
        let group_mask = |group: u8| {
            compat.groups[usize::from(group).min(NUM_KBD_GROUPS - 1)].mask
        };
        let mask = group_mask(self.group);
        self.compat_state = self.mods | mask;
        self.compat_lookup_mods = self.lookup_mods | mask;
        let grab_mask = if keymap.ctrls.enabled_ctrls & ctrls::IGNORE_GROUP_LOCK != 0 {
            let unlocked = i32::from(self.base_group) + i32::from(self.latched_group);
            group_mask(resolve_group(unlocked, &keymap.ctrls))
        } else {
            mask
        };
        self.compat_grab_mods = self.grab_mods | grab_mask;
    }

    /// Which state components differ between `self` (old) and `new`, as
    /// [`state_parts`] bits.
    pub fn changed_flags(&self, new: &KeyboardState) -> u16 {
        state_changed_flags(self, new)
    }

    // ── Latches and locks ─────────────────────────────────────────────────────

    /// Replaces the latched modifiers selected by `mask` with `latches`.
    pub fn latch_modifiers(&mut self, mask: u8, latches: u8) {
        self.latched_mods = (self.latched_mods & !mask) | (latches & mask);
    }

    /// Replaces the locked modifiers selected by `mask` with `values`.
    pub fn lock_modifiers(&mut self, mask: u8, values: u8) {
        self.locked_mods = (self.locked_mods & !mask) | (values & mask);
    }

    pub fn latch_group(&mut self, group: i16) {
        self.latched_group = group;
    }

    /// Locks `group`, resolving it first so the stored value is always valid.
    pub fn lock_group(&mut self, group: i32, controls: &Controls) {
        self.locked_group = resolve_group(group, controls);
    }

    /// Clears every latch and lock, re-derives, and records the changes.
    ///
    /// Returns the [`state_parts`] bits that changed.
    pub fn clear_all_latches_and_locks(&mut self, keymap: &Keymap, changes: &mut Changes) -> u16 {
        let old = *self;
        self.latched_mods = 0;
        self.locked_mods = 0;
        self.latched_group = 0;
        self.locked_group = 0;
        self.compute_derived_state(keymap);
        let changed = state_changed_flags(&old, self);
        changes.state_changes |= changed;
        changed
    }

    /// Re-derives after components were changed directly and accumulates
    /// the resulting change bits relative to `old`.
    pub fn check_secondary_effects(
        &mut self,
        old: &KeyboardState,
        keymap: &Keymap,
        changes: &mut Changes,
    ) -> u16 {
        self.compute_derived_state(keymap);
        let changed = state_changed_flags(old, self);
        changes.state_changes |= changed;
        changed
    }

    // ── Legacy views ──────────────────────────────────────────────────────────

    /// Legacy state field for this state (lookup modifiers and group).
    pub fn state_field(&self) -> u16 {
        build_core_state(self.lookup_mods, self.group)
    }

    /// Legacy state field used for grabs.
    pub fn grab_state_field(&self) -> u16 {
        build_core_state(self.grab_mods, self.group)
    }

    /// Translates the state field of an input event for a client that never
    /// opted into the extension.
    ///
    /// An event carrying the live lookup state gets the compat lookup view;
    /// any other event (e.g. one re-delivered for a grab) gets the compat
    /// grab view.  Pointer button bits pass through.
    pub fn compat_event_state(&self, event_state: u16) -> u16 {
        let buttons = event_state & BUTTON_MASK;
        let mods = if event_state & !BUTTON_MASK == self.state_field() {
            self.compat_lookup_mods
        } else {
            self.compat_grab_mods
        };
        u16::from(mods) | buttons
    }
}

/// Which state components differ between `old` and `new`, as
/// [`state_parts`] bits.
pub fn state_changed_flags(old: &KeyboardState, new: &KeyboardState) -> u16 {
    use state_parts::*;
    let mut changed = 0;
    let mut flag = |differs: bool, bit: u16| {
        if differs {
            changed |= bit;
        }
    };
    flag(old.group != new.group, GROUP_STATE);
    flag(old.base_group != new.base_group, GROUP_BASE);
    flag(old.latched_group != new.latched_group, GROUP_LATCH);
    flag(old.locked_group != new.locked_group, GROUP_LOCK);
    flag(old.mods != new.mods, MODIFIER_STATE);
    flag(old.base_mods != new.base_mods, MODIFIER_BASE);
    flag(old.latched_mods != new.latched_mods, MODIFIER_LATCH);
    flag(old.locked_mods != new.locked_mods, MODIFIER_LOCK);
    flag(old.compat_state != new.compat_state, COMPAT_STATE);
    flag(old.grab_mods != new.grab_mods, GRAB_MODS);
    flag(old.compat_grab_mods != new.compat_grab_mods, COMPAT_GRAB_MODS);
    flag(old.lookup_mods != new.lookup_mods, LOOKUP_MODS);
    flag(old.compat_lookup_mods != new.compat_lookup_mods, COMPAT_LOOKUP_MODS);
    flag(old.ptr_buttons != new.ptr_buttons, POINTER_BUTTONS);
    changed
}
