//! Key actions and key behaviors.
//!
//! An action is what a key *does* to the keyboard state when pressed:
//! set, latch or lock modifiers or a group, toggle controls, and so on.
//! Every key with actions holds one action per symbol slot, stored in the
//! server map's action pool.

/// Flags shared by modifier and group actions.
pub mod action_flags {
    /// Clear locks when the key is released (set/latch actions).
    pub const CLEAR_LOCKS: u8 = 1 << 0;
    /// Turn a latch into a lock when pressed twice.
    pub const LATCH_TO_LOCK: u8 = 1 << 1;
    /// Use the key's modifier map instead of the action's own mask.
    pub const USE_MOD_MAP_MODS: u8 = 1 << 2;
    /// Group value is absolute rather than relative.
    pub const GROUP_ABSOLUTE: u8 = 1 << 2;
    /// Lock actions: do not lock.
    pub const LOCK_NO_LOCK: u8 = 1 << 0;
    /// Lock actions: do not unlock.
    pub const LOCK_NO_UNLOCK: u8 = 1 << 1;
}

/// A modifier action payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModAction {
    pub flags: u8,
    /// Resolved real modifiers.
    pub mask: u8,
    pub real_mods: u8,
    pub vmods: u16,
}

impl ModAction {
    /// A modifier action on real modifiers only.
    pub const fn real(flags: u8, mods: u8) -> Self {
        Self {
            flags,
            mask: mods,
            real_mods: mods,
            vmods: 0,
        }
    }
}

/// A group action payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupAction {
    pub flags: u8,
    /// Relative delta, or absolute group with [`action_flags::GROUP_ABSOLUTE`].
    pub group: i8,
}

impl GroupAction {
    pub const fn absolute(group: i8) -> Self {
        Self {
            flags: action_flags::GROUP_ABSOLUTE,
            group,
        }
    }

    pub const fn relative(delta: i8) -> Self {
        Self { flags: 0, group: delta }
    }
}

/// What a key does when pressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    NoAction,
    SetMods(ModAction),
    LatchMods(ModAction),
    LockMods(ModAction),
    SetGroup(GroupAction),
    LatchGroup(GroupAction),
    LockGroup(GroupAction),
    /// Enable the named controls while held.
    SetControls(u32),
    /// Toggle the named controls.
    LockControls(u32),
    /// Terminate the server.
    Terminate,
    /// Send an action message to interested clients.
    Message { flags: u8, data: [u8; 6] },
    /// Deliver a different keycode instead.
    RedirectKey { new_key: u8, mask: u8, mods: u8 },
}

impl Action {
    /// Returns `true` for actions that touch the modifier state.
    pub fn is_modifier_action(&self) -> bool {
        matches!(
            self,
            Action::SetMods(_) | Action::LatchMods(_) | Action::LockMods(_)
        )
    }

    /// Returns `true` for actions that touch the group state.
    pub fn is_group_action(&self) -> bool {
        matches!(
            self,
            Action::SetGroup(_) | Action::LatchGroup(_) | Action::LockGroup(_)
        )
    }
}

/// Special per-key policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Behavior {
    pub kind: u8,
    pub data: u8,
}

impl Behavior {
    pub const DEFAULT: u8 = 0x00;
    pub const LOCK: u8 = 0x01;
    pub const RADIO_GROUP: u8 = 0x02;
    pub const OVERLAY1: u8 = 0x03;
    pub const OVERLAY2: u8 = 0x04;
    /// Set on behaviors the server installed on its own.
    pub const PERMANENT: u8 = 0x80;

    /// Radio-group membership for group `index`.
    pub fn radio_group(index: u8) -> Self {
        Self {
            kind: Self::RADIO_GROUP,
            data: index,
        }
    }

    /// Kind without the permanent bit.
    pub fn base_kind(self) -> u8 {
        self.kind & !Self::PERMANENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::mods;

    #[test]
    fn test_default_action_is_no_action() {
        assert_eq!(Action::default(), Action::NoAction);
    }

    #[test]
    fn test_action_classification() {
        let latch = Action::LatchMods(ModAction::real(action_flags::LATCH_TO_LOCK, mods::SHIFT));
        let lock = Action::LockGroup(GroupAction::relative(1));
        assert!(latch.is_modifier_action());
        assert!(!latch.is_group_action());
        assert!(lock.is_group_action());
        assert!(!Action::Terminate.is_modifier_action());
    }

    #[test]
    fn test_behavior_base_kind_strips_permanent_bit() {
        let behavior = Behavior {
            kind: Behavior::RADIO_GROUP | Behavior::PERMANENT,
            data: 1,
        };
        assert_eq!(behavior.base_kind(), Behavior::RADIO_GROUP);
    }
}
