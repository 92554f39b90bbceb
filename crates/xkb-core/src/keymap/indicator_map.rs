//! Indicator maps: what each indicator (LED) watches.

use super::{ModsDef, NUM_INDICATORS};

/// Indicator map flags.
pub mod im_flags {
    /// The indicator drives the keyboard state when changed explicitly.
    pub const LED_DRIVES_KB: u8 = 1 << 5;
    /// The indicator never lights automatically.
    pub const NO_AUTOMATIC: u8 = 1 << 6;
    /// Clients cannot change the indicator explicitly.
    pub const NO_EXPLICIT: u8 = 1 << 7;
}

/// Which state components an indicator map's modifier or group condition
/// reads.
pub mod im_use {
    pub const BASE: u8 = 1 << 0;
    pub const LATCHED: u8 = 1 << 1;
    pub const LOCKED: u8 = 1 << 2;
    pub const EFFECTIVE: u8 = 1 << 3;
    /// Modifier conditions only.
    pub const COMPAT: u8 = 1 << 4;

    pub const ANY_GROUP: u8 = BASE | LATCHED | LOCKED | EFFECTIVE;
    pub const ANY_MODS: u8 = ANY_GROUP | COMPAT;
}

/// One indicator's trigger condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorMap {
    pub flags: u8,
    /// [`im_use`] bits for the group condition.
    pub which_groups: u8,
    /// Group bitmask (bit *n* = group *n*).
    pub groups: u8,
    /// [`im_use`] bits for the modifier condition.
    pub which_mods: u8,
    pub mods: ModsDef,
    /// Control bits that light the indicator when enabled.
    pub ctrls: u32,
}

impl IndicatorMap {
    pub const EMPTY: IndicatorMap = IndicatorMap {
        flags: 0,
        which_groups: 0,
        groups: 0,
        which_mods: 0,
        mods: ModsDef {
            mask: 0,
            real_mods: 0,
            vmods: 0,
        },
        ctrls: 0,
    };

    /// Returns `true` if the map has any condition or component.
    ///
    /// Flags alone do not make a map "present".
    pub fn is_in_use(&self) -> bool {
        self.which_groups != 0
            || self.groups != 0
            || self.which_mods != 0
            || self.mods.real_mods != 0
            || self.mods.vmods != 0
            || self.ctrls != 0
    }

    /// Returns `true` if the map has no modifier, group or control
    /// condition.
    pub fn is_unconditional(&self) -> bool {
        self.which_mods == 0 && self.which_groups == 0 && self.ctrls == 0
    }

    pub fn drives_keyboard(&self) -> bool {
        self.flags & im_flags::LED_DRIVES_KB != 0
    }
}

/// The keymap's indicator component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicators {
    /// Indicators backed by a physical LED.
    pub phys_indicators: u32,
    pub maps: [IndicatorMap; NUM_INDICATORS],
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            phys_indicators: 0,
            maps: [IndicatorMap::EMPTY; NUM_INDICATORS],
        }
    }
}
