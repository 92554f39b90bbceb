//! The keymap store: everything that describes how keys map to symbols,
//! actions, modifiers and indicators.
//!
//! # Layout (for beginners)
//!
//! A [`Keymap`] is split into independent components, each optional so a
//! keymap can be built up piece by piece:
//!
//! - **client map** ([`ClientMap`]) – key types plus the *symbol pool*: one
//!   big `Vec<Keysym>` holding every key's symbols back to back.  Each key
//!   owns an `(offset, width × groups)` window into it.
//! - **server map** ([`ServerMap`]) – the *action pool* (same trick), per-key
//!   explicit flags, behaviors, virtual modifier bindings.
//! - **controls** ([`Controls`]) – feature enable bits and AccessX timings.
//! - **indicators** – 32 indicator maps.
//! - **names** and **compat** – atoms and legacy interpretation rules.
//!
//! Keys never hold references into the pools, only indices.  When a pool has
//! to grow, the new pool is built aside, every index is rewritten, and the
//! new pool is swapped in, all inside the same `&mut self` call.  If the
//! allocation fails the old pool is still in place.

pub mod action;
pub mod compat;
pub mod controls;
pub mod default;
pub mod indicator_map;
pub mod keysyms;
pub mod names;
pub mod pool;
pub mod range;
pub mod types;

use thiserror::Error;

pub use action::{Action, Behavior};
pub use compat::{CompatMap, SymInterpret};
pub use controls::Controls;
pub use indicator_map::{IndicatorMap, Indicators};
pub use names::{AtomTable, KeyName, Names};
pub use pool::{ClientMap, ServerMap, SymMapEntry};
pub use types::{KeyType, KeyTypeEntry, ModsDef};

/// A physical key identifier.
pub type Keycode = u8;
/// A symbol produced by a key.
pub type Keysym = u32;
/// An interned string identifier.
pub type Atom = u32;

/// The empty symbol.
pub const NO_SYMBOL: Keysym = 0;
/// The empty atom.
pub const NONE_ATOM: Atom = 0;

/// Smallest keycode the protocol allows.
pub const MIN_LEGAL_KEYCODE: Keycode = 8;
/// Largest keycode the protocol allows.
pub const MAX_LEGAL_KEYCODE: Keycode = 255;
/// Maximum number of keyboard groups.
pub const NUM_KBD_GROUPS: usize = 4;
/// Number of virtual modifiers.
pub const NUM_VIRTUAL_MODS: usize = 16;
/// Number of indicators per feedback.
pub const NUM_INDICATORS: usize = 32;
/// Number of canonical key types every client map starts with.
pub const NUM_REQUIRED_TYPES: usize = 4;

/// Index of the canonical one-level type.
pub const ONE_LEVEL_INDEX: usize = 0;
/// Index of the canonical two-level type.
pub const TWO_LEVEL_INDEX: usize = 1;
/// Index of the canonical alphabetic type.
pub const ALPHABETIC_INDEX: usize = 2;
/// Index of the canonical keypad type.
pub const KEYPAD_INDEX: usize = 3;

/// Real (hardware) modifier bits.
pub mod mods {
    pub const SHIFT: u8 = 1 << 0;
    pub const LOCK: u8 = 1 << 1;
    pub const CONTROL: u8 = 1 << 2;
    pub const MOD1: u8 = 1 << 3;
    pub const MOD2: u8 = 1 << 4;
    pub const MOD3: u8 = 1 << 5;
    pub const MOD4: u8 = 1 << 6;
    pub const MOD5: u8 = 1 << 7;
    pub const ALL: u8 = 0xff;
}

/// Component bits for client/server map allocation and map change records.
pub mod map_parts {
    pub const KEY_TYPES: u16 = 1 << 0;
    pub const KEY_SYMS: u16 = 1 << 1;
    pub const MODIFIER_MAP: u16 = 1 << 2;
    pub const EXPLICIT_COMPONENTS: u16 = 1 << 3;
    pub const KEY_ACTIONS: u16 = 1 << 4;
    pub const KEY_BEHAVIORS: u16 = 1 << 5;
    pub const VIRTUAL_MODS: u16 = 1 << 6;
    pub const VIRTUAL_MOD_MAP: u16 = 1 << 7;

    pub const CLIENT_INFO: u16 = KEY_TYPES | KEY_SYMS | MODIFIER_MAP;
    pub const SERVER_INFO: u16 =
        EXPLICIT_COMPONENTS | KEY_ACTIONS | KEY_BEHAVIORS | VIRTUAL_MODS | VIRTUAL_MOD_MAP;
    pub const ALL: u16 = CLIENT_INFO | SERVER_INFO;
}

/// Per-key explicit component flags.
pub mod explicit {
    pub const KEY_TYPE_1: u8 = 1 << 0;
    pub const KEY_TYPE_2: u8 = 1 << 1;
    pub const KEY_TYPE_3: u8 = 1 << 2;
    pub const KEY_TYPE_4: u8 = 1 << 3;
    pub const INTERPRET: u8 = 1 << 4;
    pub const AUTO_REPEAT: u8 = 1 << 5;
    pub const BEHAVIOR: u8 = 1 << 6;
    pub const VMOD_MAP: u8 = 1 << 7;
}

/// Errors returned by keymap store operations.
#[derive(Debug, Error, PartialEq)]
pub enum KeymapError {
    /// A keycode, type index, level count or similar is out of range.
    #[error("invalid value: {0}")]
    InvalidValue(i64),

    /// The request is inconsistent with the current keymap.
    #[error("mismatch: {0}")]
    Mismatch(String),

    /// Growing a pool or array failed.  The keymap is unchanged.
    #[error("allocation failure: could not reserve {requested} entries")]
    AllocationFailure { requested: usize },
}

// ── Group info ────────────────────────────────────────────────────────────────

/// What to do with a group number outside `[0, num_groups)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRange {
    /// Wrap modulo the group count.
    Wrap,
    /// Pin to the last valid group (or the first, for negative groups).
    Clamp,
    /// Substitute this group, falling back to group 0 if it is invalid too.
    Redirect(u8),
}

/// Packed per-key (or global) group count plus out-of-range policy.
///
/// ```text
/// bit  7 6 | 5 4      | 3 2 1 0
///     action | redirect | num groups
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupInfo(pub u8);

impl GroupInfo {
    pub const WRAP: u8 = 0x00;
    pub const CLAMP: u8 = 0x40;
    pub const REDIRECT: u8 = 0x80;
    const ACTION_MASK: u8 = 0xc0;

    /// Builds a group info byte.
    pub fn new(num_groups: u8, policy: OutOfRange) -> Self {
        let action = match policy {
            OutOfRange::Wrap => Self::WRAP,
            OutOfRange::Clamp => Self::CLAMP,
            OutOfRange::Redirect(g) => Self::REDIRECT | ((g & 0x03) << 4),
        };
        Self(action | (num_groups & 0x0f))
    }

    /// Number of groups.
    pub fn num_groups(self) -> u8 {
        self.0 & 0x0f
    }

    /// Out-of-range policy.
    pub fn out_of_range(self) -> OutOfRange {
        match self.0 & Self::ACTION_MASK {
            Self::CLAMP => OutOfRange::Clamp,
            Self::REDIRECT => OutOfRange::Redirect((self.0 >> 4) & 0x03),
            _ => OutOfRange::Wrap,
        }
    }

    /// Returns a copy with the group count replaced.
    pub fn with_num_groups(self, num_groups: u8) -> Self {
        Self((self.0 & 0xf0) | (num_groups & 0x0f))
    }
}

// ── Keymap ────────────────────────────────────────────────────────────────────

/// The complete keymap descriptor of one keyboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Keymap {
    pub min_key_code: Keycode,
    pub max_key_code: Keycode,
    pub ctrls: Controls,
    pub map: Option<ClientMap>,
    pub server: Option<ServerMap>,
    pub indicators: Indicators,
    pub names: Option<Names>,
    pub compat: Option<CompatMap>,
}

impl Keymap {
    /// Creates an empty keymap for the keycode range `[min, max]`.
    ///
    /// # Errors
    ///
    /// [`KeymapError::InvalidValue`] if `min` is below the legal range or
    /// `min > max`.
    pub fn new(min_key_code: Keycode, max_key_code: Keycode) -> Result<Self, KeymapError> {
        if min_key_code < MIN_LEGAL_KEYCODE {
            return Err(KeymapError::InvalidValue(i64::from(min_key_code)));
        }
        if min_key_code > max_key_code {
            return Err(KeymapError::InvalidValue(i64::from(min_key_code)));
        }
        Ok(Self {
            min_key_code,
            max_key_code,
            ctrls: Controls::default(),
            map: None,
            server: None,
            indicators: Indicators::default(),
            names: None,
            compat: None,
        })
    }

    /// Returns `true` if `key` lies within this keymap's keycode range.
    pub fn key_in_range(&self, key: Keycode) -> bool {
        key >= self.min_key_code && key <= self.max_key_code
    }

    /// Number of keys in the keycode range.
    pub fn num_keys(&self) -> usize {
        usize::from(self.max_key_code) - usize::from(self.min_key_code) + 1
    }

    pub(crate) fn check_key(&self, key: Keycode) -> Result<(), KeymapError> {
        if self.key_in_range(key) {
            Ok(())
        } else {
            Err(KeymapError::InvalidValue(i64::from(key)))
        }
    }

    pub(crate) fn legal_bounds(&self) -> bool {
        self.min_key_code >= MIN_LEGAL_KEYCODE && self.min_key_code <= self.max_key_code
    }

    // ── Per-key accessors ─────────────────────────────────────────────────────

    fn sym_entry(&self, key: Keycode) -> Option<&SymMapEntry> {
        self.map.as_ref()?.key_sym_map.get(usize::from(key))
    }

    /// Group info byte of `key` (zero when the key has no symbols).
    pub fn key_group_info(&self, key: Keycode) -> GroupInfo {
        self.sym_entry(key).map(|e| e.group_info).unwrap_or_default()
    }

    /// Number of groups bound to `key`.
    pub fn key_num_groups(&self, key: Keycode) -> u8 {
        self.key_group_info(key).num_groups()
    }

    /// Levels per group of `key`.
    pub fn key_width(&self, key: Keycode) -> u8 {
        self.sym_entry(key).map(|e| e.width).unwrap_or(0)
    }

    /// Total symbols held by `key` (`width × groups`).
    pub fn key_num_syms(&self, key: Keycode) -> usize {
        self.sym_entry(key).map(SymMapEntry::num_syms).unwrap_or(0)
    }

    /// The symbols of `key`, group-major.
    pub fn key_syms(&self, key: Keycode) -> &[Keysym] {
        match (&self.map, self.sym_entry(key)) {
            (Some(map), Some(entry)) => map
                .syms
                .get(entry.offset..entry.offset + entry.num_syms())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// The symbol at (`group`, `level`) of `key`, or [`NO_SYMBOL`].
    pub fn key_sym_at(&self, key: Keycode, group: u8, level: u8) -> Keysym {
        let width = usize::from(self.key_width(key));
        if level as usize >= width || group >= self.key_num_groups(key) {
            return NO_SYMBOL;
        }
        self.key_syms(key)
            .get(usize::from(group) * width + usize::from(level))
            .copied()
            .unwrap_or(NO_SYMBOL)
    }

    /// Index of the key type `key` uses in `group`.
    pub fn key_type_index(&self, key: Keycode, group: u8) -> usize {
        self.sym_entry(key)
            .and_then(|e| e.kt_index.get(usize::from(group)))
            .map(|&i| usize::from(i))
            .unwrap_or(ONE_LEVEL_INDEX)
    }

    /// The key type `key` uses in `group`.
    pub fn key_type(&self, key: Keycode, group: u8) -> Option<&KeyType> {
        self.map.as_ref()?.types.get(self.key_type_index(key, group))
    }

    /// Returns `true` if `key` has an action list.
    pub fn key_has_actions(&self, key: Keycode) -> bool {
        self.server
            .as_ref()
            .and_then(|s| s.key_acts.get(usize::from(key)))
            .is_some_and(|&index| index != 0)
    }

    /// Number of actions bound to `key`: one per symbol, or the single
    /// shared "no action" slot.
    pub fn key_num_actions(&self, key: Keycode) -> usize {
        if self.key_has_actions(key) {
            self.key_num_syms(key)
        } else {
            1
        }
    }

    /// The action list of `key`.  Keys without actions share slot 0.
    pub fn key_actions(&self, key: Keycode) -> &[Action] {
        let Some(server) = &self.server else {
            return &[];
        };
        let start = server.key_acts.get(usize::from(key)).copied().unwrap_or(0);
        let len = self.key_num_actions(key);
        server.acts.get(start..start + len).unwrap_or(&[])
    }

    /// The action at (`group`, `level`) of `key`.
    pub fn key_action_at(&self, key: Keycode, group: u8, level: u8) -> Action {
        if !self.key_has_actions(key) {
            return Action::NoAction;
        }
        let width = usize::from(self.key_width(key));
        self.key_actions(key)
            .get(usize::from(group) * width + usize::from(level))
            .copied()
            .unwrap_or_default()
    }

    /// Resolves the global effective `group` against `key`'s own group
    /// count and out-of-range policy.
    ///
    /// Returns `None` when the key is out of range or has no groups.
    pub fn effective_group_for_key(&self, group: u8, key: Keycode) -> Option<u8> {
        if !self.key_in_range(key) {
            return None;
        }
        let info = self.key_group_info(key);
        let n = info.num_groups();
        if n == 0 {
            return None;
        }
        if group < n {
            return Some(group);
        }
        Some(match info.out_of_range() {
            OutOfRange::Wrap => group % n,
            OutOfRange::Clamp => n - 1,
            OutOfRange::Redirect(g) if g < n => g,
            OutOfRange::Redirect(_) => 0,
        })
    }

    /// Shift level selected by `mods` for `key` in `group`.
    pub fn key_level(&self, key: Keycode, group: u8, mods: u8) -> u8 {
        let Some(key_type) = self.key_type(key, group) else {
            return 0;
        };
        let masked = mods & key_type.mods.mask;
        key_type
            .map
            .iter()
            .find(|entry| entry.active && entry.mods.mask == masked)
            .map(|entry| entry.level)
            .unwrap_or(0)
    }

    /// Symbol produced by `key` under the given effective group and
    /// modifiers.
    pub fn lookup_keysym(&self, key: Keycode, group: u8, mods: u8) -> Keysym {
        match self.effective_group_for_key(group, key) {
            Some(g) => self.key_sym_at(key, g, self.key_level(key, g, mods)),
            None => NO_SYMBOL,
        }
    }

    // ── Virtual modifiers ─────────────────────────────────────────────────────

    /// Resolves a virtual modifier mask to the real modifiers it is bound to.
    pub fn mask_for_vmask(&self, vmask: u16) -> u8 {
        let Some(server) = &self.server else {
            return 0;
        };
        server
            .vmods
            .iter()
            .enumerate()
            .filter(|(i, _)| vmask & (1 << i) != 0)
            .fold(0, |acc, (_, &real)| acc | real)
    }

    /// Recomputes `mask` of a modifier definition from its real and virtual
    /// parts.
    pub fn resolve_mods(&self, def: &mut ModsDef) {
        def.mask = def.real_mods | self.mask_for_vmask(def.vmods);
    }

    // ── Copy and teardown ─────────────────────────────────────────────────────

    /// Replaces `self` with a deep copy of `src`.
    ///
    /// Used when swapping a freshly compiled keymap onto a live device.
    /// Existing allocations in `self` are reused where possible.
    pub fn copy_keymap(&mut self, src: &Keymap) {
        self.clone_from(src);
    }

    /// Copies only the controls from `src`, then recomputes the group count
    /// from the widest key of `self`.
    pub fn copy_controls(&mut self, src: &Keymap) {
        self.ctrls = src.ctrls.clone();
        let mut num_groups = 0;
        for key in self.min_key_code..=self.max_key_code {
            num_groups = num_groups.max(self.key_num_groups(key));
            if usize::from(num_groups) >= NUM_KBD_GROUPS {
                num_groups = NUM_KBD_GROUPS as u8;
                break;
            }
        }
        self.ctrls.num_groups = num_groups;
    }

    /// Drops client map components named by `which` ([`map_parts`] bits),
    /// or the whole client map when `free_all` is set.
    pub fn free_client_map(&mut self, which: u16, free_all: bool) {
        if free_all {
            self.map = None;
            return;
        }
        let Some(map) = self.map.as_mut() else {
            return;
        };
        if which & map_parts::KEY_TYPES != 0 {
            map.types.clear();
        }
        if which & map_parts::KEY_SYMS != 0 {
            map.syms.clear();
            map.num_syms = 0;
            map.key_sym_map.clear();
        }
        if which & map_parts::MODIFIER_MAP != 0 {
            map.modmap.clear();
        }
    }

    /// Drops server map components named by `which`, or the whole server
    /// map when `free_all` is set.
    pub fn free_server_map(&mut self, which: u16, free_all: bool) {
        if free_all {
            self.server = None;
            return;
        }
        let Some(server) = self.server.as_mut() else {
            return;
        };
        if which & map_parts::EXPLICIT_COMPONENTS != 0 {
            server.explicit.clear();
        }
        if which & map_parts::KEY_ACTIONS != 0 {
            server.acts.clear();
            server.num_acts = 0;
            server.key_acts.clear();
        }
        if which & map_parts::KEY_BEHAVIORS != 0 {
            server.behaviors.clear();
        }
        if which & map_parts::VIRTUAL_MODS != 0 {
            server.vmods = [0; NUM_VIRTUAL_MODS];
        }
        if which & map_parts::VIRTUAL_MOD_MAP != 0 {
            server.vmodmap.clear();
        }
    }

    pub fn free_names(&mut self) {
        self.names = None;
    }

    pub fn free_compat_map(&mut self) {
        self.compat = None;
    }

    /// Resets all indicator maps to their empty state.
    pub fn free_indicator_maps(&mut self) {
        self.indicators = Indicators::default();
    }

    /// Drops every component, keeping only the keycode range and default
    /// controls.
    pub fn free_keymap(&mut self) {
        self.free_client_map(map_parts::ALL, true);
        self.free_server_map(map_parts::ALL, true);
        self.free_names();
        self.free_compat_map();
        self.free_indicator_maps();
        self.ctrls = Controls::default();
    }

    // ── Consistency ───────────────────────────────────────────────────────────

    /// Checks that the keycode bounds are legal and every key's symbol and
    /// action windows lie inside the used part of their pool.
    ///
    /// # Errors
    ///
    /// [`KeymapError::InvalidValue`] for illegal bounds,
    /// [`KeymapError::Mismatch`] describing the first inconsistent key.
    pub fn validate(&self) -> Result<(), KeymapError> {
        if !self.legal_bounds() {
            return Err(KeymapError::InvalidValue(i64::from(self.min_key_code)));
        }
        if let Some(map) = &self.map {
            if map.num_syms > map.syms.len() {
                return Err(KeymapError::Mismatch(format!(
                    "symbol pool uses {} of {} slots",
                    map.num_syms,
                    map.syms.len()
                )));
            }
            if !map.key_sym_map.is_empty() {
                for key in self.min_key_code..=self.max_key_code {
                    let entry = map
                        .key_sym_map
                        .get(usize::from(key))
                        .ok_or_else(|| KeymapError::Mismatch(format!("key {key} has no entry")))?;
                    let n = entry.num_syms();
                    if n > 0 && entry.offset + n > map.num_syms {
                        return Err(KeymapError::Mismatch(format!(
                            "key {key} symbols {}..{} exceed pool use {}",
                            entry.offset,
                            entry.offset + n,
                            map.num_syms
                        )));
                    }
                    if entry.kt_index[..usize::from(entry.group_info.num_groups())]
                        .iter()
                        .any(|&t| usize::from(t) >= map.types.len())
                    {
                        return Err(KeymapError::Mismatch(format!(
                            "key {key} refers to a missing key type"
                        )));
                    }
                }
            }
        }
        if let Some(server) = &self.server {
            if server.num_acts > server.acts.len() {
                return Err(KeymapError::Mismatch(format!(
                    "action pool uses {} of {} slots",
                    server.num_acts,
                    server.acts.len()
                )));
            }
            for key in self.min_key_code..=self.max_key_code {
                if !self.key_has_actions(key) {
                    continue;
                }
                let start = server.key_acts[usize::from(key)];
                if start + self.key_num_actions(key) > server.num_acts {
                    return Err(KeymapError::Mismatch(format!(
                        "key {key} actions exceed pool use {}",
                        server.num_acts
                    )));
                }
            }
        }
        Ok(())
    }
}
