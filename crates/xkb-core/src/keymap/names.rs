//! Symbolic names: atoms for keys, types, levels, modifiers, indicators and
//! groups.

use std::collections::HashMap;

use super::pool::try_alloc;
use super::{
    Atom, Keycode, Keymap, KeymapError, NONE_ATOM, NUM_INDICATORS, NUM_KBD_GROUPS,
    NUM_VIRTUAL_MODS,
};
use crate::changes::Changes;

/// Name component bits, used for allocation and names change records.
pub mod parts {
    pub const KEYCODES: u16 = 1 << 0;
    pub const GEOMETRY: u16 = 1 << 1;
    pub const SYMBOLS: u16 = 1 << 2;
    pub const PHYS_SYMBOLS: u16 = 1 << 3;
    pub const TYPES: u16 = 1 << 4;
    pub const COMPAT: u16 = 1 << 5;
    pub const KEY_TYPE_NAMES: u16 = 1 << 6;
    pub const KT_LEVEL_NAMES: u16 = 1 << 7;
    pub const INDICATOR_NAMES: u16 = 1 << 8;
    pub const KEY_NAMES: u16 = 1 << 9;
    pub const KEY_ALIASES: u16 = 1 << 10;
    pub const VIRTUAL_MOD_NAMES: u16 = 1 << 11;
    pub const GROUP_NAMES: u16 = 1 << 12;
    pub const RG_NAMES: u16 = 1 << 13;
    pub const ALL: u16 = 0x3fff;
}

/// Four-character key name such as `AE01` or `LFSH`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyName(pub [u8; 4]);

impl KeyName {
    /// Builds a key name from up to four ASCII bytes, padding with NUL.
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; 4];
        for (slot, b) in bytes.iter_mut().zip(name.bytes()) {
            *slot = b;
        }
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl std::fmt::Display for KeyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(4);
        write!(f, "<{}>", String::from_utf8_lossy(&self.0[..end]))
    }
}

/// An alternative name for a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyAlias {
    pub real: KeyName,
    pub alias: KeyName,
}

/// The names component of a keymap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Names {
    pub keycodes: Atom,
    pub geometry: Atom,
    pub symbols: Atom,
    pub types: Atom,
    pub compat: Atom,
    pub phys_symbols: Atom,
    pub vmods: [Atom; NUM_VIRTUAL_MODS],
    pub indicators: [Atom; NUM_INDICATORS],
    pub groups: [Atom; NUM_KBD_GROUPS],
    /// Indexed by keycode.
    pub keys: Vec<KeyName>,
    pub key_aliases: Vec<KeyAlias>,
    pub radio_groups: Vec<Atom>,
}

impl Names {
    /// Indicators that have a name.
    pub fn indicators_present(&self) -> u32 {
        self.indicators
            .iter()
            .enumerate()
            .filter(|(_, &atom)| atom != NONE_ATOM)
            .fold(0, |acc, (i, _)| acc | (1 << i))
    }

    /// Index of the indicator called `atom`.
    pub fn indicator_index(&self, atom: Atom) -> Option<usize> {
        if atom == NONE_ATOM {
            return None;
        }
        self.indicators.iter().position(|&a| a == atom)
    }

    /// Keycode whose name is `name`, following aliases.
    pub fn find_key(&self, name: KeyName) -> Option<Keycode> {
        let real = self
            .key_aliases
            .iter()
            .find(|a| a.alias == name)
            .map_or(name, |a| a.real);
        self.keys
            .iter()
            .position(|&k| k == real)
            .and_then(|i| Keycode::try_from(i).ok())
    }
}

/// String interning table.  Atom 0 is reserved for "none".
#[derive(Debug, Clone, Default)]
pub struct AtomTable {
    by_name: HashMap<String, Atom>,
    names: Vec<String>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the atom for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.by_name.get(name) {
            return atom;
        }
        self.names.push(name.to_string());
        let atom = self.names.len() as Atom;
        self.by_name.insert(name.to_string(), atom);
        atom
    }

    /// Returns the atom for `name` without creating it.
    pub fn lookup(&self, name: &str) -> Option<Atom> {
        self.by_name.get(name).copied()
    }

    /// Returns the string an atom stands for.
    pub fn name_of(&self, atom: Atom) -> Option<&str> {
        let index = usize::try_from(atom).ok()?.checked_sub(1)?;
        self.names.get(index).map(String::as_str)
    }
}

impl Keymap {
    /// Allocates the names component, sizing the key name array when
    /// [`parts::KEY_NAMES`] is requested.
    ///
    /// # Errors
    ///
    /// [`KeymapError::AllocationFailure`] if the key names cannot be
    /// allocated.
    pub fn allocate_names(&mut self, which: u16) -> Result<(), KeymapError> {
        let per_key = usize::from(self.max_key_code) + 1;
        let names = self.names.get_or_insert_with(Names::default);
        if which & parts::KEY_NAMES != 0 && names.keys.is_empty() {
            names.keys = try_alloc(per_key)?;
        }
        Ok(())
    }

    /// Names `key` and records the change.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::InvalidValue`] if `key` is out of range.
    /// - [`KeymapError::Mismatch`] if no key names are allocated.
    pub fn set_key_name(
        &mut self,
        key: Keycode,
        name: KeyName,
        changes: &mut Changes,
    ) -> Result<(), KeymapError> {
        self.check_key(key)?;
        let names = self
            .names
            .as_mut()
            .filter(|n| !n.keys.is_empty())
            .ok_or_else(|| KeymapError::Mismatch("no key names".to_string()))?;
        names.keys[usize::from(key)] = name;
        changes.names.changed |= parts::KEY_NAMES;
        changes.names.keys.include(key);
        Ok(())
    }

    /// Names indicator `index` and records the change.
    ///
    /// # Errors
    ///
    /// [`KeymapError::InvalidValue`] for an index outside `[0, 32)`.
    pub fn set_indicator_name(
        &mut self,
        index: usize,
        atom: Atom,
        changes: &mut Changes,
    ) -> Result<(), KeymapError> {
        if index >= NUM_INDICATORS {
            return Err(KeymapError::InvalidValue(index as i64));
        }
        let names = self.names.get_or_insert_with(Names::default);
        if names.indicators[index] != atom {
            names.indicators[index] = atom;
            changes.names.changed |= parts::INDICATOR_NAMES;
            changes.names.changed_indicators |= 1 << index;
        }
        Ok(())
    }
}
