//! Compatibility map: symbol interpretations and per-group compatibility
//! modifiers used by legacy clients.

use super::{Action, Keymap, KeymapError, Keysym, ModsDef, NUM_KBD_GROUPS};
use crate::changes::Changes;

/// How a [`SymInterpret`]'s modifiers are matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymMatch {
    NoneOf,
    #[default]
    AnyOfOrNone,
    AnyOf,
    AllOf,
    Exactly,
}

impl SymMatch {
    /// Evaluates the match against a key's modifier map.
    pub fn matches(self, wanted: u8, key_mods: u8) -> bool {
        match self {
            SymMatch::NoneOf => wanted & key_mods == 0,
            SymMatch::AnyOfOrNone => key_mods == 0 || wanted & key_mods != 0,
            SymMatch::AnyOf => wanted & key_mods != 0,
            SymMatch::AllOf => wanted & key_mods == wanted,
            SymMatch::Exactly => wanted == key_mods,
        }
    }
}

/// A rule translating a legacy symbol on a key into an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymInterpret {
    /// Symbol to match, or [`super::NO_SYMBOL`] for any.
    pub sym: Keysym,
    pub flags: u8,
    pub match_kind: SymMatch,
    pub mods: u8,
    /// Virtual modifier index to bind, or `None`.
    pub virtual_mod: Option<u8>,
    pub act: Action,
}

impl SymInterpret {
    /// Flag: the key auto-repeats.
    pub const AUTO_REPEAT: u8 = 1 << 0;
    /// Flag: the action applies at level one only.
    pub const LEVEL_ONE_ONLY: u8 = 1 << 7;
}

/// The compatibility map of a keymap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatMap {
    pub sym_interpret: Vec<SymInterpret>,
    /// Compatibility modifiers reported for each group.
    pub groups: [ModsDef; NUM_KBD_GROUPS],
}

impl CompatMap {
    /// Finds the first interpretation matching `sym` and the key's modifiers.
    pub fn find_interpret(&self, sym: Keysym, key_mods: u8) -> Option<&SymInterpret> {
        self.sym_interpret
            .iter()
            .filter(|si| si.sym == sym || si.sym == super::NO_SYMBOL)
            .find(|si| si.match_kind.matches(si.mods, key_mods))
    }
}

impl Keymap {
    /// Appends interpretations to the compatibility map, creating it when
    /// absent, and records the added range.
    ///
    /// # Errors
    ///
    /// [`KeymapError::AllocationFailure`] if the list cannot grow.
    pub fn add_sym_interprets(
        &mut self,
        interprets: &[SymInterpret],
        changes: &mut Changes,
    ) -> Result<(), KeymapError> {
        let compat = self.compat.get_or_insert_with(CompatMap::default);
        compat
            .sym_interpret
            .try_reserve(interprets.len())
            .map_err(|_| KeymapError::AllocationFailure {
                requested: interprets.len(),
            })?;
        let first = compat.sym_interpret.len();
        compat.sym_interpret.extend_from_slice(interprets);
        if changes.compat.num_si == 0 {
            changes.compat.first_si = first as u16;
        }
        let noted = compat.sym_interpret.len() - usize::from(changes.compat.first_si);
        changes.compat.num_si = noted as u16;
        Ok(())
    }

    /// Sets the compatibility modifiers of `group`, resolving virtual
    /// modifiers against the current bindings.
    ///
    /// # Errors
    ///
    /// [`KeymapError::InvalidValue`] for a group outside `[0, 4)`.
    pub fn set_compat_group(
        &mut self,
        group: usize,
        mut def: ModsDef,
        changes: &mut Changes,
    ) -> Result<(), KeymapError> {
        if group >= NUM_KBD_GROUPS {
            return Err(KeymapError::InvalidValue(group as i64));
        }
        self.resolve_mods(&mut def);
        let compat = self.compat.get_or_insert_with(CompatMap::default);
        if compat.groups[group] != def {
            compat.groups[group] = def;
            changes.compat.changed_groups |= 1 << group;
        }
        Ok(())
    }

    /// Re-resolves every compatibility group mask, e.g. after virtual
    /// modifier bindings changed.  Returns the groups whose mask changed.
    pub fn resolve_compat_groups(&mut self) -> u8 {
        let Some(mut groups) = self.compat.as_ref().map(|c| c.groups) else {
            return 0;
        };
        let mut changed = 0;
        for (i, def) in groups.iter_mut().enumerate() {
            let before = def.mask;
            self.resolve_mods(def);
            if def.mask != before {
                changed |= 1 << i;
            }
        }
        if let Some(compat) = self.compat.as_mut() {
            compat.groups = groups;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::mods;
    use crate::keymap::tests::make_keymap;

    #[test]
    fn test_sym_match_any_of_or_none_accepts_empty_modmap() {
        assert!(SymMatch::AnyOfOrNone.matches(mods::SHIFT, 0));
        assert!(SymMatch::AnyOfOrNone.matches(mods::SHIFT, mods::SHIFT));
        assert!(!SymMatch::AnyOfOrNone.matches(mods::SHIFT, mods::LOCK));
        assert!(SymMatch::Exactly.matches(mods::LOCK, mods::LOCK));
        assert!(!SymMatch::AllOf.matches(mods::LOCK | mods::SHIFT, mods::LOCK));
    }

    #[test]
    fn test_add_sym_interprets_records_range() {
        // Arrange
        let mut keymap = make_keymap();
        let mut changes = Changes::default();
        let si = SymInterpret {
            sym: 0xffe1,
            ..SymInterpret::default()
        };

        // Act
        keymap.add_sym_interprets(&[si], &mut changes).expect("add");
        keymap.add_sym_interprets(&[si, si], &mut changes).expect("add");

        // Assert
        assert_eq!(changes.compat.first_si, 0);
        assert_eq!(changes.compat.num_si, 3);
        let compat = keymap.compat.as_ref().expect("compat");
        assert!(compat.find_interpret(0xffe1, 0).is_some());
        assert!(compat.find_interpret(0x61, 0).is_none());
    }

    #[test]
    fn test_set_compat_group_resolves_vmods_and_flags_change() {
        // Arrange
        let mut keymap = make_keymap();
        keymap.server.as_mut().expect("server").vmods[2] = mods::MOD5;
        let mut changes = Changes::default();

        // Act
        keymap
            .set_compat_group(
                1,
                ModsDef {
                    mask: 0,
                    real_mods: 0,
                    vmods: 1 << 2,
                },
                &mut changes,
            )
            .expect("set");

        // Assert
        assert_eq!(keymap.compat.as_ref().expect("compat").groups[1].mask, mods::MOD5);
        assert_eq!(changes.compat.changed_groups, 0b10);
        assert!(keymap.set_compat_group(4, ModsDef::default(), &mut changes).is_err());
    }
}
