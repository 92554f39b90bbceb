//! Key types: which modifier combinations select which shift level.
//!
//! Every key group refers to one key type by index.  The first four types
//! are canonical and have fixed level counts:
//!
//! | Index | Name         | Levels |
//! |-------|--------------|--------|
//! | 0     | `ONE_LEVEL`  | 1      |
//! | 1     | `TWO_LEVEL`  | 2      |
//! | 2     | `ALPHABETIC` | 2      |
//! | 3     | `KEYPAD`     | 2      |

use tracing::debug;

use super::pool::{try_alloc, ACTION_POOL_SLACK};
use super::{
    mods, Action, Atom, Keycode, Keymap, KeymapError, Keysym, NONE_ATOM, NUM_REQUIRED_TYPES,
    ONE_LEVEL_INDEX,
};

/// A modifier definition: real modifiers, virtual modifiers, and the
/// resolved real mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModsDef {
    /// Resolved real modifiers (`real_mods | vmods resolved`).
    pub mask: u8,
    pub real_mods: u8,
    pub vmods: u16,
}

impl ModsDef {
    /// A definition using only real modifiers.
    pub const fn real(real_mods: u8) -> Self {
        Self {
            mask: real_mods,
            real_mods,
            vmods: 0,
        }
    }
}

/// One modifier-combination-to-level entry of a key type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyTypeEntry {
    pub active: bool,
    pub level: u8,
    pub mods: ModsDef,
}

/// A key type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyType {
    /// Modifiers this type looks at.
    pub mods: ModsDef,
    pub num_levels: u8,
    pub map: Vec<KeyTypeEntry>,
    /// Modifiers preserved per map entry, parallel to `map`.
    pub preserve: Option<Vec<ModsDef>>,
    pub name: Atom,
    pub level_names: Vec<Atom>,
}

impl KeyType {
    /// Canonical one-level type.
    pub fn one_level(name: Atom, level_name: Atom) -> Self {
        Self {
            num_levels: 1,
            name,
            level_names: vec![level_name],
            ..Self::default()
        }
    }

    /// Canonical two-level type: Shift selects level 2.
    pub fn two_level(name: Atom, level_names: [Atom; 2]) -> Self {
        Self {
            mods: ModsDef::real(mods::SHIFT),
            num_levels: 2,
            map: vec![KeyTypeEntry {
                active: true,
                level: 1,
                mods: ModsDef::real(mods::SHIFT),
            }],
            name,
            level_names: level_names.to_vec(),
            ..Self::default()
        }
    }

    /// Canonical alphabetic type: Shift selects level 2, Lock is preserved
    /// so case conversion can still be applied by clients.
    pub fn alphabetic(name: Atom, level_names: [Atom; 2]) -> Self {
        Self {
            mods: ModsDef::real(mods::SHIFT | mods::LOCK),
            num_levels: 2,
            map: vec![
                KeyTypeEntry {
                    active: true,
                    level: 1,
                    mods: ModsDef::real(mods::SHIFT),
                },
                KeyTypeEntry {
                    active: true,
                    level: 0,
                    mods: ModsDef::real(mods::LOCK),
                },
            ],
            preserve: Some(vec![ModsDef::default(), ModsDef::real(mods::LOCK)]),
            name,
            level_names: level_names.to_vec(),
        }
    }

    /// Canonical keypad type: Shift or the NumLock virtual modifier select
    /// level 2.  `num_lock` is the virtual modifier bit, `num_lock_real` the
    /// real modifier it is currently bound to.
    pub fn keypad(name: Atom, level_names: [Atom; 2], num_lock: u16, num_lock_real: u8) -> Self {
        let num_lock_def = ModsDef {
            mask: num_lock_real,
            real_mods: 0,
            vmods: num_lock,
        };
        Self {
            mods: ModsDef {
                mask: mods::SHIFT | num_lock_real,
                real_mods: mods::SHIFT,
                vmods: num_lock,
            },
            num_levels: 2,
            map: vec![
                KeyTypeEntry {
                    active: true,
                    level: 1,
                    mods: ModsDef::real(mods::SHIFT),
                },
                KeyTypeEntry {
                    active: num_lock_real != 0,
                    level: 1,
                    mods: num_lock_def,
                },
            ],
            name,
            level_names: level_names.to_vec(),
            ..Self::default()
        }
    }
}

/// Level count a canonical type index requires, if `index` is canonical.
fn canonical_levels(index: usize) -> Option<u8> {
    match index {
        ONE_LEVEL_INDEX => Some(1),
        1..=3 => Some(2),
        _ => None,
    }
}

impl Keymap {
    /// Adds `key_type` to the client map and returns its index.
    ///
    /// A type with the same (non-empty) name is replaced in place.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::Mismatch`] if there is no client map, or the type would
    ///   land on a canonical index with the wrong level count.
    /// - [`KeymapError::InvalidValue`] if the type has no levels.
    /// - [`KeymapError::AllocationFailure`] if the type list cannot grow.
    pub fn add_key_type(&mut self, key_type: KeyType) -> Result<usize, KeymapError> {
        if key_type.num_levels < 1 {
            return Err(KeymapError::InvalidValue(0));
        }
        let map = self
            .map
            .as_mut()
            .ok_or_else(|| KeymapError::Mismatch("no client map".to_string()))?;
        let existing = if key_type.name == NONE_ATOM {
            None
        } else {
            map.types.iter().position(|t| t.name == key_type.name)
        };
        let index = existing.unwrap_or(map.types.len());
        if let Some(levels) = canonical_levels(index) {
            if key_type.num_levels != levels {
                return Err(KeymapError::Mismatch(format!(
                    "canonical type {index} needs {levels} levels, got {}",
                    key_type.num_levels
                )));
            }
        }
        match existing {
            Some(i) => map.types[i] = key_type,
            None => {
                map.types
                    .try_reserve(1)
                    .map_err(|_| KeymapError::AllocationFailure { requested: 1 })?;
                map.types.push(key_type);
            }
        }
        Ok(index)
    }

    /// Resizes key type `type_index` to `map_count` map entries and
    /// `new_num_levels` levels, relocating the symbols of every key that uses
    /// it.
    ///
    /// Growing the type widens the symbol window of each affected key (one
    /// whose width is at least the old level count but below the new one) so
    /// that every group gets `new_num_levels` slots; existing symbols keep
    /// their group and level, new levels are [`super::NO_SYMBOL`].  Affected
    /// keys with actions get their action windows widened the same way, with
    /// [`Action::NoAction`] in the new levels.  Shrinking
    /// clears the dropped levels in the groups that use the type.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::InvalidValue`] for a bad index, a negative `map_count`,
    ///   or `new_num_levels < 1`.
    /// - [`KeymapError::Mismatch`] if a canonical type would get the wrong
    ///   level count.
    /// - [`KeymapError::AllocationFailure`] if the new pool cannot be
    ///   allocated; nothing is modified in that case.
    pub fn resize_key_type(
        &mut self,
        type_index: usize,
        map_count: i32,
        want_preserve: bool,
        new_num_levels: i32,
    ) -> Result<(), KeymapError> {
        let num_types = self.map.as_ref().map(|m| m.types.len()).unwrap_or(0);
        if type_index >= num_types {
            return Err(KeymapError::InvalidValue(type_index as i64));
        }
        if map_count < 0 {
            return Err(KeymapError::InvalidValue(i64::from(map_count)));
        }
        if !(1..=255).contains(&new_num_levels) {
            return Err(KeymapError::InvalidValue(i64::from(new_num_levels)));
        }
        let new_levels = new_num_levels as u8;
        if let Some(levels) = canonical_levels(type_index) {
            if new_levels != levels {
                return Err(KeymapError::Mismatch(format!(
                    "canonical type {type_index} needs {levels} levels, got {new_levels}"
                )));
            }
        }
        let (min, max) = (self.min_key_code, self.max_key_code);
        let Some(map) = self.map.as_mut() else {
            return Err(KeymapError::InvalidValue(type_index as i64));
        };
        let old_levels = map.types[type_index].num_levels;
        let uses_type = |map: &super::ClientMap, key: Keycode| {
            let entry = &map.key_sym_map[usize::from(key)];
            (0..entry.group_info.num_groups())
                .any(|g| usize::from(entry.kt_index[usize::from(g)]) == type_index)
        };

        // Plan the symbol and action relocation before touching anything so
        // a failed allocation leaves the keymap intact.
        let server = self
            .server
            .as_mut()
            .filter(|s| !s.acts.is_empty() && !s.key_acts.is_empty());
        let mut matching: Vec<Keycode> = Vec::new();
        let mut rebuilt: Option<(Vec<Keysym>, usize)> = None;
        let mut rebuilt_acts: Option<(Vec<Action>, Vec<usize>, usize)> = None;
        let mut offsets: Vec<usize> = Vec::new();
        if !map.key_sym_map.is_empty() && new_levels > old_levels {
            let stride = usize::from(new_levels);
            let mut total = 1usize;
            for key in min..=max {
                let entry = &map.key_sym_map[usize::from(key)];
                let width = entry.width;
                if width < old_levels || width >= new_levels || !uses_type(map, key) {
                    total += entry.num_syms();
                    continue;
                }
                matching.push(key);
                total += usize::from(entry.group_info.num_groups()) * stride;
            }
            if !matching.is_empty() {
                let size = total * 15 / 10;
                let mut syms = try_alloc::<Keysym>(size)?;
                offsets = try_alloc::<usize>(usize::from(max) + 1)?;
                let mut next = 1usize;
                for key in min..=max {
                    let entry = &map.key_sym_map[usize::from(key)];
                    let old = &map.syms[entry.offset..entry.offset + entry.num_syms()];
                    if matching.binary_search(&key).is_ok() {
                        let width = usize::from(entry.width);
                        let groups = usize::from(entry.group_info.num_groups());
                        for g in 0..groups {
                            let dst = next + stride * g;
                            syms[dst..dst + width].copy_from_slice(&old[width * g..width * (g + 1)]);
                        }
                        offsets[usize::from(key)] = next;
                        next += groups * stride;
                    } else {
                        syms[next..next + old.len()].copy_from_slice(old);
                        offsets[usize::from(key)] = if old.is_empty() { 0 } else { next };
                        next += old.len();
                    }
                }
                rebuilt = Some((syms, next));

                // Keys with actions keep one action per symbol, so their
                // action windows widen the same way.
                if let Some(server) = server.as_deref() {
                    let widened = |key: &Keycode| server.key_acts[usize::from(*key)] != 0;
                    if matching.iter().any(widened) {
                        let mut total = 1usize;
                        for key in min..=max {
                            let k = usize::from(key);
                            if server.key_acts[k] == 0 {
                                continue;
                            }
                            let entry = &map.key_sym_map[k];
                            total += if matching.binary_search(&key).is_ok() {
                                usize::from(entry.group_info.num_groups()) * stride
                            } else {
                                entry.num_syms()
                            };
                        }
                        let mut acts = try_alloc::<Action>(total + ACTION_POOL_SLACK)?;
                        let mut starts = try_alloc::<usize>(server.key_acts.len())?;
                        let mut next = 1usize;
                        for key in min..=max {
                            let k = usize::from(key);
                            let from = server.key_acts[k];
                            if from == 0 {
                                continue;
                            }
                            let entry = &map.key_sym_map[k];
                            let old = &server.acts[from..from + entry.num_syms()];
                            starts[k] = next;
                            if matching.binary_search(&key).is_ok() {
                                let width = usize::from(entry.width);
                                let groups = usize::from(entry.group_info.num_groups());
                                for g in 0..groups {
                                    let dst = next + stride * g;
                                    acts[dst..dst + width]
                                        .copy_from_slice(&old[width * g..width * (g + 1)]);
                                }
                                next += groups * stride;
                            } else {
                                acts[next..next + old.len()].copy_from_slice(old);
                                next += old.len();
                            }
                        }
                        rebuilt_acts = Some((acts, starts, next));
                    }
                }
            }
        } else if !map.key_sym_map.is_empty() && new_levels < old_levels {
            for key in min..=max {
                if map.key_sym_map[usize::from(key)].width < old_levels {
                    continue;
                }
                if uses_type(map, key) {
                    matching.push(key);
                }
            }
        }

        if let Some((acts, starts, used)) = rebuilt_acts {
            if let Some(server) = server {
                debug!(
                    type_index,
                    pool = acts.len(),
                    used,
                    "rebuilt action pool for key type growth"
                );
                let (lo, hi) = (usize::from(min), usize::from(max));
                server.key_acts[lo..=hi].copy_from_slice(&starts[lo..=hi]);
                server.acts = acts;
                server.num_acts = used;
            }
        }
        if rebuilt.is_some() {
            for key in min..=max {
                let entry = &mut map.key_sym_map[usize::from(key)];
                entry.offset = offsets[usize::from(key)];
                if matching.binary_search(&key).is_ok() {
                    entry.width = new_levels;
                }
            }
        }
        if let Some((syms, used)) = rebuilt {
            debug!(
                type_index,
                old_levels,
                new_levels,
                keys = matching.len(),
                pool = syms.len(),
                "rebuilt symbol pool for key type growth"
            );
            map.syms = syms;
            map.num_syms = used;
        } else if !matching.is_empty() {
            let first_clear = usize::from(old_levels.min(new_levels));
            for &key in &matching {
                let entry = map.key_sym_map[usize::from(key)];
                let width = usize::from(entry.width);
                if width <= first_clear {
                    continue;
                }
                for g in 0..entry.group_info.num_groups() {
                    if usize::from(entry.kt_index[usize::from(g)]) != type_index {
                        continue;
                    }
                    let start = entry.offset + usize::from(g) * width;
                    map.syms[start + first_clear..start + width].fill(super::NO_SYMBOL);
                }
            }
        }

        let key_type = &mut map.types[type_index];
        let map_count = map_count as usize;
        key_type.map.resize(map_count, KeyTypeEntry::default());
        if want_preserve && map_count > 0 {
            key_type
                .preserve
                .get_or_insert_with(Vec::new)
                .resize(map_count, ModsDef::default());
        } else {
            key_type.preserve = None;
        }
        if usize::from(new_levels) > key_type.level_names.len() {
            key_type
                .level_names
                .resize(usize::from(new_levels), NONE_ATOM);
        }
        key_type.num_levels = new_levels;
        Ok(())
    }

    /// Number of types in the client map, or 0.
    pub fn num_types(&self) -> usize {
        self.map.as_ref().map(|m| m.types.len()).unwrap_or(0)
    }

    /// Returns `true` if the first [`NUM_REQUIRED_TYPES`] types are present.
    pub fn has_canonical_types(&self) -> bool {
        self.num_types() >= NUM_REQUIRED_TYPES
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keymap::action::ModAction;
    use crate::keymap::tests::{bind_key, make_keymap};
    use crate::keymap::{
        map_parts, GroupInfo, OutOfRange, ALPHABETIC_INDEX, KEYPAD_INDEX, NUM_KBD_GROUPS,
        TWO_LEVEL_INDEX,
    };

    pub(crate) fn make_canonical_types() -> Vec<KeyType> {
        vec![
            KeyType::one_level(1, 10),
            KeyType::two_level(2, [10, 11]),
            KeyType::alphabetic(3, [10, 12]),
            KeyType::keypad(4, [10, 13], 1, crate::keymap::mods::MOD2),
        ]
    }

    fn make_four_level_type(name: Atom) -> KeyType {
        KeyType {
            mods: ModsDef::real(mods::SHIFT | mods::MOD5),
            num_levels: 2,
            map: vec![KeyTypeEntry {
                active: true,
                level: 1,
                mods: ModsDef::real(mods::SHIFT),
            }],
            name,
            level_names: vec![10, 11],
            ..KeyType::default()
        }
    }

    #[test]
    fn test_add_key_type_appends_and_returns_index() {
        // Arrange
        let mut keymap = make_keymap();

        // Act
        let index = keymap.add_key_type(make_four_level_type(99)).expect("add");

        // Assert
        assert_eq!(index, NUM_REQUIRED_TYPES);
        assert_eq!(keymap.num_types(), NUM_REQUIRED_TYPES + 1);
        assert!(keymap.has_canonical_types());
    }

    #[test]
    fn test_add_key_type_replaces_same_name() {
        // Arrange
        let mut keymap = make_keymap();
        let first = keymap.add_key_type(make_four_level_type(99)).expect("add");
        let mut replacement = make_four_level_type(99);
        replacement.num_levels = 3;

        // Act
        let second = keymap.add_key_type(replacement).expect("replace");

        // Assert
        assert_eq!(first, second);
        assert_eq!(keymap.map.as_ref().expect("map").types[second].num_levels, 3);
    }

    #[test]
    fn test_add_key_type_rejects_wrong_canonical_levels() {
        // Arrange – fresh keymap, next index is ONE_LEVEL
        let mut keymap = Keymap::new(8, 15).expect("bounds");
        keymap
            .allocate_client_map(map_parts::KEY_TYPES, NUM_REQUIRED_TYPES)
            .expect("alloc");

        // Act
        let result = keymap.add_key_type(KeyType::two_level(2, [10, 11]));

        // Assert
        assert!(matches!(result, Err(KeymapError::Mismatch(_))));
    }

    #[test]
    fn test_resize_key_type_rejects_bad_arguments() {
        let mut keymap = make_keymap();
        assert_eq!(
            keymap.resize_key_type(42, 1, false, 2),
            Err(KeymapError::InvalidValue(42))
        );
        assert_eq!(
            keymap.resize_key_type(TWO_LEVEL_INDEX, -1, false, 2),
            Err(KeymapError::InvalidValue(-1))
        );
        assert_eq!(
            keymap.resize_key_type(TWO_LEVEL_INDEX, 1, false, 0),
            Err(KeymapError::InvalidValue(0))
        );
    }

    #[test]
    fn test_resize_canonical_type_to_incompatible_levels_is_mismatch() {
        let mut keymap = make_keymap();
        assert!(matches!(
            keymap.resize_key_type(ALPHABETIC_INDEX, 2, true, 3),
            Err(KeymapError::Mismatch(_))
        ));
        assert!(matches!(
            keymap.resize_key_type(ONE_LEVEL_INDEX, 0, false, 2),
            Err(KeymapError::Mismatch(_))
        ));
        assert_eq!(keymap.resize_key_type(KEYPAD_INDEX, 2, false, 2), Ok(()));
    }

    #[test]
    fn test_resize_key_type_two_to_four_levels_widens_matching_keys() {
        // Arrange – three keys of width 2 using a custom two-level type
        let mut keymap = make_keymap();
        let kt = keymap.add_key_type(make_four_level_type(99)).expect("add");
        bind_key(&mut keymap, 10, kt, &[0x61, 0x41]);
        bind_key(&mut keymap, 11, kt, &[0x62, 0x42]);
        bind_key(&mut keymap, 12, kt, &[0x63, 0x43]);
        bind_key(&mut keymap, 13, TWO_LEVEL_INDEX, &[0x31, 0x21]);

        // Act
        keymap.resize_key_type(kt, 2, false, 4).expect("resize");

        // Assert
        assert_eq!(keymap.key_syms(10), &[0x61, 0x41, 0, 0]);
        assert_eq!(keymap.key_syms(11), &[0x62, 0x42, 0, 0]);
        assert_eq!(keymap.key_syms(12), &[0x63, 0x43, 0, 0]);
        assert_eq!(keymap.key_syms(13), &[0x31, 0x21], "other keys untouched");
        for key in 10..=12 {
            assert_eq!(keymap.key_width(key), 4);
        }
        assert_eq!(keymap.map.as_ref().expect("map").types[kt].num_levels, 4);
        assert_eq!(keymap.validate(), Ok(()));
    }

    #[test]
    fn test_resize_key_type_growth_keeps_groups_contiguous() {
        // Arrange – one key with two groups of the custom type
        let mut keymap = make_keymap();
        let kt = keymap.add_key_type(make_four_level_type(99)).expect("add");
        bind_key(&mut keymap, 10, kt, &[0x61, 0x41, 0x6c1, 0x6e1]);
        {
            let entry = &mut keymap.map.as_mut().expect("map").key_sym_map[10];
            entry.width = 2;
            entry.group_info = GroupInfo::new(2, OutOfRange::Wrap);
            entry.kt_index = [kt as u8; NUM_KBD_GROUPS];
        }

        // Act
        keymap.resize_key_type(kt, 2, false, 3).expect("resize");

        // Assert – group 1 moved to slot 3
        assert_eq!(keymap.key_syms(10), &[0x61, 0x41, 0, 0x6c1, 0x6e1, 0]);
        assert_eq!(keymap.key_sym_at(10, 1, 1), 0x6e1);
    }

    #[test]
    fn test_resize_key_type_growth_widens_action_windows() {
        // Arrange – key 10 uses the custom type and has actions, key 11 does not
        let mut keymap = make_keymap();
        let kt = keymap.add_key_type(make_four_level_type(99)).expect("add");
        bind_key(&mut keymap, 10, kt, &[0x61, 0x41]);
        bind_key(&mut keymap, 11, TWO_LEVEL_INDEX, &[0x62, 0x42]);
        let shift = Action::SetMods(ModAction::real(0, mods::SHIFT));
        let lock = Action::LockMods(ModAction::real(0, mods::LOCK));
        keymap
            .resize_key_actions(10, 2)
            .expect("actions")
            .copy_from_slice(&[shift, lock]);
        keymap
            .resize_key_actions(11, 2)
            .expect("actions")
            .copy_from_slice(&[lock, shift]);

        // Act
        keymap.resize_key_type(kt, 1, false, 4).expect("resize");

        // Assert
        assert_eq!(keymap.validate(), Ok(()));
        assert_eq!(
            keymap.key_actions(10),
            &[shift, lock, Action::NoAction, Action::NoAction]
        );
        assert_eq!(keymap.key_actions(11), &[lock, shift]);

        // A later action pool rebuild copies every window in bounds
        keymap.resize_key_actions(12, 40).expect("rebuild");
        assert_eq!(keymap.key_actions(10)[..2], [shift, lock]);
        assert_eq!(keymap.key_actions(11), &[lock, shift]);
        assert_eq!(keymap.validate(), Ok(()));
    }

    #[test]
    fn test_resize_key_type_shrink_clears_dropped_levels() {
        // Arrange
        let mut keymap = make_keymap();
        let mut three = make_four_level_type(99);
        three.num_levels = 3;
        let kt = keymap.add_key_type(three).expect("add");
        bind_key(&mut keymap, 10, kt, &[0x61, 0x41, 0xe6]);

        // Act
        keymap.resize_key_type(kt, 1, false, 2).expect("resize");

        // Assert – width stays, the third level is cleared
        assert_eq!(keymap.key_syms(10), &[0x61, 0x41, 0]);
        assert_eq!(keymap.map.as_ref().expect("map").types[kt].num_levels, 2);
    }

    #[test]
    fn test_resize_key_type_resizes_map_and_preserve() {
        // Arrange
        let mut keymap = make_keymap();
        let kt = keymap.add_key_type(make_four_level_type(99)).expect("add");

        // Act
        keymap.resize_key_type(kt, 3, true, 4).expect("resize");

        // Assert
        let key_type = &keymap.map.as_ref().expect("map").types[kt];
        assert_eq!(key_type.map.len(), 3);
        assert_eq!(key_type.preserve.as_ref().map(Vec::len), Some(3));
        assert_eq!(key_type.level_names.len(), 4);
    }
}
