//! Changing the keycode range of a live keymap.

use tracing::debug;

use super::{
    map_parts, Keycode, Keymap, KeymapError, MAX_LEGAL_KEYCODE, MIN_LEGAL_KEYCODE, NO_SYMBOL,
};
use crate::changes::Changes;

/// Reserves room for `len` total entries without changing the contents.
fn reserve_to<T>(v: &mut Vec<T>, len: usize) -> Result<(), KeymapError> {
    if v.is_empty() || v.len() >= len {
        return Ok(());
    }
    v.try_reserve_exact(len - v.len())
        .map_err(|_| KeymapError::AllocationFailure { requested: len })
}

/// Zero-fills `v[from..to]`, clipped to the vector.
fn clear<T: Default + Clone>(v: &mut [T], from: usize, to: usize) {
    let to = to.min(v.len());
    if from < to {
        v[from..to].fill(T::default());
    }
}

impl Keymap {
    /// Moves the keycode range to `[min, max]`, extending or shrinking every
    /// per-key array consistently.
    ///
    /// Keys entering the range start out empty; keys leaving it are cleared
    /// and their pool windows released.  Every component that gains keys is
    /// noted in `changes.map` with the affected key range.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::InvalidValue`] if either bound is outside the legal
    ///   range or `min > max`.
    /// - [`KeymapError::AllocationFailure`] if any array cannot grow; no array
    ///   is touched in that case.
    pub fn change_keycode_range(
        &mut self,
        min: Keycode,
        max: Keycode,
        changes: &mut Changes,
    ) -> Result<(), KeymapError> {
        if min < MIN_LEGAL_KEYCODE || max > MAX_LEGAL_KEYCODE {
            return Err(KeymapError::InvalidValue(i64::from(min)));
        }
        if min > max {
            return Err(KeymapError::InvalidValue(i64::from(min)));
        }
        let (old_min, old_max) = (self.min_key_code, self.max_key_code);
        let per_key = usize::from(max) + 1;

        // Reserve everything first; from here on nothing can fail.
        if max > old_max {
            if let Some(map) = self.map.as_mut() {
                reserve_to(&mut map.key_sym_map, per_key)?;
                reserve_to(&mut map.modmap, per_key)?;
            }
            if let Some(server) = self.server.as_mut() {
                reserve_to(&mut server.explicit, per_key)?;
                reserve_to(&mut server.key_acts, per_key)?;
                reserve_to(&mut server.behaviors, per_key)?;
                reserve_to(&mut server.vmodmap, per_key)?;
            }
            if let Some(names) = self.names.as_mut() {
                reserve_to(&mut names.keys, per_key)?;
            }
        }

        // Keys below the old minimum.
        if min < old_min {
            self.clear_keys(min, old_min - 1, changes);
        }
        // Keys above the old maximum.
        if max > old_max {
            self.grow_per_key_arrays(per_key);
            self.clear_keys(old_max + 1, max, changes);
        }
        // Keys leaving the range.
        if min > old_min {
            self.release_keys(old_min, (min - 1).min(old_max));
        }
        if max < old_max {
            self.release_keys((max + 1).max(old_min), old_max);
            self.truncate_per_key_arrays(per_key);
        }

        self.min_key_code = min;
        self.max_key_code = max;
        changes.map.min_key_code = min;
        changes.map.max_key_code = max;
        debug!(old_min, old_max, min, max, "changed keycode range");
        Ok(())
    }

    fn grow_per_key_arrays(&mut self, per_key: usize) {
        fn grow<T: Default + Clone>(v: &mut Vec<T>, len: usize) {
            if !v.is_empty() && v.len() < len {
                v.resize(len, T::default());
            }
        }
        if let Some(map) = self.map.as_mut() {
            grow(&mut map.key_sym_map, per_key);
            grow(&mut map.modmap, per_key);
        }
        if let Some(server) = self.server.as_mut() {
            grow(&mut server.explicit, per_key);
            grow(&mut server.key_acts, per_key);
            grow(&mut server.behaviors, per_key);
            grow(&mut server.vmodmap, per_key);
        }
        if let Some(names) = self.names.as_mut() {
            grow(&mut names.keys, per_key);
        }
    }

    fn truncate_per_key_arrays(&mut self, per_key: usize) {
        if let Some(map) = self.map.as_mut() {
            map.key_sym_map.truncate(per_key);
            map.modmap.truncate(per_key);
        }
        if let Some(server) = self.server.as_mut() {
            server.explicit.truncate(per_key);
            server.key_acts.truncate(per_key);
            server.behaviors.truncate(per_key);
            server.vmodmap.truncate(per_key);
        }
        if let Some(names) = self.names.as_mut() {
            names.keys.truncate(per_key);
        }
    }

    /// Empties keys `[first, last]` and records them as changed.
    fn clear_keys(&mut self, first: Keycode, last: Keycode, changes: &mut Changes) {
        let (from, to) = (usize::from(first), usize::from(last) + 1);
        if let Some(map) = self.map.as_mut() {
            if !map.key_sym_map.is_empty() {
                clear(&mut map.key_sym_map, from, to);
                changes.map.note_keys(map_parts::KEY_SYMS, first, last);
            }
            if !map.modmap.is_empty() {
                clear(&mut map.modmap, from, to);
                changes.map.note_keys(map_parts::MODIFIER_MAP, first, last);
            }
        }
        if let Some(server) = self.server.as_mut() {
            if !server.explicit.is_empty() {
                clear(&mut server.explicit, from, to);
                changes.map.note_keys(map_parts::EXPLICIT_COMPONENTS, first, last);
            }
            if !server.behaviors.is_empty() {
                clear(&mut server.behaviors, from, to);
                changes.map.note_keys(map_parts::KEY_BEHAVIORS, first, last);
            }
            if !server.key_acts.is_empty() {
                clear(&mut server.key_acts, from, to);
                changes.map.note_keys(map_parts::KEY_ACTIONS, first, last);
            }
            if !server.vmodmap.is_empty() {
                clear(&mut server.vmodmap, from, to);
                changes.map.note_keys(map_parts::VIRTUAL_MOD_MAP, first, last);
            }
        }
        if let Some(names) = self.names.as_mut() {
            if !names.keys.is_empty() {
                clear(&mut names.keys, from, to);
                changes.names.changed |= super::names::parts::KEY_NAMES;
                changes.names.keys.include_span(first, last);
            }
        }
    }

    /// Detaches keys `[first, last]` from both pools before they drop out of
    /// the range.
    fn release_keys(&mut self, first: Keycode, last: Keycode) {
        if first > last {
            return;
        }
        let (from, to) = (usize::from(first), usize::from(last) + 1);
        if let Some(map) = self.map.as_mut() {
            for key in from..to.min(map.key_sym_map.len()) {
                let entry = map.key_sym_map[key];
                let n = entry.num_syms();
                if n > 0 {
                    map.syms[entry.offset..entry.offset + n].fill(NO_SYMBOL);
                }
            }
            clear(&mut map.key_sym_map, from, to);
            clear(&mut map.modmap, from, to);
        }
        if let Some(server) = self.server.as_mut() {
            clear(&mut server.explicit, from, to);
            clear(&mut server.key_acts, from, to);
            clear(&mut server.behaviors, from, to);
            clear(&mut server.vmodmap, from, to);
        }
        if let Some(names) = self.names.as_mut() {
            clear(&mut names.keys, from, to);
        }
    }
}
