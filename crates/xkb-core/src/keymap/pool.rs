//! Symbol and action pools.
//!
//! # How the pools work (for beginners)
//!
//! Instead of giving every key its own `Vec<Keysym>`, all symbols live in
//! one shared vector.  Each key remembers where its symbols start
//! (`offset`) and how many it has (`width × groups`):
//!
//! ```text
//! syms:  [ NoSymbol | a A | b B | Escape | 1 ! ... | <free tail> ]
//!          slot 0     ^key 38 ^key 56  ^key 9
//! ```
//!
//! Slot 0 is always `NoSymbol` and doubles as "this key has nothing".
//! `num_syms` marks the end of the used part; everything after it up to
//! `syms.len()` is free tail space.  Growing a key first tries the tail;
//! only when the tail is too small is the whole pool rebuilt, in keycode
//! order, into a larger vector.  Actions work the same way, except that a
//! key's action window is indexed by `key_acts[key]` and 0 means "no
//! actions".

use tracing::debug;

use super::{
    map_parts, Action, Behavior, GroupInfo, KeyType, Keycode, Keymap, KeymapError, Keysym,
    NO_SYMBOL, NUM_KBD_GROUPS, NUM_REQUIRED_TYPES, NUM_VIRTUAL_MODS,
};

/// Extra action slots reserved on every action pool rebuild.
pub(crate) const ACTION_POOL_SLACK: usize = 8;
/// Minimum growth of the symbol pool on rebuild.
const SYMBOL_POOL_MIN_GROWTH: usize = 32;

/// Allocates a zero-initialised vector, reporting failure instead of
/// aborting.
pub(crate) fn try_alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>, KeymapError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| KeymapError::AllocationFailure { requested: len })?;
    v.resize(len, T::default());
    Ok(v)
}

/// One key's window into the symbol pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymMapEntry {
    /// Key type index per group.
    pub kt_index: [u8; NUM_KBD_GROUPS],
    pub group_info: GroupInfo,
    /// Levels per group.
    pub width: u8,
    /// Start of this key's symbols in [`ClientMap::syms`].
    pub offset: usize,
}

impl SymMapEntry {
    /// Total symbols in this key's window.
    pub fn num_syms(&self) -> usize {
        usize::from(self.width) * usize::from(self.group_info.num_groups())
    }
}

/// Key types, the symbol pool and the modifier map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMap {
    pub types: Vec<KeyType>,
    /// The symbol pool.  `syms.len()` is the allocated size.
    pub syms: Vec<Keysym>,
    /// Used prefix of `syms`.
    pub num_syms: usize,
    /// Indexed by keycode, `max_key_code + 1` entries.
    pub key_sym_map: Vec<SymMapEntry>,
    /// Real modifiers per key, indexed by keycode.
    pub modmap: Vec<u8>,
}

/// Actions, behaviors, explicit flags and virtual modifier bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMap {
    /// Explicit component flags per key.
    pub explicit: Vec<u8>,
    /// The action pool.  `acts.len()` is the allocated size.
    pub acts: Vec<Action>,
    /// Used prefix of `acts`.
    pub num_acts: usize,
    /// Per key start index into `acts`; 0 means no actions.
    pub key_acts: Vec<usize>,
    pub behaviors: Vec<Behavior>,
    /// Real modifiers each virtual modifier is bound to.
    pub vmods: [u8; NUM_VIRTUAL_MODS],
    /// Virtual modifiers per key.
    pub vmodmap: Vec<u16>,
}

impl Keymap {
    /// Allocates the client map components named by `which`.
    ///
    /// `n_total_types` reserves room for that many key types; it must be 0
    /// or at least [`NUM_REQUIRED_TYPES`].  The symbol pool starts at
    /// 1.5 slots per key with slot 0 holding [`NO_SYMBOL`].
    ///
    /// # Errors
    ///
    /// - [`KeymapError::InvalidValue`] for 1..=3 types, or symbol allocation
    ///   with illegal keycode bounds.
    /// - [`KeymapError::Mismatch`] for modifier map allocation with illegal
    ///   bounds.
    /// - [`KeymapError::AllocationFailure`] if memory runs out.
    pub fn allocate_client_map(
        &mut self,
        which: u16,
        n_total_types: usize,
    ) -> Result<(), KeymapError> {
        if n_total_types > 0 && n_total_types < NUM_REQUIRED_TYPES {
            return Err(KeymapError::InvalidValue(n_total_types as i64));
        }
        let legal = self.legal_bounds();
        if which & map_parts::KEY_SYMS != 0 && !legal {
            return Err(KeymapError::InvalidValue(i64::from(self.min_key_code)));
        }
        if which & map_parts::MODIFIER_MAP != 0 && !legal {
            return Err(KeymapError::Mismatch(format!(
                "illegal keycode range [{}, {}]",
                self.min_key_code, self.max_key_code
            )));
        }
        let per_key = usize::from(self.max_key_code) + 1;
        let num_keys = self.num_keys();
        let map = self.map.get_or_insert_with(ClientMap::default);

        if which & map_parts::KEY_TYPES != 0 && n_total_types > map.types.capacity() {
            map.types
                .try_reserve(n_total_types - map.types.len())
                .map_err(|_| KeymapError::AllocationFailure {
                    requested: n_total_types,
                })?;
        }
        if which & map_parts::KEY_SYMS != 0 {
            if map.syms.is_empty() {
                let size = (num_keys * 15 / 10).max(1);
                map.syms = try_alloc(size)?;
                map.syms[0] = NO_SYMBOL;
                map.num_syms = 1;
            }
            if map.key_sym_map.is_empty() {
                map.key_sym_map = try_alloc(per_key)?;
            }
        }
        if which & map_parts::MODIFIER_MAP != 0 && map.modmap.is_empty() {
            map.modmap = try_alloc(per_key)?;
        }
        Ok(())
    }

    /// Allocates the server map components named by `which`, with room for
    /// at least `n_new_actions` more actions.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::Mismatch`] for illegal keycode bounds.
    /// - [`KeymapError::AllocationFailure`] if memory runs out.
    pub fn allocate_server_map(
        &mut self,
        which: u16,
        n_new_actions: usize,
    ) -> Result<(), KeymapError> {
        if !self.legal_bounds() {
            return Err(KeymapError::Mismatch(format!(
                "illegal keycode range [{}, {}]",
                self.min_key_code, self.max_key_code
            )));
        }
        let per_key = usize::from(self.max_key_code) + 1;
        let server = self.server.get_or_insert_with(ServerMap::default);

        if which & map_parts::EXPLICIT_COMPONENTS != 0 && server.explicit.is_empty() {
            server.explicit = try_alloc(per_key)?;
        }
        if which & map_parts::KEY_ACTIONS != 0 {
            let n_new = n_new_actions.max(1);
            if server.acts.is_empty() {
                server.acts = try_alloc(n_new + 1)?;
                server.num_acts = 1;
            } else if server.acts.len() - server.num_acts < n_new {
                let need = server.num_acts + n_new;
                server
                    .acts
                    .try_reserve_exact(need - server.acts.len())
                    .map_err(|_| KeymapError::AllocationFailure { requested: need })?;
                server.acts.resize(need, Action::NoAction);
            }
            if server.key_acts.is_empty() {
                server.key_acts = try_alloc(per_key)?;
            }
        }
        if which & map_parts::KEY_BEHAVIORS != 0 && server.behaviors.is_empty() {
            server.behaviors = try_alloc(per_key)?;
        }
        if which & map_parts::VIRTUAL_MOD_MAP != 0 && server.vmodmap.is_empty() {
            server.vmodmap = try_alloc(per_key)?;
        }
        Ok(())
    }

    /// Makes room for `needed` symbols on `key` and returns its symbol window.
    ///
    /// Existing symbols are kept (up to `needed`) and new slots are
    /// [`NO_SYMBOL`].  The caller updates the key's width and group info
    /// afterwards.  `needed == 0` detaches the key from the pool.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::InvalidValue`] if `key` is outside the keycode range.
    /// - [`KeymapError::Mismatch`] if no symbol pool is allocated.
    /// - [`KeymapError::AllocationFailure`] if the pool cannot grow; the
    ///   keymap is unchanged.
    pub fn resize_key_symbols(
        &mut self,
        key: Keycode,
        needed: usize,
    ) -> Result<&mut [Keysym], KeymapError> {
        self.check_key(key)?;
        let (min, max) = (self.min_key_code, self.max_key_code);
        let map = self
            .map
            .as_mut()
            .filter(|m| !m.syms.is_empty() && !m.key_sym_map.is_empty())
            .ok_or_else(|| KeymapError::Mismatch("no symbol pool".to_string()))?;
        let k = usize::from(key);
        let entry = map.key_sym_map[k];

        if needed == 0 {
            map.key_sym_map[k].offset = 0;
            return Ok(&mut map.syms[0..0]);
        }
        let old = entry.num_syms();
        if old >= needed {
            return Ok(&mut map.syms[entry.offset..entry.offset + needed]);
        }
        if map.syms.len() - map.num_syms >= needed {
            let offset = map.num_syms;
            if old > 0 {
                map.syms.copy_within(entry.offset..entry.offset + old, offset);
            }
            map.syms[offset + old..offset + needed].fill(NO_SYMBOL);
            map.key_sym_map[k].offset = offset;
            map.num_syms += needed;
            return Ok(&mut map.syms[offset..offset + needed]);
        }

        let size = map.syms.len() + needed.max(SYMBOL_POOL_MIN_GROWTH);
        let mut syms = try_alloc::<Keysym>(size)?;
        let mut offsets = try_alloc::<usize>(map.key_sym_map.len())?;
        let mut next = 1usize;
        for kc in min..=max {
            let e = &map.key_sym_map[usize::from(kc)];
            let n = e.num_syms();
            if n == 0 && kc != key {
                continue;
            }
            let copy = n.min(if kc == key { needed } else { n });
            syms[next..next + copy].copy_from_slice(&map.syms[e.offset..e.offset + copy]);
            offsets[usize::from(kc)] = next;
            next += if kc == key { needed } else { n };
        }
        debug!(key, needed, pool = size, used = next, "rebuilt symbol pool");
        for kc in min..=max {
            map.key_sym_map[usize::from(kc)].offset = offsets[usize::from(kc)];
        }
        map.syms = syms;
        map.num_syms = next;
        let offset = map.key_sym_map[k].offset;
        Ok(&mut map.syms[offset..offset + needed])
    }

    /// Makes room for `needed` actions on `key` and returns its action window.
    ///
    /// A key that already has actions and at least `needed` symbols keeps its
    /// window.  `needed == 0` removes the key's actions.  Like
    /// [`Keymap::resize_key_symbols`], call this before updating the key's
    /// width.
    ///
    /// # Errors
    ///
    /// - [`KeymapError::InvalidValue`] if `key` is outside the keycode range.
    /// - [`KeymapError::Mismatch`] if no action pool is allocated.
    /// - [`KeymapError::AllocationFailure`] if the pool cannot grow; the
    ///   keymap is unchanged.
    pub fn resize_key_actions(
        &mut self,
        key: Keycode,
        needed: usize,
    ) -> Result<&mut [Action], KeymapError> {
        self.check_key(key)?;
        let (min, max) = (self.min_key_code, self.max_key_code);
        let has_actions = self.key_has_actions(key);
        let num_syms: Vec<usize> = (0..=max).map(|kc| self.key_num_syms(kc)).collect();
        let server = self
            .server
            .as_mut()
            .filter(|s| !s.acts.is_empty() && !s.key_acts.is_empty())
            .ok_or_else(|| KeymapError::Mismatch("no action pool".to_string()))?;
        let k = usize::from(key);

        if needed == 0 {
            server.key_acts[k] = 0;
            return Ok(&mut server.acts[0..0]);
        }
        let start = server.key_acts[k];
        if has_actions && num_syms[k] >= needed && start + needed <= server.num_acts {
            return Ok(&mut server.acts[start..start + needed]);
        }
        let old = if has_actions { num_syms[k].min(needed) } else { 0 };
        if server.acts.len() - server.num_acts >= needed {
            let start = server.num_acts;
            if old > 0 {
                let from = server.key_acts[k];
                server.acts.copy_within(from..from + old, start);
            }
            server.acts[start + old..start + needed].fill(Action::NoAction);
            server.key_acts[k] = start;
            server.num_acts += needed;
            return Ok(&mut server.acts[start..start + needed]);
        }

        let size = server.num_acts + needed + ACTION_POOL_SLACK;
        let mut acts = try_alloc::<Action>(size)?;
        let mut starts = try_alloc::<usize>(server.key_acts.len())?;
        let mut next = 1usize;
        for kc in min..=max {
            let i = usize::from(kc);
            let from = server.key_acts[i];
            if from == 0 && kc != key {
                continue;
            }
            let (count, copy) = if kc == key {
                (needed, old)
            } else {
                (num_syms[i], num_syms[i])
            };
            if copy > 0 {
                acts[next..next + copy].copy_from_slice(&server.acts[from..from + copy]);
            }
            starts[i] = next;
            next += count;
        }
        debug!(key, needed, pool = size, used = next, "rebuilt action pool");
        server.key_acts[usize::from(min)..=usize::from(max)]
            .copy_from_slice(&starts[usize::from(min)..=usize::from(max)]);
        server.acts = acts;
        server.num_acts = next;
        let start = server.key_acts[k];
        Ok(&mut server.acts[start..start + needed])
    }
}
