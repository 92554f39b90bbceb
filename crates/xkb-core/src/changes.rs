//! Accumulated change record and event cause.
//!
//! Every state-changing operation fills a [`Changes`] record as it goes.
//! Nothing is sent to clients while the operation runs; once it completes,
//! the record is handed to the notification dispatcher in one piece, which
//! emits at most one notification per category present.
//!
//! # Why accumulate? (for beginners)
//!
//! A single key press can change the modifier state, flip an indicator, and
//! (if that indicator drives the keyboard) change the state again.  Sending a
//! notification at every intermediate step would flood clients with events
//! describing states that only existed for a few microseconds.  Collecting
//! the changes first and flushing once keeps the wire traffic minimal.

use serde::{Deserialize, Serialize};

use crate::keymap::{map_parts, Keycode};

/// Opaque identifier of a connected protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Why a change happened.  Attached to outgoing notifications only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCause {
    /// Keycode of the input event, or 0.
    pub keycode: Keycode,
    /// Core event type of the input event, or 0.
    pub event_type: u8,
    /// Request major opcode, or 0.
    pub major: u8,
    /// Request minor opcode, or 0.
    pub minor: u8,
    /// The client whose request caused the change, if any.
    pub client: Option<ClientId>,
}

impl EventCause {
    /// Cause for a change triggered by a key event.
    pub fn key_event(keycode: Keycode, event_type: u8) -> Self {
        Self {
            keycode,
            event_type,
            ..Self::default()
        }
    }

    /// Cause for a change triggered by a client request.
    pub fn request(client: ClientId, major: u8, minor: u8) -> Self {
        Self {
            major,
            minor,
            client: Some(client),
            ..Self::default()
        }
    }

    /// Cause with no known origin other than (optionally) a client.
    pub fn unknown(client: Option<ClientId>) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }
}

// ── Key ranges ────────────────────────────────────────────────────────────────

/// A contiguous range of keycodes, `count == 0` meaning "empty".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub first: Keycode,
    pub count: u8,
}

impl KeyRange {
    /// Last keycode in the range.  Meaningless when the range is empty.
    pub fn last(&self) -> Keycode {
        self.first.saturating_add(self.count.saturating_sub(1))
    }

    /// Widens the range so it includes `key`.
    ///
    /// An empty range becomes `[key, key]`.
    pub fn include(&mut self, key: Keycode) {
        if self.count == 0 {
            self.first = key;
            self.count = 1;
            return;
        }
        let last = self.last();
        if key < self.first {
            self.first = key;
            self.count = last - key + 1;
        } else if key > last {
            self.count = key - self.first + 1;
        }
    }

    /// Widens the range so it includes every key in `[first, last]`.
    pub fn include_span(&mut self, first: Keycode, last: Keycode) {
        if first > last {
            return;
        }
        self.include(first);
        self.include(last);
    }
}

// ── Per-category change records ───────────────────────────────────────────────

/// Changes to the client and server maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapChanges {
    /// [`map_parts`] bits naming which components changed.
    pub changed: u16,
    pub min_key_code: Keycode,
    pub max_key_code: Keycode,
    pub first_type: u8,
    pub num_types: u8,
    pub key_syms: KeyRange,
    pub key_acts: KeyRange,
    pub key_behaviors: KeyRange,
    pub key_explicit: KeyRange,
    pub modmap_keys: KeyRange,
    pub vmodmap_keys: KeyRange,
    /// Virtual modifiers whose bindings changed.
    pub vmods: u16,
}

impl MapChanges {
    /// Marks `part` as changed for every key in `[first, last]`.
    ///
    /// Parts without a key range (types, virtual mods) only get their flag set.
    pub fn note_keys(&mut self, part: u16, first: Keycode, last: Keycode) {
        let range = match part {
            map_parts::KEY_SYMS => &mut self.key_syms,
            map_parts::KEY_ACTIONS => &mut self.key_acts,
            map_parts::KEY_BEHAVIORS => &mut self.key_behaviors,
            map_parts::EXPLICIT_COMPONENTS => &mut self.key_explicit,
            map_parts::MODIFIER_MAP => &mut self.modmap_keys,
            map_parts::VIRTUAL_MOD_MAP => &mut self.vmodmap_keys,
            _ => {
                self.changed |= part;
                return;
            }
        };
        if self.changed & part == 0 {
            *range = KeyRange::default();
        }
        self.changed |= part;
        range.include_span(first, last);
    }

    /// Marks a single key as changed for `part`.
    pub fn note_key(&mut self, part: u16, key: Keycode) {
        self.note_keys(part, key, key);
    }
}

/// Changes to the feature controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlsChanges {
    pub changed_ctrls: u32,
    pub enabled_ctrls_changes: u32,
    pub num_groups_changed: bool,
}

/// Changes to indicator state and maps on the default feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorChanges {
    pub state_changes: u32,
    pub map_changes: u32,
}

/// Changes to the names component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameChanges {
    /// `names` component bits (see [`crate::keymap::names::parts`]).
    pub changed: u16,
    pub first_type: u8,
    pub num_types: u8,
    pub first_level: u8,
    pub num_levels: u8,
    pub num_aliases: u8,
    pub num_radio_groups: u8,
    pub keys: KeyRange,
    pub changed_vmods: u16,
    pub changed_indicators: u32,
    pub changed_groups: u8,
}

/// Changes to the compatibility map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompatChanges {
    pub changed_groups: u8,
    pub first_si: u16,
    pub num_si: u16,
}

/// Change to one feedback device's LEDs, reported to clients that asked for
/// extension-device notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtDeviceChange {
    /// `ext_dev` reason bits.
    pub reason: u16,
    pub led_class: u16,
    pub led_id: u16,
    pub leds_defined: u32,
    pub led_state: u32,
    pub first_button: u8,
    pub num_buttons: u8,
    pub supported: u16,
    pub unsupported: u16,
}

/// Everything an operation changed, gathered for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// `state_parts` bits.
    pub state_changes: u16,
    pub map: MapChanges,
    pub ctrls: ControlsChanges,
    pub indicators: IndicatorChanges,
    pub names: NameChanges,
    pub compat: CompatChanges,
    /// One record per (class, id) feedback touched.
    pub ext_devices: Vec<ExtDeviceChange>,
}

impl Changes {
    /// Returns `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges `change` into the record for the same LED feedback, or appends it.
    ///
    /// Reasons accumulate; the latest LED state and definitions win.
    pub fn note_ext_device(&mut self, change: ExtDeviceChange) {
        match self
            .ext_devices
            .iter_mut()
            .find(|e| e.led_class == change.led_class && e.led_id == change.led_id)
        {
            Some(existing) => {
                existing.reason |= change.reason;
                existing.leds_defined = change.leds_defined;
                existing.led_state = change.led_state;
                existing.supported = change.supported;
                existing.unsupported = change.unsupported;
            }
            None => self.ext_devices.push(change),
        }
    }
}
