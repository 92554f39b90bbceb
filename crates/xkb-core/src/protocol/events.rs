//! Typed keyboard notifications.
//!
//! Every notification travels as a fixed 32-byte event.  The first byte is
//! the extension's event code, the second the notification kind
//! ([`XkbEventType`]), followed by the client's request sequence number, a
//! millisecond timestamp and the device id.  The remaining bytes are
//! specific to each kind; [`super::codec`] lays them out.

use serde::{Deserialize, Serialize};

use crate::changes::{
    CompatChanges, ControlsChanges, EventCause, ExtDeviceChange, MapChanges, NameChanges,
};
use crate::keymap::controls::ctrls;
use crate::keymap::{map_parts, Controls, Keycode, Keymap};
use crate::state::KeyboardState;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of every event on the wire.
pub const EVENT_SIZE: usize = 32;

/// Core event code of the legacy "mapping changed" notification.
pub const MAPPING_NOTIFY: u8 = 34;

/// Default extension event code.
pub const DEFAULT_EVENT_BASE: u8 = 85;

/// Length of an action message payload.
pub const ACTION_MESSAGE_LENGTH: usize = 8;

/// Notification kinds, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum XkbEventType {
    NewKeyboard = 0,
    Map = 1,
    State = 2,
    Controls = 3,
    IndicatorState = 4,
    IndicatorMap = 5,
    Names = 6,
    CompatMap = 7,
    Bell = 8,
    ActionMessage = 9,
    AccessX = 10,
    ExtensionDevice = 11,
}

impl XkbEventType {
    /// Bit used in a client's event selection mask.
    pub fn mask_bit(self) -> u16 {
        1 << (self as u8)
    }
}

impl TryFrom<u8> for XkbEventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(XkbEventType::NewKeyboard),
            1 => Ok(XkbEventType::Map),
            2 => Ok(XkbEventType::State),
            3 => Ok(XkbEventType::Controls),
            4 => Ok(XkbEventType::IndicatorState),
            5 => Ok(XkbEventType::IndicatorMap),
            6 => Ok(XkbEventType::Names),
            7 => Ok(XkbEventType::CompatMap),
            8 => Ok(XkbEventType::Bell),
            9 => Ok(XkbEventType::ActionMessage),
            10 => Ok(XkbEventType::AccessX),
            11 => Ok(XkbEventType::ExtensionDevice),
            _ => Err(()),
        }
    }
}

/// Fields common to every notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Last request sequence number of the receiving client.
    pub sequence: u16,
    /// Server time in milliseconds.
    pub time: u32,
    pub device_id: u8,
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// `detail` bits of a new-keyboard notification.
pub mod nkn_detail {
    pub const KEYCODES: u16 = 1 << 0;
    pub const GEOMETRY: u16 = 1 << 1;
    pub const DEVICE_ID: u16 = 1 << 2;
    pub const ALL: u16 = 0x07;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKeyboardNotify {
    pub old_device_id: u8,
    pub min_key_code: Keycode,
    pub max_key_code: Keycode,
    pub old_min_key_code: Keycode,
    pub old_max_key_code: Keycode,
    pub request_major: u8,
    pub request_minor: u8,
    /// [`nkn_detail`] bits.
    pub changed: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapNotify {
    pub ptr_btn_actions: u8,
    /// [`map_parts`] bits.
    pub changed: u16,
    pub min_key_code: Keycode,
    pub max_key_code: Keycode,
    pub first_type: u8,
    pub num_types: u8,
    pub first_key_sym: Keycode,
    pub num_key_syms: u8,
    pub first_key_act: Keycode,
    pub num_key_acts: u8,
    pub first_key_behavior: Keycode,
    pub num_key_behaviors: u8,
    pub first_key_explicit: Keycode,
    pub num_key_explicit: u8,
    pub first_modmap_key: Keycode,
    pub num_modmap_keys: u8,
    pub first_vmodmap_key: Keycode,
    pub num_vmodmap_keys: u8,
    pub virtual_mods: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNotify {
    pub mods: u8,
    pub base_mods: u8,
    pub latched_mods: u8,
    pub locked_mods: u8,
    pub group: u8,
    pub base_group: i16,
    pub latched_group: i16,
    pub locked_group: u8,
    pub compat_state: u8,
    pub grab_mods: u8,
    pub compat_grab_mods: u8,
    pub lookup_mods: u8,
    pub compat_lookup_mods: u8,
    pub ptr_btn_state: u16,
    /// `state_parts` bits.
    pub changed: u16,
    pub keycode: Keycode,
    pub event_type: u8,
    pub request_major: u8,
    pub request_minor: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlsNotify {
    pub num_groups: u8,
    pub changed_controls: u32,
    pub enabled_controls: u32,
    pub enabled_control_changes: u32,
    pub keycode: Keycode,
    pub event_type: u8,
    pub request_major: u8,
    pub request_minor: u8,
}

/// Payload of both indicator notification kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorNotify {
    /// Effective state of the default feedback.
    pub state: u32,
    pub changed: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamesNotify {
    /// `names::parts` bits.
    pub changed: u16,
    pub first_type: u8,
    pub num_types: u8,
    pub first_level_name: u8,
    pub num_level_names: u8,
    pub num_radio_groups: u8,
    pub num_aliases: u8,
    pub changed_group_names: u8,
    pub changed_virtual_mods: u16,
    pub first_key: Keycode,
    pub num_keys: u8,
    pub changed_indicators: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatMapNotify {
    pub changed_groups: u8,
    pub first_si: u16,
    pub num_si: u16,
    pub num_total_si: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BellNotify {
    pub bell_class: u8,
    pub bell_id: u8,
    pub percent: u8,
    pub pitch: u16,
    pub duration: u16,
    pub name: u32,
    pub window: u32,
    pub event_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessageNotify {
    pub keycode: Keycode,
    pub press: bool,
    pub key_event_follows: bool,
    pub mods: u8,
    pub group: u8,
    pub message: [u8; ACTION_MESSAGE_LENGTH],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessXNotify {
    pub keycode: Keycode,
    /// `accessx::detail` value.
    pub detail: u16,
    pub slow_keys_delay: u16,
    pub debounce_delay: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDeviceNotify {
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

/// A keyboard notification of any kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XkbEvent {
    NewKeyboard(NewKeyboardNotify),
    Map(MapNotify),
    State(StateNotify),
    Controls(ControlsNotify),
    IndicatorState(IndicatorNotify),
    IndicatorMap(IndicatorNotify),
    Names(NamesNotify),
    CompatMap(CompatMapNotify),
    Bell(BellNotify),
    ActionMessage(ActionMessageNotify),
    AccessX(AccessXNotify),
    ExtensionDevice(ExtensionDeviceNotify),
}

impl XkbEvent {
    pub fn event_type(&self) -> XkbEventType {
        match self {
            XkbEvent::NewKeyboard(_) => XkbEventType::NewKeyboard,
            XkbEvent::Map(_) => XkbEventType::Map,
            XkbEvent::State(_) => XkbEventType::State,
            XkbEvent::Controls(_) => XkbEventType::Controls,
            XkbEvent::IndicatorState(_) => XkbEventType::IndicatorState,
            XkbEvent::IndicatorMap(_) => XkbEventType::IndicatorMap,
            XkbEvent::Names(_) => XkbEventType::Names,
            XkbEvent::CompatMap(_) => XkbEventType::CompatMap,
            XkbEvent::Bell(_) => XkbEventType::Bell,
            XkbEvent::ActionMessage(_) => XkbEventType::ActionMessage,
            XkbEvent::AccessX(_) => XkbEventType::AccessX,
            XkbEvent::ExtensionDevice(_) => XkbEventType::ExtensionDevice,
        }
    }
}

// ── Legacy notification ───────────────────────────────────────────────────────

/// Which legacy mapping changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MappingRequest {
    Modifier = 0,
    Keyboard = 1,
    Pointer = 2,
}

impl TryFrom<u8> for MappingRequest {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(MappingRequest::Modifier),
            1 => Ok(MappingRequest::Keyboard),
            2 => Ok(MappingRequest::Pointer),
            _ => Err(()),
        }
    }
}

/// The legacy "mapping changed" notification sent to clients that never
/// initialised the keyboard extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingNotify {
    pub sequence: u16,
    pub request: MappingRequest,
    /// Only meaningful for [`MappingRequest::Keyboard`].
    pub first_keycode: Keycode,
    pub count: u8,
}

// ── Builders ──────────────────────────────────────────────────────────────────

impl MapNotify {
    /// Builds a map notification from accumulated map changes.
    pub fn from_changes(changes: &MapChanges, keymap: &Keymap) -> Self {
        let range = |part: u16, r: crate::changes::KeyRange| {
            if changes.changed & part != 0 {
                (r.first, r.count)
            } else {
                (0, 0)
            }
        };
        let (first_key_sym, num_key_syms) = range(map_parts::KEY_SYMS, changes.key_syms);
        let (first_key_act, num_key_acts) = range(map_parts::KEY_ACTIONS, changes.key_acts);
        let (first_key_behavior, num_key_behaviors) =
            range(map_parts::KEY_BEHAVIORS, changes.key_behaviors);
        let (first_key_explicit, num_key_explicit) =
            range(map_parts::EXPLICIT_COMPONENTS, changes.key_explicit);
        let (first_modmap_key, num_modmap_keys) =
            range(map_parts::MODIFIER_MAP, changes.modmap_keys);
        let (first_vmodmap_key, num_vmodmap_keys) =
            range(map_parts::VIRTUAL_MOD_MAP, changes.vmodmap_keys);
        Self {
            ptr_btn_actions: 0,
            changed: changes.changed,
            min_key_code: keymap.min_key_code,
            max_key_code: keymap.max_key_code,
            first_type: changes.first_type,
            num_types: changes.num_types,
            first_key_sym,
            num_key_syms,
            first_key_act,
            num_key_acts,
            first_key_behavior,
            num_key_behaviors,
            first_key_explicit,
            num_key_explicit,
            first_modmap_key,
            num_modmap_keys,
            first_vmodmap_key,
            num_vmodmap_keys,
            virtual_mods: changes.vmods,
        }
    }
}

impl StateNotify {
    /// Snapshot of `state` with the change mask and cause filled in.
    pub fn new(state: &KeyboardState, changed: u16, cause: &EventCause) -> Self {
        Self {
            mods: state.mods,
            base_mods: state.base_mods,
            latched_mods: state.latched_mods,
            locked_mods: state.locked_mods,
            group: state.group,
            base_group: state.base_group,
            latched_group: state.latched_group,
            locked_group: state.locked_group,
            compat_state: state.compat_state,
            grab_mods: state.grab_mods,
            compat_grab_mods: state.compat_grab_mods,
            lookup_mods: state.lookup_mods,
            compat_lookup_mods: state.compat_lookup_mods,
            ptr_btn_state: state.ptr_buttons,
            changed,
            keycode: cause.keycode,
            event_type: cause.event_type,
            request_major: cause.major,
            request_minor: cause.minor,
        }
    }
}

impl ControlsNotify {
    pub fn from_changes(changes: &ControlsChanges, controls: &Controls, cause: &EventCause) -> Self {
        Self {
            num_groups: controls.num_groups,
            changed_controls: changes.changed_ctrls,
            enabled_controls: controls.enabled_ctrls & ctrls::ALL_BOOLEAN,
            enabled_control_changes: changes.enabled_ctrls_changes,
            keycode: cause.keycode,
            event_type: cause.event_type,
            request_major: cause.major,
            request_minor: cause.minor,
        }
    }
}

impl From<&NameChanges> for NamesNotify {
    fn from(changes: &NameChanges) -> Self {
        Self {
            changed: changes.changed,
            first_type: changes.first_type,
            num_types: changes.num_types,
            first_level_name: changes.first_level,
            num_level_names: changes.num_levels,
            num_radio_groups: changes.num_radio_groups,
            num_aliases: changes.num_aliases,
            changed_group_names: changes.changed_groups,
            changed_virtual_mods: changes.changed_vmods,
            first_key: changes.keys.first,
            num_keys: changes.keys.count,
            changed_indicators: changes.changed_indicators,
        }
    }
}

impl CompatMapNotify {
    pub fn from_changes(changes: &CompatChanges, keymap: &Keymap) -> Self {
        let total = keymap.compat.as_ref().map_or(0, |c| c.sym_interpret.len());
        Self {
            changed_groups: changes.changed_groups,
            first_si: changes.first_si,
            num_si: changes.num_si,
            num_total_si: u16::try_from(total).unwrap_or(u16::MAX),
        }
    }
}

impl From<&ExtDeviceChange> for ExtensionDeviceNotify {
    fn from(change: &ExtDeviceChange) -> Self {
        Self {
            reason: change.reason,
            led_class: change.led_class,
            led_id: change.led_id,
            leds_defined: change.leds_defined,
            led_state: change.led_state,
            first_button: change.first_button,
            num_buttons: change.num_buttons,
            supported: change.supported,
            unsupported: change.unsupported,
        }
    }
}
