//! Binary codec for keyboard notifications.
//!
//! Wire format (every event is exactly 32 bytes):
//! ```text
//! [type:1][xkb_type:1][seq:2][time:4][device:1][payload:23]
//! ```
//! Multi-byte fields use the byte order the receiving client declared when
//! it connected: `'B'` (0x42) for big-endian, `'l'` (0x6C) for
//! little-endian.  Encoding is infallible; decoding validates the length,
//! the event code and the notification kind.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

use crate::protocol::events::{
    AccessXNotify, ActionMessageNotify, BellNotify, CompatMapNotify, ControlsNotify, EventHeader,
    ExtensionDeviceNotify, IndicatorNotify, MapNotify, MappingNotify, MappingRequest,
    NamesNotify, NewKeyboardNotify, StateNotify, XkbEvent, XkbEventType, ACTION_MESSAGE_LENGTH,
    EVENT_SIZE, MAPPING_NOTIFY,
};

/// Errors that can occur while decoding an event.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The byte slice is shorter than one event.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The event code or notification kind is not one this codec knows.
    #[error("unknown event type: {0}")]
    UnknownEventType(u8),

    /// The client declared a byte order other than `'B'` or `'l'`.
    #[error("unsupported byte order: 0x{0:02X}")]
    UnsupportedOrder(u8),
}

/// Byte order of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireOrder {
    Big,
    Little,
}

impl WireOrder {
    /// Byte order of the machine running the server.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            WireOrder::Big
        } else {
            WireOrder::Little
        }
    }

    /// Returns `true` if fields must be swapped for this client.
    pub fn is_swapped(self) -> bool {
        self != Self::native()
    }

    /// The byte a client sends to declare this order.
    pub fn marker(self) -> u8 {
        match self {
            WireOrder::Big => b'B',
            WireOrder::Little => b'l',
        }
    }
}

impl TryFrom<u8> for WireOrder {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            b'B' => Ok(WireOrder::Big),
            b'l' => Ok(WireOrder::Little),
            other => Err(CodecError::UnsupportedOrder(other)),
        }
    }
}

/// One encoded event.
pub type EventBytes = [u8; EVENT_SIZE];

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `event` for a client using `order`.
///
/// `event_base` is the extension's event code and lands in byte 0.
pub fn encode_event(
    header: &EventHeader,
    event: &XkbEvent,
    event_base: u8,
    order: WireOrder,
) -> EventBytes {
    match order {
        WireOrder::Big => encode_with::<BigEndian>(header, event, event_base),
        WireOrder::Little => encode_with::<LittleEndian>(header, event, event_base),
    }
}

/// Decodes one event from the beginning of `bytes`.
///
/// # Errors
///
/// Returns [`CodecError`] if fewer than 32 bytes are available, byte 0 is
/// not `event_base`, or the notification kind is unknown.
pub fn decode_event(
    bytes: &[u8],
    event_base: u8,
    order: WireOrder,
) -> Result<(EventHeader, XkbEvent), CodecError> {
    require_event(bytes)?;
    if bytes[0] != event_base {
        return Err(CodecError::UnknownEventType(bytes[0]));
    }
    let kind =
        XkbEventType::try_from(bytes[1]).map_err(|_| CodecError::UnknownEventType(bytes[1]))?;
    Ok(match order {
        WireOrder::Big => decode_with::<BigEndian>(bytes, kind),
        WireOrder::Little => decode_with::<LittleEndian>(bytes, kind),
    })
}

/// Encodes the legacy "mapping changed" notification.
pub fn encode_mapping_notify(notify: &MappingNotify, order: WireOrder) -> EventBytes {
    let mut buf = [0u8; EVENT_SIZE];
    buf[0] = MAPPING_NOTIFY;
    match order {
        WireOrder::Big => BigEndian::write_u16(&mut buf[2..4], notify.sequence),
        WireOrder::Little => LittleEndian::write_u16(&mut buf[2..4], notify.sequence),
    }
    buf[4] = notify.request as u8;
    if notify.request == MappingRequest::Keyboard {
        buf[5] = notify.first_keycode;
        buf[6] = notify.count;
    }
    buf
}

/// Decodes the legacy "mapping changed" notification.
///
/// # Errors
///
/// Returns [`CodecError`] on a short buffer or a different event code.
pub fn decode_mapping_notify(bytes: &[u8], order: WireOrder) -> Result<MappingNotify, CodecError> {
    require_event(bytes)?;
    if bytes[0] != MAPPING_NOTIFY {
        return Err(CodecError::UnknownEventType(bytes[0]));
    }
    let request =
        MappingRequest::try_from(bytes[4]).map_err(|_| CodecError::UnknownEventType(bytes[4]))?;
    let sequence = match order {
        WireOrder::Big => BigEndian::read_u16(&bytes[2..4]),
        WireOrder::Little => LittleEndian::read_u16(&bytes[2..4]),
    };
    Ok(MappingNotify {
        sequence,
        request,
        first_keycode: bytes[5],
        count: bytes[6],
    })
}

fn require_event(bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.len() < EVENT_SIZE {
        return Err(CodecError::InsufficientData {
            needed: EVENT_SIZE,
            available: bytes.len(),
        });
    }
    Ok(())
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn encode_with<B: ByteOrder>(header: &EventHeader, event: &XkbEvent, event_base: u8) -> EventBytes {
    let mut buf = [0u8; EVENT_SIZE];
    buf[0] = event_base;
    buf[1] = event.event_type() as u8;
    B::write_u16(&mut buf[2..4], header.sequence);
    B::write_u32(&mut buf[4..8], header.time);
    buf[8] = header.device_id;

    match event {
        XkbEvent::NewKeyboard(e) => {
            buf[9] = e.old_device_id;
            buf[10] = e.min_key_code;
            buf[11] = e.max_key_code;
            buf[12] = e.old_min_key_code;
            buf[13] = e.old_max_key_code;
            buf[14] = e.request_major;
            buf[15] = e.request_minor;
            B::write_u16(&mut buf[16..18], e.changed);
        }
        XkbEvent::Map(e) => encode_map::<B>(&mut buf, e),
        XkbEvent::State(e) => encode_state::<B>(&mut buf, e),
        XkbEvent::Controls(e) => {
            buf[9] = e.num_groups;
            B::write_u32(&mut buf[12..16], e.changed_controls);
            B::write_u32(&mut buf[16..20], e.enabled_controls);
            B::write_u32(&mut buf[20..24], e.enabled_control_changes);
            buf[24] = e.keycode;
            buf[25] = e.event_type;
            buf[26] = e.request_major;
            buf[27] = e.request_minor;
        }
        XkbEvent::IndicatorState(e) | XkbEvent::IndicatorMap(e) => {
            B::write_u32(&mut buf[12..16], e.state);
            B::write_u32(&mut buf[16..20], e.changed);
        }
        XkbEvent::Names(e) => encode_names::<B>(&mut buf, e),
        XkbEvent::CompatMap(e) => {
            buf[9] = e.changed_groups;
            B::write_u16(&mut buf[10..12], e.first_si);
            B::write_u16(&mut buf[12..14], e.num_si);
            B::write_u16(&mut buf[14..16], e.num_total_si);
        }
        XkbEvent::Bell(e) => {
            buf[9] = e.bell_class;
            buf[10] = e.bell_id;
            buf[11] = e.percent;
            B::write_u16(&mut buf[12..14], e.pitch);
            B::write_u16(&mut buf[14..16], e.duration);
            B::write_u32(&mut buf[16..20], e.name);
            B::write_u32(&mut buf[20..24], e.window);
            buf[24] = u8::from(e.event_only);
        }
        XkbEvent::ActionMessage(e) => {
            buf[9] = e.keycode;
            buf[10] = u8::from(e.press);
            buf[11] = u8::from(e.key_event_follows);
            buf[12] = e.mods;
            buf[13] = e.group;
            buf[14..14 + ACTION_MESSAGE_LENGTH].copy_from_slice(&e.message);
        }
        XkbEvent::AccessX(e) => {
            buf[9] = e.keycode;
            B::write_u16(&mut buf[10..12], e.detail);
            B::write_u16(&mut buf[12..14], e.slow_keys_delay);
            B::write_u16(&mut buf[14..16], e.debounce_delay);
        }
        XkbEvent::ExtensionDevice(e) => {
            B::write_u16(&mut buf[10..12], e.reason);
            B::write_u16(&mut buf[12..14], e.led_class);
            B::write_u16(&mut buf[14..16], e.led_id);
            B::write_u32(&mut buf[16..20], e.leds_defined);
            B::write_u32(&mut buf[20..24], e.led_state);
            buf[24] = e.first_button;
            buf[25] = e.num_buttons;
            B::write_u16(&mut buf[26..28], e.supported);
            B::write_u16(&mut buf[28..30], e.unsupported);
        }
    }
    buf
}

fn encode_map<B: ByteOrder>(buf: &mut EventBytes, e: &MapNotify) {
    buf[9] = e.ptr_btn_actions;
    B::write_u16(&mut buf[10..12], e.changed);
    buf[12] = e.min_key_code;
    buf[13] = e.max_key_code;
    buf[14] = e.first_type;
    buf[15] = e.num_types;
    buf[16] = e.first_key_sym;
    buf[17] = e.num_key_syms;
    buf[18] = e.first_key_act;
    buf[19] = e.num_key_acts;
    buf[20] = e.first_key_behavior;
    buf[21] = e.num_key_behaviors;
    buf[22] = e.first_key_explicit;
    buf[23] = e.num_key_explicit;
    buf[24] = e.first_modmap_key;
    buf[25] = e.num_modmap_keys;
    buf[26] = e.first_vmodmap_key;
    buf[27] = e.num_vmodmap_keys;
    B::write_u16(&mut buf[28..30], e.virtual_mods);
}

fn encode_state<B: ByteOrder>(buf: &mut EventBytes, e: &StateNotify) {
    buf[9] = e.mods;
    buf[10] = e.base_mods;
    buf[11] = e.latched_mods;
    buf[12] = e.locked_mods;
    buf[13] = e.group;
    B::write_i16(&mut buf[14..16], e.base_group);
    B::write_i16(&mut buf[16..18], e.latched_group);
    buf[18] = e.locked_group;
    buf[19] = e.compat_state;
    buf[20] = e.grab_mods;
    buf[21] = e.compat_grab_mods;
    buf[22] = e.lookup_mods;
    buf[23] = e.compat_lookup_mods;
    B::write_u16(&mut buf[24..26], e.ptr_btn_state);
    B::write_u16(&mut buf[26..28], e.changed);
    buf[28] = e.keycode;
    buf[29] = e.event_type;
    buf[30] = e.request_major;
    buf[31] = e.request_minor;
}

fn encode_names<B: ByteOrder>(buf: &mut EventBytes, e: &NamesNotify) {
    B::write_u16(&mut buf[10..12], e.changed);
    buf[12] = e.first_type;
    buf[13] = e.num_types;
    buf[14] = e.first_level_name;
    buf[15] = e.num_level_names;
    buf[17] = e.num_radio_groups;
    buf[18] = e.num_aliases;
    buf[19] = e.changed_group_names;
    B::write_u16(&mut buf[20..22], e.changed_virtual_mods);
    buf[22] = e.first_key;
    buf[23] = e.num_keys;
    B::write_u32(&mut buf[24..28], e.changed_indicators);
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn decode_with<B: ByteOrder>(buf: &[u8], kind: XkbEventType) -> (EventHeader, XkbEvent) {
    let header = EventHeader {
        sequence: B::read_u16(&buf[2..4]),
        time: B::read_u32(&buf[4..8]),
        device_id: buf[8],
    };
    let event = match kind {
        XkbEventType::NewKeyboard => XkbEvent::NewKeyboard(NewKeyboardNotify {
            old_device_id: buf[9],
            min_key_code: buf[10],
            max_key_code: buf[11],
            old_min_key_code: buf[12],
            old_max_key_code: buf[13],
            request_major: buf[14],
            request_minor: buf[15],
            changed: B::read_u16(&buf[16..18]),
        }),
        XkbEventType::Map => XkbEvent::Map(MapNotify {
            ptr_btn_actions: buf[9],
            changed: B::read_u16(&buf[10..12]),
            min_key_code: buf[12],
            max_key_code: buf[13],
            first_type: buf[14],
            num_types: buf[15],
            first_key_sym: buf[16],
            num_key_syms: buf[17],
            first_key_act: buf[18],
            num_key_acts: buf[19],
            first_key_behavior: buf[20],
            num_key_behaviors: buf[21],
            first_key_explicit: buf[22],
            num_key_explicit: buf[23],
            first_modmap_key: buf[24],
            num_modmap_keys: buf[25],
            first_vmodmap_key: buf[26],
            num_vmodmap_keys: buf[27],
            virtual_mods: B::read_u16(&buf[28..30]),
        }),
        XkbEventType::State => XkbEvent::State(StateNotify {
            mods: buf[9],
            base_mods: buf[10],
            latched_mods: buf[11],
            locked_mods: buf[12],
            group: buf[13],
            base_group: B::read_i16(&buf[14..16]),
            latched_group: B::read_i16(&buf[16..18]),
            locked_group: buf[18],
            compat_state: buf[19],
            grab_mods: buf[20],
            compat_grab_mods: buf[21],
            lookup_mods: buf[22],
            compat_lookup_mods: buf[23],
            ptr_btn_state: B::read_u16(&buf[24..26]),
            changed: B::read_u16(&buf[26..28]),
            keycode: buf[28],
            event_type: buf[29],
            request_major: buf[30],
            request_minor: buf[31],
        }),
        XkbEventType::Controls => XkbEvent::Controls(ControlsNotify {
            num_groups: buf[9],
            changed_controls: B::read_u32(&buf[12..16]),
            enabled_controls: B::read_u32(&buf[16..20]),
            enabled_control_changes: B::read_u32(&buf[20..24]),
            keycode: buf[24],
            event_type: buf[25],
            request_major: buf[26],
            request_minor: buf[27],
        }),
        XkbEventType::IndicatorState | XkbEventType::IndicatorMap => {
            let notify = IndicatorNotify {
                state: B::read_u32(&buf[12..16]),
                changed: B::read_u32(&buf[16..20]),
            };
            if kind == XkbEventType::IndicatorState {
                XkbEvent::IndicatorState(notify)
            } else {
                XkbEvent::IndicatorMap(notify)
            }
        }
        XkbEventType::Names => XkbEvent::Names(NamesNotify {
            changed: B::read_u16(&buf[10..12]),
            first_type: buf[12],
            num_types: buf[13],
            first_level_name: buf[14],
            num_level_names: buf[15],
            num_radio_groups: buf[17],
            num_aliases: buf[18],
            changed_group_names: buf[19],
            changed_virtual_mods: B::read_u16(&buf[20..22]),
            first_key: buf[22],
            num_keys: buf[23],
            changed_indicators: B::read_u32(&buf[24..28]),
        }),
        XkbEventType::CompatMap => XkbEvent::CompatMap(CompatMapNotify {
            changed_groups: buf[9],
            first_si: B::read_u16(&buf[10..12]),
            num_si: B::read_u16(&buf[12..14]),
            num_total_si: B::read_u16(&buf[14..16]),
        }),
        XkbEventType::Bell => XkbEvent::Bell(BellNotify {
            bell_class: buf[9],
            bell_id: buf[10],
            percent: buf[11],
            pitch: B::read_u16(&buf[12..14]),
            duration: B::read_u16(&buf[14..16]),
            name: B::read_u32(&buf[16..20]),
            window: B::read_u32(&buf[20..24]),
            event_only: buf[24] != 0,
        }),
        XkbEventType::ActionMessage => {
            let mut message = [0u8; ACTION_MESSAGE_LENGTH];
            message.copy_from_slice(&buf[14..14 + ACTION_MESSAGE_LENGTH]);
            XkbEvent::ActionMessage(ActionMessageNotify {
                keycode: buf[9],
                press: buf[10] != 0,
                key_event_follows: buf[11] != 0,
                mods: buf[12],
                group: buf[13],
                message,
            })
        }
        XkbEventType::AccessX => XkbEvent::AccessX(AccessXNotify {
            keycode: buf[9],
            detail: B::read_u16(&buf[10..12]),
            slow_keys_delay: B::read_u16(&buf[12..14]),
            debounce_delay: B::read_u16(&buf[14..16]),
        }),
        XkbEventType::ExtensionDevice => XkbEvent::ExtensionDevice(ExtensionDeviceNotify {
            reason: B::read_u16(&buf[10..12]),
            led_class: B::read_u16(&buf[12..14]),
            led_id: B::read_u16(&buf[14..16]),
            leds_defined: B::read_u32(&buf[16..20]),
            led_state: B::read_u32(&buf[20..24]),
            first_button: buf[24],
            num_buttons: buf[25],
            supported: B::read_u16(&buf[26..28]),
            unsupported: B::read_u16(&buf[28..30]),
        }),
    };
    (header, event)
}
