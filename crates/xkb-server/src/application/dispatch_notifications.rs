//! NotificationDispatcher: turns accumulated changes into client events.
//!
//! Every keyboard operation fills a [`Changes`] record.  Once the operation
//! completes, the dispatcher walks the device's [`InterestList`] and writes
//! at most one 32-byte event per category to each client that asked for it,
//! encoded in that client's byte order.
//!
//! # Two kinds of client (for beginners)
//!
//! - **Extension clients** initialised the keyboard extension and selected
//!   the notifications they care about.  They only ever receive the rich
//!   events whose masks they set.
//!
//! - **Legacy clients** never heard of the extension.  When the symbol map
//!   or the modifier map changes they get the old "mapping changed" event
//!   instead, with the keycode range clipped to the range they were told
//!   about when they connected.
//!
//! A client that opted into the extension never also receives the legacy
//! form of the same change.
//!
//! # Failure handling
//!
//! A failed write is logged with `warn!` and delivery continues with the
//! next client.  One stuck client never blocks the others.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::{debug, warn};
use xkb_core::{
    changes::{Changes, ClientId, EventCause, MapChanges},
    keymap::{map_parts, Keycode, Keymap},
    protocol::{
        codec::{encode_event, encode_mapping_notify, EventBytes, WireOrder},
        events::{
            nkn_detail, AccessXNotify, ActionMessageNotify, BellNotify, CompatMapNotify,
            ControlsNotify, EventHeader, ExtensionDeviceNotify, IndicatorNotify, MapNotify,
            MappingNotify, MappingRequest, NamesNotify, NewKeyboardNotify, StateNotify, XkbEvent,
        },
        SequenceCounter,
    },
    KeyboardState,
};

/// Error type for client writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The client's connection is closed.
    #[error("{0} is disconnected")]
    Disconnected(ClientId),
    /// The transport refused the event.
    #[error("write to {client} failed: {reason}")]
    Write { client: ClientId, reason: String },
}

/// Outbound half of a client connection.
///
/// Implementations must not block: the dispatcher runs inside the keyboard
/// device's critical section.
#[cfg_attr(test, automock)]
pub trait ClientConnection: Send + Sync {
    /// Queues one encoded event for the client.
    fn write_event(&self, event: &EventBytes) -> Result<(), DispatchError>;
}

// ── Client registry ───────────────────────────────────────────────────────────

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Connected and processing requests.
    Running,
    /// Disconnected; kept until its resources are released.
    Gone,
}

/// Everything the dispatcher needs to know about one client.
pub struct ClientRecord {
    pub id: ClientId,
    pub state: ClientState,
    /// Byte order the client declared when it connected.
    pub order: WireOrder,
    pub sequence: SequenceCounter,
    /// `true` once the client initialised the keyboard extension.
    pub xkb_initialised: bool,
    /// Keycode range the client was last told about.
    pub min_key_code: Keycode,
    pub max_key_code: Keycode,
    /// `map_parts` bits selected for map notifications.
    pub map_notify_mask: u16,
    /// `nkn_detail` bits selected for new-keyboard notifications.
    pub new_keyboard_notify_mask: u16,
    connection: Arc<dyn ClientConnection>,
}

impl ClientRecord {
    pub fn new(
        id: ClientId,
        order: WireOrder,
        connection: Arc<dyn ClientConnection>,
        min_key_code: Keycode,
        max_key_code: Keycode,
    ) -> Self {
        Self {
            id,
            state: ClientState::Running,
            order,
            sequence: SequenceCounter::new(),
            xkb_initialised: false,
            min_key_code,
            max_key_code,
            map_notify_mask: 0,
            new_keyboard_notify_mask: 0,
            connection,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ClientState::Running
    }

    fn accepts_extension_events(&self) -> bool {
        self.is_running() && self.xkb_initialised
    }

    fn accepts_legacy_events(&self) -> bool {
        self.is_running() && !self.xkb_initialised
    }
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("order", &self.order)
            .field("xkb_initialised", &self.xkb_initialised)
            .finish_non_exhaustive()
    }
}

/// In-memory registry of connected clients.
///
/// Shared between the connection tasks (which bump sequence numbers) and
/// the dispatcher, so it lives behind an `RwLock`.
#[derive(Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client, returning the record it replaced, if any.
    pub fn register(&mut self, record: ClientRecord) -> Option<ClientRecord> {
        self.clients.insert(record.id, record)
    }

    pub fn get(&self, id: ClientId) -> Option<&ClientRecord> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientRecord> {
        self.clients.get_mut(&id)
    }

    /// Marks a client as disconnected.  It stops receiving events at once.
    pub fn mark_gone(&mut self, id: ClientId) {
        if let Some(record) = self.clients.get_mut(&id) {
            record.state = ClientState::Gone;
        }
    }

    pub fn remove(&mut self, id: ClientId) -> Option<ClientRecord> {
        self.clients.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ── Interest list ─────────────────────────────────────────────────────────────

/// One client's notification selection on one keyboard device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInterest {
    pub client: ClientId,
    /// Resource id the selection was made under.
    pub resource: u32,
    pub state_notify_mask: u16,
    pub ctrls_notify_mask: u32,
    pub names_notify_mask: u16,
    pub compat_notify_mask: u8,
    pub bell_notify_mask: u8,
    pub indicator_state_notify_mask: u32,
    pub indicator_map_notify_mask: u32,
    /// Bit `1 << detail` per AccessX detail.
    pub accessx_notify_mask: u16,
    pub action_message_mask: u8,
    pub ext_dev_notify_mask: u16,
    /// Controls the client asked to have reverted when it goes away.
    pub auto_ctrls: u32,
    pub auto_ctrls_values: u32,
}

impl ClientInterest {
    pub fn new(client: ClientId, resource: u32) -> Self {
        Self {
            client,
            resource,
            state_notify_mask: 0,
            ctrls_notify_mask: 0,
            names_notify_mask: 0,
            compat_notify_mask: 0,
            bell_notify_mask: 0,
            indicator_state_notify_mask: 0,
            indicator_map_notify_mask: 0,
            accessx_notify_mask: 0,
            action_message_mask: 0,
            ext_dev_notify_mask: 0,
            auto_ctrls: 0,
            auto_ctrls_values: 0,
        }
    }

    /// Selects every notification on the device.
    pub fn select_all(&mut self) {
        self.state_notify_mask = u16::MAX;
        self.ctrls_notify_mask = u32::MAX;
        self.names_notify_mask = u16::MAX;
        self.compat_notify_mask = u8::MAX;
        self.bell_notify_mask = u8::MAX;
        self.indicator_state_notify_mask = u32::MAX;
        self.indicator_map_notify_mask = u32::MAX;
        self.accessx_notify_mask = u16::MAX;
        self.action_message_mask = u8::MAX;
        self.ext_dev_notify_mask = u16::MAX;
    }
}

/// Per-device list of client selections, newest first.
#[derive(Debug, Default)]
pub struct InterestList {
    interests: Vec<ClientInterest>,
}

impl InterestList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client's selection record, creating it at the head of the
    /// list when the client has none.
    ///
    /// A client holds one record per device: asking again under a different
    /// resource id returns `None`.
    pub fn add_client_resource(
        &mut self,
        client: ClientId,
        resource: u32,
    ) -> Option<&mut ClientInterest> {
        if let Some(pos) = self.interests.iter().position(|i| i.client == client) {
            let existing = &mut self.interests[pos];
            return (existing.resource == resource).then_some(existing);
        }
        self.interests.insert(0, ClientInterest::new(client, resource));
        self.interests.first_mut()
    }

    pub fn find_client_resource(&mut self, client: ClientId) -> Option<&mut ClientInterest> {
        self.interests.iter_mut().find(|i| i.client == client)
    }

    /// Unlinks the record made under `resource` and returns it.
    ///
    /// Reverting its auto-controls is the caller's job.
    pub fn remove_resource_client(&mut self, resource: u32) -> Option<ClientInterest> {
        let pos = self.interests.iter().position(|i| i.resource == resource)?;
        Some(self.interests.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientInterest> {
        self.interests.iter()
    }

    pub fn len(&self) -> usize {
        self.interests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Clips a changed keycode range to what a legacy client knows about.
fn clip_to_client(first: Keycode, num: u16, record: &ClientRecord) -> (Keycode, u8) {
    let first_out = first.max(record.min_key_code);
    let last = i32::from(first) + i32::from(num) - 1;
    let count = if last <= i32::from(record.max_key_code) {
        num
    } else {
        u16::from(record.max_key_code) - u16::from(record.min_key_code) + 1
    };
    (first_out, u8::try_from(count).unwrap_or(u8::MAX))
}

/// Writes keyboard notifications to interested clients.
pub struct NotificationDispatcher {
    clients: Arc<RwLock<ClientRegistry>>,
    event_base: u8,
    device_id: u8,
    epoch: Instant,
}

impl NotificationDispatcher {
    pub fn new(clients: Arc<RwLock<ClientRegistry>>, event_base: u8, device_id: u8) -> Self {
        Self {
            clients,
            event_base,
            device_id,
            epoch: Instant::now(),
        }
    }

    pub fn clients(&self) -> &Arc<RwLock<ClientRegistry>> {
        &self.clients
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Server time in milliseconds.  Wraps like the protocol's timestamp.
    fn now(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn read_clients(&self) -> RwLockReadGuard<'_, ClientRegistry> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_clients(&self) -> RwLockWriteGuard<'_, ClientRegistry> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, record: &ClientRecord, time: u32, event: &XkbEvent) -> bool {
        let header = EventHeader {
            sequence: record.sequence.wire(),
            time,
            device_id: self.device_id,
        };
        let bytes = encode_event(&header, event, self.event_base, record.order);
        match record.connection.write_event(&bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(client = %record.id, kind = ?event.event_type(), "dropping notification: {e}");
                false
            }
        }
    }

    fn write_legacy(&self, record: &ClientRecord, request: MappingRequest, first: Keycode, count: u8) {
        let notify = MappingNotify {
            sequence: record.sequence.wire(),
            request,
            first_keycode: first,
            count,
        };
        let bytes = encode_mapping_notify(&notify, record.order);
        if let Err(e) = record.connection.write_event(&bytes) {
            warn!(client = %record.id, ?request, "dropping legacy mapping notification: {e}");
        }
    }

    /// Writes `event` to every running extension client whose interest
    /// passes `wants`.  Returns how many clients received it.
    fn send_to_interested(
        &self,
        interests: &InterestList,
        event: &XkbEvent,
        wants: impl Fn(&ClientInterest) -> bool,
    ) -> usize {
        let clients = self.read_clients();
        let time = self.now();
        let mut sent = 0;
        for interest in interests.iter().filter(|i| wants(i)) {
            let Some(record) = clients.get(interest.client) else {
                continue;
            };
            if record.accepts_extension_events() && self.write(record, time, event) {
                sent += 1;
            }
        }
        sent
    }

    /// Sends the legacy "mapping changed" events to clients that never
    /// initialised the extension.
    fn send_legacy_map_notify(
        &self,
        clients: &ClientRegistry,
        keymap_changed: bool,
        modmap_changed: bool,
        first: Keycode,
        num: u16,
    ) {
        if !keymap_changed && !modmap_changed {
            return;
        }
        for record in clients.iter().filter(|r| r.accepts_legacy_events()) {
            if keymap_changed {
                let (first_keycode, count) = clip_to_client(first, num, record);
                self.write_legacy(record, MappingRequest::Keyboard, first_keycode, count);
            }
            if modmap_changed {
                self.write_legacy(record, MappingRequest::Modifier, 0, 0);
            }
        }
    }

    // ── Per-category senders ──────────────────────────────────────────────────

    /// Announces a replaced keyboard.
    ///
    /// Extension clients are selected by their new-keyboard mask and learn
    /// the new keycode range; legacy clients get the keyboard and modifier
    /// mapping translations.
    pub fn send_new_keyboard_notify(&self, notify: &NewKeyboardNotify) -> usize {
        let mut clients = self.write_clients();
        let time = self.now();
        let event = XkbEvent::NewKeyboard(*notify);
        let mut sent = 0;
        for record in clients.clients.values_mut() {
            if !record.accepts_extension_events()
                || record.new_keyboard_notify_mask & notify.changed == 0
            {
                continue;
            }
            if self.write(record, time, &event) {
                sent += 1;
            }
            if notify.changed & nkn_detail::KEYCODES != 0 {
                record.min_key_code = notify.min_key_code;
                record.max_key_code = notify.max_key_code;
            }
        }
        let keycodes_changed = notify.changed & nkn_detail::KEYCODES != 0;
        let num = u16::from(notify.max_key_code) - u16::from(notify.min_key_code) + 1;
        self.send_legacy_map_notify(
            &clients,
            keycodes_changed,
            keycodes_changed,
            notify.min_key_code,
            num,
        );
        sent
    }

    /// Sends a map notification, filling the keycode bounds from `keymap`.
    pub fn send_map_notify(&self, changes: &MapChanges, keymap: &Keymap) -> usize {
        let notify = MapNotify::from_changes(changes, keymap);
        let clients = self.read_clients();
        let time = self.now();
        let event = XkbEvent::Map(notify);
        let mut sent = 0;
        for record in clients.iter() {
            if record.accepts_extension_events()
                && record.map_notify_mask & notify.changed != 0
                && self.write(record, time, &event)
            {
                sent += 1;
            }
        }
        self.send_legacy_map_notify(
            &clients,
            notify.changed & map_parts::KEY_SYMS != 0,
            notify.changed & map_parts::MODIFIER_MAP != 0,
            notify.first_key_sym,
            u16::from(notify.num_key_syms),
        );
        sent
    }

    pub fn send_state_notify(&self, interests: &InterestList, notify: &StateNotify) -> usize {
        let changed = notify.changed;
        self.send_to_interested(interests, &XkbEvent::State(*notify), |i| {
            i.state_notify_mask & changed != 0
        })
    }

    pub fn send_controls_notify(&self, interests: &InterestList, notify: &ControlsNotify) -> usize {
        let changed = notify.changed_controls;
        self.send_to_interested(interests, &XkbEvent::Controls(*notify), |i| {
            i.ctrls_notify_mask & changed != 0
        })
    }

    pub fn send_indicator_state_notify(
        &self,
        interests: &InterestList,
        notify: &IndicatorNotify,
    ) -> usize {
        let changed = notify.changed;
        self.send_to_interested(interests, &XkbEvent::IndicatorState(*notify), |i| {
            i.indicator_state_notify_mask & changed != 0
        })
    }

    pub fn send_indicator_map_notify(
        &self,
        interests: &InterestList,
        notify: &IndicatorNotify,
    ) -> usize {
        let changed = notify.changed;
        self.send_to_interested(interests, &XkbEvent::IndicatorMap(*notify), |i| {
            i.indicator_map_notify_mask & changed != 0
        })
    }

    pub fn send_names_notify(&self, interests: &InterestList, notify: &NamesNotify) -> usize {
        let changed = notify.changed;
        self.send_to_interested(interests, &XkbEvent::Names(*notify), |i| {
            i.names_notify_mask & changed != 0
        })
    }

    pub fn send_compat_map_notify(
        &self,
        interests: &InterestList,
        notify: &CompatMapNotify,
    ) -> usize {
        self.send_to_interested(interests, &XkbEvent::CompatMap(*notify), |i| {
            i.compat_notify_mask != 0
        })
    }

    pub fn send_bell_notify(&self, interests: &InterestList, notify: &BellNotify) -> usize {
        self.send_to_interested(interests, &XkbEvent::Bell(*notify), |i| {
            i.bell_notify_mask != 0
        })
    }

    pub fn send_access_x_notify(&self, interests: &InterestList, notify: &AccessXNotify) -> usize {
        let bit = 1u16.checked_shl(u32::from(notify.detail)).unwrap_or(0);
        self.send_to_interested(interests, &XkbEvent::AccessX(*notify), |i| {
            i.accessx_notify_mask & bit != 0
        })
    }

    /// Sends an action message with the current modifiers and group filled in.
    pub fn send_action_message(
        &self,
        interests: &InterestList,
        state: &KeyboardState,
        mut notify: ActionMessageNotify,
    ) -> usize {
        notify.mods = state.mods;
        notify.group = state.group;
        self.send_to_interested(interests, &XkbEvent::ActionMessage(notify), |i| {
            i.action_message_mask != 0
        })
    }

    pub fn send_extension_device_notify(
        &self,
        interests: &InterestList,
        notify: &ExtensionDeviceNotify,
    ) -> usize {
        let reason = notify.reason;
        self.send_to_interested(interests, &XkbEvent::ExtensionDevice(*notify), |i| {
            i.ext_dev_notify_mask & reason != 0
        })
    }

    /// Emits one notification per category present in `changes`, in the
    /// order state, map, controls, indicator map, indicator state, names,
    /// compatibility map.
    ///
    /// `led_state` is the effective state of the default indicator feedback.
    pub fn send_notification(
        &self,
        interests: &InterestList,
        changes: &Changes,
        cause: &EventCause,
        keymap: &Keymap,
        state: &KeyboardState,
        led_state: u32,
    ) {
        debug!(
            state = changes.state_changes,
            map = changes.map.changed,
            ctrls = changes.ctrls.changed_ctrls,
            "sending notifications"
        );
        if changes.state_changes != 0 {
            let notify = StateNotify::new(state, changes.state_changes, cause);
            self.send_state_notify(interests, &notify);
        }
        if changes.map.changed != 0 {
            self.send_map_notify(&changes.map, keymap);
        }
        if changes.ctrls.changed_ctrls != 0 || changes.ctrls.enabled_ctrls_changes != 0 {
            let notify = ControlsNotify::from_changes(&changes.ctrls, &keymap.ctrls, cause);
            self.send_controls_notify(interests, &notify);
        }
        if changes.indicators.map_changes != 0 {
            let notify = IndicatorNotify {
                state: led_state,
                changed: changes.indicators.map_changes,
            };
            self.send_indicator_map_notify(interests, &notify);
        }
        if changes.indicators.state_changes != 0 {
            let notify = IndicatorNotify {
                state: led_state,
                changed: changes.indicators.state_changes,
            };
            self.send_indicator_state_notify(interests, &notify);
        }
        if changes.names.changed != 0 {
            self.send_names_notify(interests, &NamesNotify::from(&changes.names));
        }
        if changes.compat.changed_groups != 0 || changes.compat.num_si > 0 {
            let notify = CompatMapNotify::from_changes(&changes.compat, keymap);
            self.send_compat_map_notify(interests, &notify);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use xkb_core::accessx::detail;
    use xkb_core::changes::KeyRange;
    use xkb_core::indicators::ext_dev;
    use xkb_core::keymap::controls::ctrls;
    use xkb_core::protocol::codec::{decode_event, decode_mapping_notify};
    use xkb_core::protocol::events::{XkbEventType, DEFAULT_EVENT_BASE, MAPPING_NOTIFY};
    use xkb_core::state::state_parts;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingConnection {
        events: Mutex<Vec<EventBytes>>,
    }

    impl RecordingConnection {
        fn kinds(&self) -> Vec<u8> {
            self.events.lock().unwrap().iter().map(|e| e[1]).collect()
        }

        fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    impl ClientConnection for RecordingConnection {
        fn write_event(&self, event: &EventBytes) -> Result<(), DispatchError> {
            self.events.lock().unwrap().push(*event);
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: NotificationDispatcher,
        interests: InterestList,
    }

    impl Fixture {
        fn new() -> Self {
            let clients = Arc::new(RwLock::new(ClientRegistry::new()));
            Self {
                dispatcher: NotificationDispatcher::new(clients, DEFAULT_EVENT_BASE, 3),
                interests: InterestList::new(),
            }
        }

        /// Registers an extension client with the given byte order.
        fn add_xkb_client(&mut self, id: u32, order: WireOrder) -> Arc<RecordingConnection> {
            let conn = Arc::new(RecordingConnection::default());
            let mut record = ClientRecord::new(ClientId(id), order, conn.clone(), 8, 255);
            record.xkb_initialised = true;
            self.dispatcher.write_clients().register(record);
            self.interests.add_client_resource(ClientId(id), id * 100);
            conn
        }

        fn add_legacy_client(&mut self, id: u32, min: u8, max: u8) -> Arc<RecordingConnection> {
            let conn = Arc::new(RecordingConnection::default());
            let record = ClientRecord::new(ClientId(id), WireOrder::native(), conn.clone(), min, max);
            self.dispatcher.write_clients().register(record);
            conn
        }

        fn interest(&mut self, id: u32) -> &mut ClientInterest {
            self.interests
                .find_client_resource(ClientId(id))
                .expect("interest exists")
        }
    }

    fn make_keymap() -> Keymap {
        let mut atoms = xkb_core::keymap::AtomTable::new();
        xkb_core::keymap::default::default_keymap(&mut atoms).expect("built-in keymap")
    }

    // ── Interest list ─────────────────────────────────────────────────────────

    #[test]
    fn test_add_client_resource_prepends_new_interest() {
        // Arrange
        let mut list = InterestList::new();

        // Act
        list.add_client_resource(ClientId(1), 10);
        list.add_client_resource(ClientId(2), 20);

        // Assert
        let order: Vec<_> = list.iter().map(|i| i.client).collect();
        assert_eq!(order, vec![ClientId(2), ClientId(1)]);
    }

    #[test]
    fn test_add_client_resource_same_id_returns_existing_record() {
        // Arrange
        let mut list = InterestList::new();
        list.add_client_resource(ClientId(1), 10)
            .expect("new record")
            .state_notify_mask = 0x7;

        // Act
        let again = list.add_client_resource(ClientId(1), 10).expect("existing record");

        // Assert
        assert_eq!(again.state_notify_mask, 0x7);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_add_client_resource_different_id_returns_none() {
        let mut list = InterestList::new();
        list.add_client_resource(ClientId(1), 10);
        assert!(list.add_client_resource(ClientId(1), 11).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_resource_client_returns_removed_record() {
        // Arrange
        let mut list = InterestList::new();
        list.add_client_resource(ClientId(1), 10);
        list.add_client_resource(ClientId(2), 20)
            .expect("new record")
            .auto_ctrls = ctrls::STICKY_KEYS;

        // Act
        let removed = list.remove_resource_client(20).expect("record removed");

        // Assert
        assert_eq!(removed.client, ClientId(2));
        assert_eq!(removed.auto_ctrls, ctrls::STICKY_KEYS);
        assert!(list.find_client_resource(ClientId(2)).is_none());
        assert!(list.remove_resource_client(20).is_none());
    }

    // ── Filtering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_state_change_reaches_only_state_subscribers() {
        // Arrange
        let mut fx = Fixture::new();
        let state_client = fx.add_xkb_client(1, WireOrder::native());
        let ctrl_client = fx.add_xkb_client(2, WireOrder::native());
        fx.interest(1).state_notify_mask = state_parts::MODIFIER_LOCK;
        fx.interest(2).ctrls_notify_mask = u32::MAX;
        let keymap = make_keymap();
        let changes = Changes {
            state_changes: state_parts::MODIFIER_LOCK | state_parts::MODIFIER_STATE,
            ..Changes::default()
        };

        // Act
        fx.dispatcher.send_notification(
            &fx.interests,
            &changes,
            &EventCause::default(),
            &keymap,
            &KeyboardState::new(),
            0,
        );

        // Assert
        assert_eq!(state_client.kinds(), vec![XkbEventType::State as u8]);
        assert_eq!(ctrl_client.count(), 0, "controls-only client must get nothing");
    }

    #[test]
    fn test_state_mask_must_intersect_changed_bits() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).state_notify_mask = state_parts::GROUP_STATE;
        let notify = StateNotify {
            changed: state_parts::MODIFIER_BASE,
            ..StateNotify::default()
        };

        // Act
        let sent = fx.dispatcher.send_state_notify(&fx.interests, &notify);

        // Assert
        assert_eq!(sent, 0);
        assert_eq!(conn.count(), 0);
    }

    #[test]
    fn test_gone_client_receives_nothing() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).bell_notify_mask = 1;
        fx.dispatcher.write_clients().mark_gone(ClientId(1));

        // Act
        let sent = fx
            .dispatcher
            .send_bell_notify(&fx.interests, &BellNotify::default());

        // Assert
        assert_eq!(sent, 0);
        assert_eq!(conn.count(), 0);
    }

    #[test]
    fn test_access_x_notify_filters_by_detail_bit() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).accessx_notify_mask = 1 << detail::SK_REJECT;

        // Act
        let rejected = AccessXNotify {
            detail: detail::SK_REJECT,
            ..AccessXNotify::default()
        };
        let accepted = AccessXNotify {
            detail: detail::SK_ACCEPT,
            ..AccessXNotify::default()
        };
        fx.dispatcher.send_access_x_notify(&fx.interests, &rejected);
        fx.dispatcher.send_access_x_notify(&fx.interests, &accepted);

        // Assert
        assert_eq!(conn.count(), 1);
    }

    #[test]
    fn test_extension_device_notify_filters_by_reason() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).ext_dev_notify_mask = ext_dev::INDICATOR_STATE;

        // Act
        let names = ExtensionDeviceNotify {
            reason: ext_dev::INDICATOR_NAMES,
            ..ExtensionDeviceNotify::default()
        };
        let state = ExtensionDeviceNotify {
            reason: ext_dev::INDICATOR_STATE,
            led_state: 0b101,
            ..ExtensionDeviceNotify::default()
        };
        fx.dispatcher.send_extension_device_notify(&fx.interests, &names);
        fx.dispatcher.send_extension_device_notify(&fx.interests, &state);

        // Assert
        assert_eq!(conn.kinds(), vec![XkbEventType::ExtensionDevice as u8]);
    }

    #[test]
    fn test_action_message_carries_current_mods_and_group() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).action_message_mask = 1;
        let state = KeyboardState {
            mods: 0x05,
            group: 1,
            ..KeyboardState::new()
        };

        // Act
        fx.dispatcher
            .send_action_message(&fx.interests, &state, ActionMessageNotify::default());

        // Assert
        let bytes = conn.events.lock().unwrap()[0];
        let (_, event) =
            decode_event(&bytes, DEFAULT_EVENT_BASE, WireOrder::native()).expect("decodes");
        match event {
            XkbEvent::ActionMessage(msg) => {
                assert_eq!(msg.mods, 0x05);
                assert_eq!(msg.group, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    #[test]
    fn test_each_client_receives_its_own_byte_order_and_sequence() {
        // Arrange
        let mut fx = Fixture::new();
        let big = fx.add_xkb_client(1, WireOrder::Big);
        let little = fx.add_xkb_client(2, WireOrder::Little);
        fx.interest(1).ctrls_notify_mask = u32::MAX;
        fx.interest(2).ctrls_notify_mask = u32::MAX;
        {
            let clients = fx.dispatcher.read_clients();
            clients.get(ClientId(1)).unwrap().sequence.next();
            for _ in 0..3 {
                clients.get(ClientId(2)).unwrap().sequence.next();
            }
        }
        let notify = ControlsNotify {
            changed_controls: ctrls::CONTROLS_ENABLED,
            enabled_controls: 0x0208,
            ..ControlsNotify::default()
        };

        // Act
        fx.dispatcher.send_controls_notify(&fx.interests, &notify);

        // Assert
        let big_bytes = big.events.lock().unwrap()[0];
        let little_bytes = little.events.lock().unwrap()[0];
        let (h1, e1) = decode_event(&big_bytes, DEFAULT_EVENT_BASE, WireOrder::Big).unwrap();
        let (h2, e2) = decode_event(&little_bytes, DEFAULT_EVENT_BASE, WireOrder::Little).unwrap();
        assert_eq!(h1.sequence, 1);
        assert_eq!(h2.sequence, 3);
        assert_eq!(h1.device_id, 3);
        assert_eq!(e1, XkbEvent::Controls(notify));
        assert_eq!(e2, XkbEvent::Controls(notify));
        assert_eq!(big_bytes[2..4], [0, 1], "big-endian sequence");
        assert_eq!(little_bytes[2..4], [3, 0], "little-endian sequence");
    }

    #[test]
    fn test_failed_write_does_not_stop_delivery_to_others() {
        // Arrange
        let mut fx = Fixture::new();
        let mut failing = MockClientConnection::new();
        failing
            .expect_write_event()
            .times(1)
            .returning(|_| Err(DispatchError::Disconnected(ClientId(9))));
        let mut record =
            ClientRecord::new(ClientId(9), WireOrder::native(), Arc::new(failing), 8, 255);
        record.xkb_initialised = true;
        fx.dispatcher.write_clients().register(record);
        fx.interests.add_client_resource(ClientId(9), 900);
        fx.interest(9).names_notify_mask = u16::MAX;
        let healthy = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).names_notify_mask = u16::MAX;
        let notify = NamesNotify {
            changed: 0x1,
            ..NamesNotify::default()
        };

        // Act
        let sent = fx.dispatcher.send_names_notify(&fx.interests, &notify);

        // Assert
        assert_eq!(sent, 1);
        assert_eq!(healthy.count(), 1);
    }

    // ── Map and legacy translation ────────────────────────────────────────────

    #[test]
    fn test_key_sym_change_sends_clipped_legacy_notify_to_legacy_clients_only() {
        // Arrange
        let mut fx = Fixture::new();
        let xkb = fx.add_xkb_client(1, WireOrder::native());
        fx.dispatcher
            .write_clients()
            .get_mut(ClientId(1))
            .unwrap()
            .map_notify_mask = map_parts::KEY_SYMS;
        let legacy = fx.add_legacy_client(2, 10, 20);
        let keymap = make_keymap();
        let mut changes = MapChanges::default();
        changes.note_keys(map_parts::KEY_SYMS, 15, 24);

        // Act
        fx.dispatcher.send_map_notify(&changes, &keymap);

        // Assert – the extension client gets only the rich event
        assert_eq!(xkb.kinds(), vec![XkbEventType::Map as u8]);
        let bytes = legacy.events.lock().unwrap()[0];
        assert_eq!(bytes[0], MAPPING_NOTIFY);
        let mapping = decode_mapping_notify(&bytes, WireOrder::native()).unwrap();
        assert_eq!(mapping.request, MappingRequest::Keyboard);
        assert_eq!(mapping.first_keycode, 15);
        assert_eq!(mapping.count, 11, "range past the client's max reports its whole range");
        assert_eq!(legacy.count(), 1);
    }

    #[test]
    fn test_legacy_notify_raises_first_keycode_to_client_minimum() {
        // Arrange
        let mut fx = Fixture::new();
        let legacy = fx.add_legacy_client(2, 10, 20);
        let keymap = make_keymap();
        let changes = MapChanges {
            changed: map_parts::KEY_SYMS | map_parts::MODIFIER_MAP,
            key_syms: KeyRange { first: 8, count: 5 },
            ..MapChanges::default()
        };

        // Act
        fx.dispatcher.send_map_notify(&changes, &keymap);

        // Assert
        let events = legacy.events.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        let keyboard = decode_mapping_notify(&events[0], WireOrder::native()).unwrap();
        let modifier = decode_mapping_notify(&events[1], WireOrder::native()).unwrap();
        assert_eq!((keyboard.first_keycode, keyboard.count), (10, 5));
        assert_eq!(modifier.request, MappingRequest::Modifier);
    }

    #[test]
    fn test_new_keyboard_updates_range_and_translates_for_legacy_clients() {
        // Arrange
        let mut fx = Fixture::new();
        let xkb = fx.add_xkb_client(1, WireOrder::native());
        fx.dispatcher
            .write_clients()
            .get_mut(ClientId(1))
            .unwrap()
            .new_keyboard_notify_mask = nkn_detail::KEYCODES;
        let legacy = fx.add_legacy_client(2, 8, 255);
        let notify = NewKeyboardNotify {
            min_key_code: 9,
            max_key_code: 200,
            old_min_key_code: 8,
            old_max_key_code: 255,
            changed: nkn_detail::KEYCODES,
            ..NewKeyboardNotify::default()
        };

        // Act
        let sent = fx.dispatcher.send_new_keyboard_notify(&notify);

        // Assert
        assert_eq!(sent, 1);
        assert_eq!(xkb.kinds(), vec![XkbEventType::NewKeyboard as u8]);
        let clients = fx.dispatcher.read_clients();
        let record = clients.get(ClientId(1)).unwrap();
        assert_eq!((record.min_key_code, record.max_key_code), (9, 200));
        let events = legacy.events.lock().unwrap().clone();
        assert_eq!(events.len(), 2, "keyboard and modifier translations");
        let keyboard = decode_mapping_notify(&events[0], WireOrder::native()).unwrap();
        assert_eq!((keyboard.first_keycode, keyboard.count), (9, 192));
    }

    // ── send_notification ─────────────────────────────────────────────────────

    #[test]
    fn test_send_notification_emits_categories_in_fixed_order() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).select_all();
        let keymap = make_keymap();
        let mut changes = Changes {
            state_changes: state_parts::MODIFIER_LOCK,
            ..Changes::default()
        };
        changes.ctrls.changed_ctrls = ctrls::SLOW_KEYS;
        changes.indicators.state_changes = 0b1;
        changes.indicators.map_changes = 0b10;
        changes.names.changed = 0x4;
        changes.compat.num_si = 2;

        // Act
        fx.dispatcher.send_notification(
            &fx.interests,
            &changes,
            &EventCause::default(),
            &keymap,
            &KeyboardState::new(),
            0b1,
        );

        // Assert
        assert_eq!(
            conn.kinds(),
            vec![
                XkbEventType::State as u8,
                XkbEventType::Controls as u8,
                XkbEventType::IndicatorMap as u8,
                XkbEventType::IndicatorState as u8,
                XkbEventType::Names as u8,
                XkbEventType::CompatMap as u8,
            ]
        );
    }

    #[test]
    fn test_empty_changes_send_nothing() {
        // Arrange
        let mut fx = Fixture::new();
        let conn = fx.add_xkb_client(1, WireOrder::native());
        fx.interest(1).select_all();

        // Act
        fx.dispatcher.send_notification(
            &fx.interests,
            &Changes::default(),
            &EventCause::default(),
            &make_keymap(),
            &KeyboardState::new(),
            0,
        );

        // Assert
        assert_eq!(conn.count(), 0);
    }
}
