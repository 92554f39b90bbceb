//! # xkb-core
//!
//! Keyboard engine for the XKB server: keymap storage, keyboard state
//! derivation, indicators, AccessX feedback tables and the wire format of
//! keyboard notifications.
//!
//! This crate is pure logic.  It has no dependencies on OS APIs, timers or
//! sockets; the `xkb-server` crate wires it to clients and feedback devices.
//!
//! # Architecture overview (for beginners)
//!
//! A keyboard produces keycodes.  What those keycodes *mean* depends on the
//! keymap and on the current modifier and group state:
//!
//! - **`keymap`** – The keymap store.  Per-key symbols and actions live in
//!   two shared pools indexed by offset, so resizing one key may relocate
//!   others.  Also holds key types, controls, names, the compatibility map
//!   and indicator maps.
//!
//! - **`state`** – Base, latched and locked modifiers and groups, and the
//!   effective, lookup, grab and compatibility views derived from them.
//!
//! - **`indicators`** – LEDs.  Each indicator's automatic state follows its
//!   map; clients can set an explicit state on top; some indicators drive
//!   the keyboard back.
//!
//! - **`accessx`** – Beep sequences and the pure parts of accessibility
//!   feature transitions.
//!
//! - **`changes`** – The record every operation fills before clients are
//!   notified.
//!
//! - **`protocol`** – Typed notifications and their 32-byte wire encoding.

pub mod accessx;
pub mod changes;
pub mod indicators;
pub mod keymap;
pub mod protocol;
pub mod state;

// Re-export the most-used types at the crate root so callers can write
// `xkb_core::Keymap` instead of `xkb_core::keymap::Keymap`.
pub use accessx::FeedbackSituation;
pub use changes::{Changes, ClientId, EventCause};
pub use indicators::{LedId, LedInfo, LedRegistry};
pub use keymap::{Keymap, KeymapError};
pub use protocol::codec::{decode_event, encode_event, CodecError, WireOrder};
pub use protocol::events::XkbEvent;
pub use state::KeyboardState;
