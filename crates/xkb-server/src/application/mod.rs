//! Application layer of the keyboard server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The core crate knows how keymaps, state and indicators behave but has no
//! idea who is listening.  This layer connects the two:
//!
//! - It **orchestrates** core types to carry out one keyboard operation from
//!   start to finish (change state, re-evaluate indicators, notify).
//! - It **depends on abstractions** (`ClientConnection`, `FeedbackDevice`,
//!   `KeymapCompiler`) so the infrastructure can be swapped in tests.
//! - It **contains no OS calls, no sockets and no file access**.
//!
//! # Sub-modules
//!
//! - **`keyboard_device`** – The per-keyboard aggregate.  Every state,
//!   control, indicator and keymap change goes through it.
//!
//! - **`dispatch_notifications`** – Client registry, per-device interest
//!   lists and the dispatcher that encodes and writes notifications.
//!
//! - **`accessx_feedback`** – Timer-driven beep sequences for AccessX cues.
//!
//! - **`load_keymap`** – Compiles the startup keymap, falling back to the
//!   built-in one on failure.

pub mod accessx_feedback;
pub mod dispatch_notifications;
pub mod keyboard_device;
pub mod load_keymap;
