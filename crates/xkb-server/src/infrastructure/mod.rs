//! Infrastructure layer for the keyboard server.
//!
//! Contains the concrete adapters behind the application traits: client
//! event channels, the feedback device, the built-in keymap compiler and
//! configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and `xkb_core`,
//! but MUST NOT be imported by the `application` layer or the core crate.

pub mod clients;
pub mod compiler;
pub mod feedback;
pub mod storage;
