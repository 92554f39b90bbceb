//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from the platform-appropriate directory.
//! - Writing it back when settings are saved.
//! - Providing defaults when the file does not exist yet (first run).
//!
//! Nothing else in the server touches the file system.

pub mod config;
