//! TOML-based configuration persistence for the keyboard server.
//!
//! Reads and writes `ServerConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\XkbServer\config.toml`
//! - Linux:    `~/.config/xkb-server/config.toml`
//! - macOS:    `~/Library/Application Support/XkbServer/config.toml`
//!
//! # What goes in the file? (for beginners)
//!
//! Three sections, all optional:
//!
//! ```toml
//! [server]
//! log_level = "debug"
//! event_base = 85
//!
//! [keyboard]
//! rules = "evdev"
//! layout = "us"
//! repeat_delay = 500
//!
//! [accessx]
//! enabled = true
//! timeout_secs = 300
//! ```
//!
//! The `[keyboard]` component names are handed to the keymap compiler.  If
//! it cannot build a keymap from them the server falls back to its built-in
//! US layout, so a typo here never leaves the keyboard unusable.
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  A missing
//! section falls back to the section's `Default` impl.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xkb_core::keymap::controls::{ax_opts, ctrls, Controls};

use crate::application::load_keymap::KeymapComponents;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub keyboard: KeyboardSection,
    #[serde(default)]
    pub accessx: AccessXSection,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// First event code assigned to the extension.
    #[serde(default = "default_event_base")]
    pub event_base: u8,
    /// Device id of the core keyboard.
    #[serde(default = "default_device_id")]
    pub device_id: u8,
}

/// Keymap component names and repeat timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyboardSection {
    #[serde(default = "default_rules")]
    pub rules: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub options: String,
    /// Milliseconds before a held key starts repeating.
    #[serde(default = "default_repeat_delay")]
    pub repeat_delay: u16,
    /// Milliseconds between repeats.
    #[serde(default = "default_repeat_interval")]
    pub repeat_interval: u16,
}

/// Accessibility feature defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessXSection {
    /// Turns on the AccessX keyboard controls at startup.
    #[serde(default)]
    pub enabled: bool,
    /// Seconds of inactivity before the timeout controls apply.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u16,
    /// Controls switched off when the timeout expires.
    #[serde(default = "default_timeout_mask")]
    pub timeout_mask: u32,
    /// Audible feedback for AccessX events.
    #[serde(default = "default_true")]
    pub feedback: bool,
    /// AccessX option bits.
    #[serde(default = "default_ax_options")]
    pub options: u16,
    /// Volume of feedback tones, in percent.
    #[serde(default = "default_bell_percent")]
    pub bell_percent: u8,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_event_base() -> u8 {
    xkb_core::protocol::DEFAULT_EVENT_BASE
}
fn default_device_id() -> u8 {
    3
}
fn default_rules() -> String {
    "evdev".to_string()
}
fn default_model() -> String {
    "pc105".to_string()
}
fn default_layout() -> String {
    "us".to_string()
}
fn default_repeat_delay() -> u16 {
    xkb_core::keymap::controls::DEFAULT_REPEAT_DELAY
}
fn default_repeat_interval() -> u16 {
    xkb_core::keymap::controls::DEFAULT_REPEAT_INTERVAL
}
fn default_timeout_secs() -> u16 {
    xkb_core::keymap::controls::DEFAULT_AX_TIMEOUT
}
fn default_timeout_mask() -> u32 {
    ctrls::KRG | ctrls::STICKY_KEYS | ctrls::MOUSE_KEYS
}
fn default_true() -> bool {
    true
}
fn default_ax_options() -> u16 {
    ax_opts::ALL & !(ax_opts::INDICATOR_FB | ax_opts::SK_RELEASE_FB | ax_opts::SK_REJECT_FB)
}
fn default_bell_percent() -> u8 {
    50
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            event_base: default_event_base(),
            device_id: default_device_id(),
        }
    }
}

impl Default for KeyboardSection {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            model: default_model(),
            layout: default_layout(),
            variant: String::new(),
            options: String::new(),
            repeat_delay: default_repeat_delay(),
            repeat_interval: default_repeat_interval(),
        }
    }
}

impl Default for AccessXSection {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_timeout_secs(),
            timeout_mask: default_timeout_mask(),
            feedback: default_true(),
            options: default_ax_options(),
            bell_percent: default_bell_percent(),
        }
    }
}

impl ServerConfig {
    /// Component names for the keymap compiler.
    pub fn keymap_components(&self) -> KeymapComponents {
        KeymapComponents {
            rules: self.keyboard.rules.clone(),
            model: self.keyboard.model.clone(),
            layout: self.keyboard.layout.clone(),
            variant: self.keyboard.variant.clone(),
            options: self.keyboard.options.clone(),
        }
    }

    /// Writes the repeat and AccessX settings into a control block.
    pub fn apply_to_controls(&self, controls: &mut Controls) {
        controls.repeat_delay = self.keyboard.repeat_delay;
        controls.repeat_interval = self.keyboard.repeat_interval;
        controls.ax_timeout = self.accessx.timeout_secs;
        controls.axt_ctrls_mask = self.accessx.timeout_mask;
        controls.ax_options = self.accessx.options & ax_opts::ALL;
        let mut set = |bit: u32, on: bool| {
            if on {
                controls.enabled_ctrls |= bit;
            } else {
                controls.enabled_ctrls &= !bit;
            }
        };
        set(ctrls::ACCESSX_KEYS, self.accessx.enabled);
        set(ctrls::ACCESSX_FEEDBACK, self.accessx.feedback);
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `ServerConfig` from the platform config file, returning
/// `ServerConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ServerConfig` from an explicit path.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `XkbServer`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("XkbServer"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("xkb-server"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("XkbServer")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_temp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("xkb_test_{tag}_{}_{nanos}", std::process::id()))
    }

    // ── ServerConfig defaults ─────────────────────────────────────────────────

    #[test]
    fn test_server_config_default_has_expected_server_section() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.server.log_level, "info");
        assert_eq!(cfg.server.event_base, 85);
        assert_eq!(cfg.server.device_id, 3);
    }

    #[test]
    fn test_keyboard_defaults_name_us_layout_and_standard_repeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.keyboard.rules, "evdev");
        assert_eq!(cfg.keyboard.layout, "us");
        assert_eq!(cfg.keyboard.repeat_delay, 660);
        assert_eq!(cfg.keyboard.repeat_interval, 40);
    }

    #[test]
    fn test_accessx_defaults_match_control_defaults() {
        // Arrange
        let cfg = ServerConfig::default();
        let controls = Controls::default();

        // Assert
        assert!(!cfg.accessx.enabled);
        assert_eq!(cfg.accessx.timeout_secs, controls.ax_timeout);
        assert_eq!(cfg.accessx.timeout_mask, controls.axt_ctrls_mask);
        assert_eq!(cfg.accessx.options, controls.ax_options);
        assert_eq!(cfg.accessx.bell_percent, 50);
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_deserialize_partial_keyboard_section_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[keyboard]
layout = "de"
repeat_delay = 250
"#;

        // Act
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.keyboard.layout, "de");
        assert_eq!(cfg.keyboard.repeat_delay, 250);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.keyboard.rules, "evdev");
        assert_eq!(cfg.keyboard.repeat_interval, 40);
        assert_eq!(cfg.server, ServerSection::default());
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<ServerConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_server_config_serializes_and_deserializes_round_trip() {
        // Arrange
        let mut cfg = ServerConfig::default();
        cfg.server.log_level = "debug".to_string();
        cfg.accessx.enabled = true;
        cfg.keyboard.options = "ctrl:nocaps".to_string();

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServerConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    // ── apply_to_controls ─────────────────────────────────────────────────────

    #[test]
    fn test_apply_to_controls_copies_repeat_and_accessx_settings() {
        // Arrange
        let mut cfg = ServerConfig::default();
        cfg.keyboard.repeat_delay = 300;
        cfg.accessx.enabled = true;
        cfg.accessx.feedback = false;
        let mut controls = Controls::default();

        // Act
        cfg.apply_to_controls(&mut controls);

        // Assert
        assert_eq!(controls.repeat_delay, 300);
        assert!(controls.is_enabled(ctrls::ACCESSX_KEYS));
        assert!(!controls.is_enabled(ctrls::ACCESSX_FEEDBACK));
    }

    #[test]
    fn test_keymap_components_follow_keyboard_section() {
        // Arrange
        let mut cfg = ServerConfig::default();
        cfg.keyboard.layout = "de".to_string();
        cfg.keyboard.options = "ctrl:nocaps".to_string();

        // Act
        let components = cfg.keymap_components();

        // Assert
        assert_eq!(components.rules, "evdev");
        assert_eq!(components.layout, "de");
        assert_eq!(components.options, "ctrl:nocaps");
    }

    // ── load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        // Arrange
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        // Act
        let cfg = load_config_from(&path).expect("missing file is not an error");

        // Assert
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = make_temp_dir("roundtrip");
        let path = dir.join("nested").join("config.toml");
        let mut cfg = ServerConfig::default();
        cfg.server.device_id = 7;
        cfg.accessx.timeout_secs = 30;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_from_malformed_file_returns_parse_error() {
        // Arrange
        let dir = make_temp_dir("malformed");
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("config.toml");
        std::fs::write(&path, "[server\nlog_level = ").expect("write");

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir is acceptable in a stripped CI env.
    }
}
