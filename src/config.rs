//! Configuration for pipeconsole.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.pipeconsole/config.toml`
//! - The keyboard-command table the console forwards to the child
//! - Colors for each kind of console text
//!
//! # Configuration File
//!
//! ```toml
//! show_diagnostics = true
//! input_enabled = true
//! forward_keyboard_commands = true
//! line_ending = "crlf"
//!
//! [[key_mappings]]
//! key = "c"
//! ctrl = true
//! send = "\u0003\r\n"
//!
//! [[key_mappings]]
//! key = "tab"
//! send = "\t"
//!
//! [colors]
//! output = { r = 255, g = 255, b = 255 }
//! error = { r = 255, g = 0, b = 0 }
//! ```
//!
//! Leaving `key_mappings` out gives the built-in Tab and Ctrl+C table.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::console::buffer::ColorTag;
use crate::core::LineEnding;
use crate::ui::keymapper::{Key, KeyMap, KeyMapping, Modifiers};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config: {0}")]
    Write(#[source] std::io::Error),

    #[error("Unknown key name in key mapping: {0:?}")]
    UnknownKey(String),

    #[error("Key mapping for {0} sends nothing")]
    EmptyMapping(String),

    #[error("Could not determine config path")]
    NoConfigPath,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Write "Preparing to run" / "exited." lines into the buffer
    pub show_diagnostics: bool,
    /// Let the user type while a process runs
    pub input_enabled: bool,
    /// Route mapped chords (Ctrl+C, Tab) to the child as raw bytes
    pub forward_keyboard_commands: bool,
    /// Terminator written after each input line
    pub line_ending: LineEnding,
    /// Keyboard-command table; None means the built-in defaults
    pub key_mappings: Option<Vec<KeyMappingEntry>>,
    /// Text colors
    pub colors: ColorConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            show_diagnostics: false,
            input_enabled: true,
            forward_keyboard_commands: false,
            line_ending: LineEnding::default(),
            key_mappings: None,
            colors: ColorConfig::default(),
        }
    }
}

/// One `[[key_mappings]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMappingEntry {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    /// Bytes sent to the child, written as a string
    pub send: String,
}

impl KeyMappingEntry {
    pub fn to_mapping(&self) -> Result<KeyMapping, ConfigError> {
        let key = Key::from_name(&self.key).ok_or_else(|| ConfigError::UnknownKey(self.key.clone()))?;
        if self.send.is_empty() {
            return Err(ConfigError::EmptyMapping(self.key.clone()));
        }

        let mut modifiers = Modifiers::empty();
        modifiers.set(Modifiers::CTRL, self.ctrl);
        modifiers.set(Modifiers::ALT, self.alt);
        modifiers.set(Modifiers::SHIFT, self.shift);

        Ok(KeyMapping::new(modifiers, key, self.send.as_bytes().to_vec()))
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color per text kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub output: Color,
    pub error: Color,
    pub diagnostic: Color,
    pub input: Color,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            output: Color::new(255, 255, 255),
            error: Color::new(255, 0, 0),
            diagnostic: Color::new(0, 255, 0),
            input: Color::new(255, 255, 255),
        }
    }
}

impl ColorConfig {
    pub fn for_tag(&self, tag: ColorTag) -> Color {
        match tag {
            ColorTag::Output => self.output,
            ColorTag::Error => self.error,
            ColorTag::Diagnostic => self.diagnostic,
            ColorTag::Input => self.input,
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from file, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!("no config at {}", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.keymap()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::get_config_path().ok_or(ConfigError::NoConfigPath)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(ConfigError::Write)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).map_err(ConfigError::Write)
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// The keyboard-command table this config describes
    pub fn keymap(&self) -> Result<KeyMap, ConfigError> {
        match &self.key_mappings {
            None => Ok(KeyMap::defaults(self.line_ending)),
            Some(entries) => entries
                .iter()
                .map(KeyMappingEntry::to_mapping)
                .collect::<Result<Vec<_>, _>>()
                .map(KeyMap::new),
        }
    }
}

/// `~/.pipeconsole`
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".pipeconsole"))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
