//! Key model and keyboard-command mapping
//!
//! Keys reach the console as [`KeyInput`]. A [`KeyMap`] turns selected chords into raw
//! bytes for the child (Ctrl+C → ETX and so on) when keyboard-command forwarding is on.

use std::fmt;

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::LineEnding;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Keys the console knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Tab,
    Esc,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

impl Key {
    /// Parse a key name as written in the config file
    pub fn from_name(name: &str) -> Option<Key> {
        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "enter" | "return" => Key::Enter,
            "backspace" | "back" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Esc,
            "left" => Key::Left,
            "right" => Key::Right,
            "up" => Key::Up,
            "down" => Key::Down,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            "space" => Key::Char(' '),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Key::Char(ch),
                    (Some('f'), Some(_)) => {
                        let n: u8 = other[1..].parse().ok()?;
                        if !(1..=24).contains(&n) {
                            return None;
                        }
                        Key::F(n)
                    }
                    _ => return None,
                }
            }
        };
        Some(key)
    }

    pub fn is_arrow(self) -> bool {
        matches!(self, Key::Left | Key::Right | Key::Up | Key::Down)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(' ') => f.write_str("space"),
            Key::Char(c) => write!(f, "{}", c),
            Key::F(n) => write!(f, "f{}", n),
            other => {
                let name = match other {
                    Key::Enter => "enter",
                    Key::Backspace => "backspace",
                    Key::Delete => "delete",
                    Key::Tab => "tab",
                    Key::Esc => "esc",
                    Key::Left => "left",
                    Key::Right => "right",
                    Key::Up => "up",
                    Key::Down => "down",
                    Key::Home => "home",
                    Key::End => "end",
                    Key::PageUp => "pageup",
                    _ => "pagedown",
                };
                f.write_str(name)
            }
        }
    }
}

/// A key press with its modifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub const fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub const fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::empty())
    }

    pub const fn ctrl(ch: char) -> Self {
        Self::new(Key::Char(ch), Modifiers::CTRL)
    }

    /// Ctrl+C, which stays usable (copy) everywhere in the buffer
    pub fn is_copy(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
            && matches!(self.key, Key::Char('c') | Key::Char('C'))
    }

    /// Printable character that should be typed into the buffer
    pub fn typed_char(&self) -> Option<char> {
        match self.key {
            Key::Char(ch) if !self.modifiers.intersects(Modifiers::CTRL | Modifiers::ALT) => Some(ch),
            _ => None,
        }
    }

    /// Convert a crossterm key event. Keys we have no model for map to None.
    pub fn from_crossterm(event: &KeyEvent) -> Option<Self> {
        let mut modifiers = Modifiers::from(event.modifiers);
        let key = match event.code {
            KeyCode::Char(ch) => {
                // Shift is already folded into the character
                if ch.is_alphabetic() || !ch.is_ascii() || ch.is_ascii_punctuation() || ch == ' ' {
                    modifiers.remove(Modifiers::SHIFT);
                }
                Key::Char(ch)
            }
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Delete => Key::Delete,
            KeyCode::Tab => Key::Tab,
            KeyCode::BackTab => {
                modifiers |= Modifiers::SHIFT;
                Key::Tab
            }
            KeyCode::Esc => Key::Esc,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::F(n) => Key::F(n),
            _ => return None,
        };
        Some(Self { key, modifiers })
    }
}

/// One keyboard command: a chord and the bytes it sends to the child
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMapping {
    pub modifiers: Modifiers,
    pub key: Key,
    pub send: Vec<u8>,
}

impl KeyMapping {
    pub fn new(modifiers: Modifiers, key: Key, send: impl Into<Vec<u8>>) -> Self {
        Self {
            modifiers,
            key,
            send: send.into(),
        }
    }

    /// Exact modifier match; letters compare case-insensitively
    pub fn matches(&self, input: &KeyInput) -> bool {
        if self.modifiers != input.modifiers {
            return false;
        }
        match (self.key, input.key) {
            (Key::Char(a), Key::Char(b)) => a.to_lowercase().eq(b.to_lowercase()),
            (a, b) => a == b,
        }
    }
}

/// Ordered keyboard-command table. First match wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyMap {
    mappings: Vec<KeyMapping>,
}

impl KeyMap {
    pub fn new(mappings: Vec<KeyMapping>) -> Self {
        Self { mappings }
    }

    /// Tab and Ctrl+C, the chords a line-oriented child usually cares about
    pub fn defaults(line_ending: LineEnding) -> Self {
        let mut interrupt = vec![0x03];
        interrupt.extend_from_slice(line_ending.as_str().as_bytes());
        Self::new(vec![
            KeyMapping::new(Modifiers::empty(), Key::Tab, b"\t".to_vec()),
            KeyMapping::new(Modifiers::CTRL, Key::Char('c'), interrupt),
        ])
    }

    pub fn lookup(&self, input: &KeyInput) -> Option<&KeyMapping> {
        self.mappings.iter().find(|m| m.matches(input))
    }

    pub fn mappings(&self) -> &[KeyMapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
