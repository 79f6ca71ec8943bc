use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    /// Parses names used in config files: `Space`, `Left`, `Q`, `7`, `F3`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if let Some(digit) = ch.to_digit(10) {
                return Some(Self::Digit(digit as u8));
            }
        }
        let function = name.strip_prefix('F').or_else(|| name.strip_prefix('f'))?;
        match function.parse::<u8>() {
            Ok(index @ 1..=24) => Some(Self::Function(index)),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "PageUp" => PageUp,
        "PageDown" => PageDown,
        "Minus" | "-" => Minus,
        "Equal" | "Plus" | "=" => Equal,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Keys that have a name rather than a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    PageUp,
    PageDown,
    Minus,
    Equal,
    LeftShift,
    RightShift,
}

/// Keyboard snapshot written by the window loop and read by the control panel.
///
/// Presses are latched until [`InputState::end_frame`] so that a tap shorter
/// than a frame is still seen once.
#[derive(Debug, Default)]
pub struct InputState {
    held: RwLock<HashSet<KeyCode>>,
    pressed: RwLock<HashSet<KeyCode>>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        if self.held.write().insert(key) {
            self.pressed.write().insert(key);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.held.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.held.read().contains(&key)
    }

    /// True if `key` went down since the last [`InputState::end_frame`].
    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.read().contains(&key)
    }

    pub fn end_frame(&self) {
        self.pressed.write().clear();
    }
}
