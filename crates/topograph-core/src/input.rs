//! Pointer, keyboard and touch input as the scene receives it.
//!
//! Positions are in canvas pixels. Times are wall-clock milliseconds; use
//! [`now_ms`] when the host has no clock of its own.

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::options::KeyType;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};
#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};

/// Double-click detection constants.
const DOUBLE_CLICK_TIME_MS: f64 = 500.0;
const DOUBLE_CLICK_DISTANCE: f64 = 5.0;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn ctrl_or_meta(&self) -> bool {
        self.ctrl || self.meta
    }

    /// Whether the modifier a gesture requires is held.
    pub fn satisfies(&self, key: KeyType) -> bool {
        match key {
            KeyType::CtrlOrAlt => self.ctrl_or_meta() || self.alt,
            KeyType::CtrlOrMeta => self.ctrl_or_meta(),
            KeyType::Shift => self.shift,
            KeyType::Alt => self.alt,
            KeyType::Any => true,
        }
    }
}

/// One pointer sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerInput {
    pub position: Point,
    pub button: MouseButton,
    /// Whether the host reports any button held. A move with this unset
    /// during a drag ends the drag.
    pub buttons_down: bool,
    pub modifiers: Modifiers,
    pub time_ms: f64,
}

impl PointerInput {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Point::new(x, y),
            ..Default::default()
        }
    }

    pub fn pressed(mut self) -> Self {
        self.buttons_down = true;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn at_time(mut self, time_ms: f64) -> Self {
        self.time_ms = time_ms;
        self
    }
}

/// Keys the scene reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    ArrowLeft,
    ArrowUp,
    ArrowRight,
    ArrowDown,
    Delete,
    Backspace,
    Escape,
    Char(char),
    Other(String),
}

impl Key {
    /// Parse a DOM-style key name (`"ArrowLeft"`, `"Delete"`, `"z"`).
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowLeft" | "Left" => Key::ArrowLeft,
            "ArrowUp" | "Up" => Key::ArrowUp,
            "ArrowRight" | "Right" => Key::ArrowRight,
            "ArrowDown" | "Down" => Key::ArrowDown,
            "Delete" | "Del" => Key::Delete,
            "Backspace" => Key::Backspace,
            "Escape" | "Esc" => Key::Escape,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c.to_ascii_lowercase()),
                    _ => Key::Other(name.to_string()),
                }
            }
        }
    }
}

/// A key press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.modifiers.meta = true;
        self
    }
}

/// Active touch points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TouchInput {
    pub touches: Vec<Point>,
    pub time_ms: f64,
}

/// Detects a second click close in time and space to the first.
#[derive(Debug, Clone, Default)]
pub struct ClickTracker {
    last: Option<(f64, Point)>,
}

impl ClickTracker {
    /// Register a click; true when it completes a double click.
    pub fn click(&mut self, position: Point, time_ms: f64) -> bool {
        if let Some((last_time, last_pos)) = self.last {
            if time_ms - last_time < DOUBLE_CLICK_TIME_MS && position.distance(last_pos) < DOUBLE_CLICK_DISTANCE {
                // Reset to prevent triple-click being detected as another double-click
                self.last = None;
                return true;
            }
        }
        self.last = Some((time_ms, position));
        false
    }
}
