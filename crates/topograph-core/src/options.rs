//! Editor options.
//!
//! Every field has a default, so a partial JSON object (or none at all)
//! yields a working configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pen::Font;

/// Modifier that must be held for a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum KeyType {
    /// Ctrl, Cmd or Alt.
    #[default]
    CtrlOrAlt,
    /// Ctrl (or Cmd) plus the gesture.
    CtrlOrMeta,
    Shift,
    Alt,
    /// No modifier.
    Any,
}

impl From<i32> for KeyType {
    fn from(value: i32) -> Self {
        match value {
            0 => KeyType::CtrlOrMeta,
            1 => KeyType::Shift,
            2 => KeyType::Alt,
            3 => KeyType::Any,
            _ => KeyType::CtrlOrAlt,
        }
    }
}

impl From<KeyType> for i32 {
    fn from(key: KeyType) -> Self {
        match key {
            KeyType::CtrlOrAlt => -1,
            KeyType::CtrlOrMeta => 0,
            KeyType::Shift => 1,
            KeyType::Alt => 2,
            KeyType::Any => 3,
        }
    }
}

/// Editor options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Undo history depth.
    pub cache_len: usize,
    /// Default stroke colour of pens without one.
    pub color: String,
    pub active_color: String,
    pub hover_color: String,
    pub anchor_color: String,
    pub anchor_radius: f64,
    /// Hit distance around anchors and line ends.
    pub anchor_size: f64,
    pub anchor_fill_style: String,
    pub dock_stroke_style: String,
    pub dock_fill_style: String,
    pub drag_color: String,
    pub font: Font,
    pub hide_input: bool,
    #[serde(rename = "hideRotateCP")]
    pub hide_rotate_cp: bool,
    #[serde(rename = "hideSizeCP")]
    pub hide_size_cp: bool,
    pub hide_anchor: bool,
    pub only_size_x: bool,
    pub only_size_y: bool,
    /// Discard new lines whose end is not bound to an anchor.
    pub disable_empty_line: bool,
    /// Refuse a second line between the same two anchors.
    pub disable_repeat_line: bool,
    pub disable_scale: bool,
    pub disable_translate: bool,
    pub disable_move_out_parent: bool,
    pub disable_dock_line: bool,
    pub disable_keyboard: bool,
    pub disable_touch: bool,
    /// Modifier that turns a drag on empty canvas into a pan.
    pub translate_key: KeyType,
    /// Modifier the wheel needs to zoom.
    pub scale_key: KeyType,
    pub min_scale: f64,
    pub max_scale: f64,
    pub auto_anchor: bool,
    pub view_padding: [f64; 4],
    pub bk_color: Option<String>,
    pub grid_color: String,
    pub grid_size: f64,
    pub rule_color: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache_len: 30,
            color: "#222222".to_string(),
            active_color: "#1890ff".to_string(),
            hover_color: "#fa541c".to_string(),
            anchor_color: "#1890ff".to_string(),
            anchor_radius: 4.0,
            anchor_size: 5.0,
            anchor_fill_style: "#ffffff".to_string(),
            dock_stroke_style: "#fa541c".to_string(),
            dock_fill_style: "#fa541c".to_string(),
            drag_color: "#1890ff".to_string(),
            font: Font::default(),
            hide_input: false,
            hide_rotate_cp: false,
            hide_size_cp: false,
            hide_anchor: false,
            only_size_x: false,
            only_size_y: false,
            disable_empty_line: false,
            disable_repeat_line: false,
            disable_scale: false,
            disable_translate: false,
            disable_move_out_parent: false,
            disable_dock_line: false,
            disable_keyboard: false,
            disable_touch: false,
            translate_key: KeyType::CtrlOrAlt,
            scale_key: KeyType::Any,
            min_scale: 0.25,
            max_scale: 5.0,
            auto_anchor: true,
            view_padding: [0.0; 4],
            bk_color: None,
            grid_color: "#f3f3f3".to_string(),
            grid_size: 10.0,
            rule_color: "#888888".to_string(),
        }
    }
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// `<config dir>/topograph/options.json`, if the platform has one.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("topograph").join("options.json"))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn default_path() -> Option<PathBuf> {
        None
    }

    /// Options from the per-user config file, or defaults when it is
    /// missing or unreadable.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(options) => {
                log::info!("Loaded options from {}", path.display());
                options
            }
            Err(err) => {
                log::warn!("Ignoring options at {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Clamp `scale` to the configured zoom range.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_json_uses_defaults() {
        let options = Options::from_json(r#"{"cacheLen": 5, "hideRotateCP": true, "scaleKey": 0}"#).unwrap();
        assert_eq!(options.cache_len, 5);
        assert!(options.hide_rotate_cp);
        assert_eq!(options.scale_key, KeyType::CtrlOrMeta);
        assert_eq!(options.translate_key, KeyType::CtrlOrAlt);
        assert_eq!(options.anchor_size, 5.0);
        assert!(options.auto_anchor);
        assert_eq!(options.min_scale, 0.25);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, r##"{"color": "#ff0000", "disableKeyboard": true}"##).unwrap();
        let options = Options::load(&path).unwrap();
        assert_eq!(options.color, "#ff0000");
        assert!(options.disable_keyboard);
    }

    #[test]
    fn test_clamp_scale() {
        let options = Options::default();
        assert_eq!(options.clamp_scale(10.0), 5.0);
        assert_eq!(options.clamp_scale(0.1), 0.25);
        assert_eq!(options.clamp_scale(1.5), 1.5);
    }
}
