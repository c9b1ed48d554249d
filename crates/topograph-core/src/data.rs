//! The persisted diagram document.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::pen::{Line, Lock, Node, Pen, PenEvent, new_id};
use crate::registry::ShapeRegistry;
use crate::serde_util::{is_false, lenient, lenient_opt};

/// MQTT connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttOptions {
    #[serde(default = "new_id", deserialize_with = "lenient_client_id")]
    pub client_id: String,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            client_id: new_id(),
            username: None,
            password: None,
        }
    }
}

fn lenient_client_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.is_empty() => s,
        _ => new_id(),
    })
}

/// Older editors stored the options as a JSON string.
fn mqtt_options<'de, D>(deserializer: D) -> std::result::Result<MqttOptions, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let value = match value {
        serde_json::Value::String(s) => serde_json::from_str(&s).unwrap_or_default(),
        other => other,
    };
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn default_line_name() -> String {
    "curve".to_string()
}

fn default_to_arrow() -> String {
    "triangleSolid".to_string()
}

fn default_scale() -> f64 {
    1.0
}

fn lenient_scale<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|s| *s > 0.0).unwrap_or(1.0))
}

/// A diagram: its pens plus document-wide defaults and realtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawData")]
pub struct TopologyData {
    pub pens: Vec<Pen>,
    /// Route used for newly drawn lines.
    pub line_name: String,
    pub from_arrow: String,
    pub to_arrow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    pub scale: f64,
    #[serde(skip_serializing_if = "Lock::is_none")]
    pub locked: Lock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bk_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bk_color: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub grid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<f64>,
    #[serde(skip_serializing_if = "is_false")]
    pub rule: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_url: Option<String>,
    pub mqtt_options: MqttOptions,
    /// Comma-separated topic list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_topics: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<PenEvent>,
    #[serde(skip_serializing_if = "is_false")]
    pub manual_cps: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Default for TopologyData {
    fn default() -> Self {
        RawData {
            scale: default_scale(),
            ..Default::default()
        }
        .into()
    }
}

/// Wire form, accepting the legacy `nodes` + `lines` layout.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawData {
    #[serde(default, deserialize_with = "lenient_pens")]
    pens: Vec<Pen>,
    #[serde(default, deserialize_with = "lenient_pens")]
    nodes: Vec<Pen>,
    #[serde(default, deserialize_with = "lenient_pens")]
    lines: Vec<Pen>,
    #[serde(default, deserialize_with = "lenient")]
    line_name: String,
    #[serde(default, deserialize_with = "lenient")]
    from_arrow: String,
    #[serde(default, deserialize_with = "lenient_opt")]
    to_arrow: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt")]
    line_width: Option<f64>,
    #[serde(default = "default_scale", deserialize_with = "lenient_scale")]
    scale: f64,
    #[serde(default, deserialize_with = "lenient")]
    locked: Lock,
    #[serde(default, deserialize_with = "lenient_opt")]
    bk_image: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt")]
    bk_color: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    grid: bool,
    #[serde(default, deserialize_with = "lenient_opt")]
    grid_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt")]
    grid_size: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    rule: bool,
    #[serde(default, deserialize_with = "lenient_opt")]
    rule_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt")]
    websocket: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt")]
    mqtt_url: Option<String>,
    #[serde(default, deserialize_with = "mqtt_options")]
    mqtt_options: MqttOptions,
    #[serde(default, deserialize_with = "lenient_opt")]
    mqtt_topics: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    events: Vec<PenEvent>,
    #[serde(default, deserialize_with = "lenient")]
    manual_cps: bool,
    #[serde(default)]
    tooltip: Option<serde_json::Value>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Pens that fail to parse are dropped with a warning; the rest load.
fn lenient_pens<'de, D>(deserializer: D) -> std::result::Result<Vec<Pen>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Pen>(item) {
            Ok(pen) => Some(pen),
            Err(err) => {
                log::warn!("Skipping unreadable pen: {}", err);
                None
            }
        })
        .collect())
}

impl From<RawData> for TopologyData {
    fn from(raw: RawData) -> Self {
        let mut pens = raw.pens;
        if pens.is_empty() {
            pens.extend(raw.nodes);
            pens.extend(raw.lines);
        }
        Self {
            pens,
            line_name: if raw.line_name.is_empty() { default_line_name() } else { raw.line_name },
            from_arrow: raw.from_arrow,
            to_arrow: raw.to_arrow.unwrap_or_else(default_to_arrow),
            line_width: raw.line_width,
            scale: raw.scale,
            locked: raw.locked,
            bk_image: raw.bk_image,
            bk_color: raw.bk_color,
            grid: raw.grid,
            grid_color: raw.grid_color,
            grid_size: raw.grid_size,
            rule: raw.rule,
            rule_color: raw.rule_color,
            websocket: raw.websocket,
            mqtt_url: raw.mqtt_url,
            mqtt_options: raw.mqtt_options,
            mqtt_topics: raw.mqtt_topics,
            events: raw.events,
            manual_cps: raw.manual_cps,
            tooltip: raw.tooltip,
            data: raw.data,
        }
    }
}

impl TopologyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a diagram file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let data = Self::from_json(&json)?;
        log::info!("Loaded {} pens from {}", data.pens.len(), path.display());
        Ok(data)
    }

    /// Write the pure document to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.pure_data())?)?;
        log::info!("Saved {} pens to {}", self.pens.len(), path.display());
        Ok(())
    }

    /// Convert legacy placements, then lay out every pen from the registry.
    pub fn init(&mut self, registry: &ShapeRegistry) {
        for pen in self.pens.iter_mut() {
            if let Pen::Node(node) = pen {
                node.normalize_legacy();
            }
            pen.init(registry);
        }
    }

    /// The document as JSON with runtime state and null fields removed.
    pub fn pure_data(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        strip_nulls(&mut value);
        value
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.pens.iter().filter_map(Pen::as_node)
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.pens.iter().filter_map(Pen::as_line)
    }
}

fn strip_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let data = TopologyData::from_json("{}").unwrap();
        assert_eq!(data.line_name, "curve");
        assert_eq!(data.from_arrow, "");
        assert_eq!(data.to_arrow, "triangleSolid");
        assert_eq!(data.scale, 1.0);
        assert_eq!(data.mqtt_options.client_id.len(), 8);
        assert!(data.pens.is_empty());
    }

    #[test]
    fn test_legacy_nodes_and_lines() {
        let json = r#"{
            "nodes": [{"id": "a", "name": "rectangle", "rect": {"x": 0, "y": 0, "width": 10, "height": 10}}],
            "lines": [{"id": "l", "name": "line", "from": {"x": 0, "y": 0, "id": "a"}, "to": {"x": 5, "y": 5}}]
        }"#;
        let data = TopologyData::from_json(json).unwrap();
        assert_eq!(data.pens.len(), 2);
        assert_eq!(data.nodes().count(), 1);
        assert_eq!(data.lines().next().unwrap().from.id.as_deref(), Some("a"));
    }

    #[test]
    fn test_mqtt_options_as_string() {
        let json = r#"{"mqttOptions": "{\"clientId\": \"c1\", \"username\": \"u\"}"}"#;
        let data = TopologyData::from_json(json).unwrap();
        assert_eq!(data.mqtt_options.client_id, "c1");
        assert_eq!(data.mqtt_options.username.as_deref(), Some("u"));
    }

    #[test]
    fn test_bad_pen_is_skipped() {
        let json = r#"{"pens": [{"id": "a", "name": "rectangle"}, 42, {"id": "b", "name": "circle"}], "scale": "big"}"#;
        let data = TopologyData::from_json(json).unwrap();
        let ids: Vec<&str> = data.pens.iter().map(Pen::id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(data.scale, 1.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("diagram.json");
        let mut data = TopologyData::new();
        data.pens.push(Node::new("rectangle", crate::geometry::Rect::new(1.0, 2.0, 3.0, 4.0)).into());
        data.websocket = Some("ws://localhost:1234".into());
        data.save(&path).unwrap();

        let loaded = TopologyData::load(&path).unwrap();
        assert_eq!(loaded.pens.len(), 1);
        assert_eq!(loaded.pens[0].id(), data.pens[0].id());
        assert_eq!(loaded.websocket, data.websocket);
        assert_eq!(loaded.mqtt_options, data.mqtt_options);
    }

    #[test]
    fn test_pure_data_has_no_nulls() {
        let mut data = TopologyData::new();
        data.pens.push(Node::new("rectangle", crate::geometry::Rect::new(0.0, 0.0, 1.0, 1.0)).into());
        let value = data.pure_data();
        let text = value.to_string();
        assert!(!text.contains("null"));
        assert!(value.get("pens").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(TopologyData::load(dir.path().join("nope.json")), Err(crate::Error::Io(_))));
    }
}
