//! Dotted property paths into pens, as used by `SetProps` actions and
//! [`Scene::set_value`](crate::Scene::set_value).
//!
//! Paths use the document's JSON names: `text`, `fillStyle`, `rect.x`,
//! `font.color`, `data.temperature`. Writes go through the serialized
//! form, so a path is valid exactly when the value it names survives a
//! round trip through the pen model.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::pen::Pen;

fn invalid(path: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// The value at `path`, or `None` when the pen has nothing there.
pub fn get_path(pen: &Pen, path: &str) -> Option<Value> {
    let value = serde_json::to_value(pen).ok()?;
    lookup(&value, path).cloned()
}

/// Walk a dotted path through JSON objects and arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').filter(|k| !k.is_empty()).try_fold(value, |node, key| match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Assign `value` at `path`. An object value is merged into an existing
/// object rather than replacing it.
pub fn set_path(pen: &mut Pen, path: &str, value: Value) -> Result<()> {
    let keys: Vec<&str> = path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(invalid(path, "empty segment"));
    }
    if keys[0] == "id" || keys[0] == "children" {
        return Err(invalid(path, "not writable"));
    }

    let mut doc = serde_json::to_value(&*pen)?;
    let slot = slot_mut(&mut doc, &keys).ok_or_else(|| invalid(path, "parent is not an object"))?;
    match (slot.as_object_mut(), value) {
        (Some(existing), Value::Object(patch)) => merge(existing, patch),
        (_, value) => *slot = value,
    }
    let expected = lookup(&doc, path).cloned().unwrap_or(Value::Null);

    let mut updated: Pen = serde_json::from_value(doc)?;
    if updated.is_line() != pen.is_line() {
        return Err(invalid(path, "would change the pen kind"));
    }
    let readback = get_path(&updated, path).unwrap_or(Value::Null);
    if !fits(&expected, &readback) {
        return Err(invalid(path, "unknown field or value of the wrong type"));
    }
    carry_runtime(pen, &mut updated);
    *pen = updated;
    Ok(())
}

/// Slot at `keys`, creating missing objects along the way.
fn slot_mut<'a>(doc: &'a mut Value, keys: &[&str]) -> Option<&'a mut Value> {
    let mut node = doc;
    for key in keys {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i))?,
            _ => return None,
        };
    }
    Some(node)
}

fn merge(into: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        into.insert(key, value);
    }
}

/// Whether the model kept what was written. Numbers compare as floats;
/// objects only need the written keys.
fn fits(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Object(a), Value::Object(b)) => a.iter().all(|(k, v)| b.get(k).is_some_and(|w| fits(v, w))),
        (Value::Array(a), Value::Array(b)) => a.len() == b.len() && a.iter().zip(b).all(|(v, w)| fits(v, w)),
        (Value::Null, _) => true,
        (a, b) => a == b,
    }
}

/// Keep state the document does not carry: animation baselines, media
/// and cached keyframe timing.
fn carry_runtime(old: &Pen, new: &mut Pen) {
    match (old, new) {
        (Pen::Node(old), Pen::Node(new)) => {
            new.animate_ready = old.animate_ready.clone();
            new.animate_duration = old.animate_duration;
            new.media = old.media.clone();
            new.children = old.children.clone();
        }
        (Pen::Line(old), Pen::Line(new)) => {
            new.animate_dot = old.animate_dot.clone();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::geometry::Rect;
    use crate::pen::{Lock, Node};

    fn pen() -> Pen {
        let mut node = Node::new("rectangle", Rect::new(0.0, 0.0, 100.0, 50.0));
        node.props.id = "a".into();
        Pen::Node(node)
    }

    #[test]
    fn test_nested_and_free_form_paths() {
        let mut pen = pen();
        set_path(&mut pen, "rect.width", json!(80)).unwrap();
        set_path(&mut pen, "font.color", json!("#ff0000")).unwrap();
        set_path(&mut pen, "data.sensor.temp", json!(21.5)).unwrap();
        assert_eq!(pen.props().rect.width, 80.0);
        assert_eq!(pen.props().font.color, "#ff0000");
        assert_eq!(get_path(&pen, "data.sensor.temp"), Some(json!(21.5)));
    }

    #[test]
    fn test_optional_fields_are_writable() {
        let mut pen = pen();
        set_path(&mut pen, "text", json!("hello")).unwrap();
        set_path(&mut pen, "locked", json!(2)).unwrap();
        set_path(&mut pen, "visible", json!(false)).unwrap();
        assert_eq!(pen.props().text.as_deref(), Some("hello"));
        assert_eq!(pen.locked(), Lock::NoMove);
        assert!(!pen.visible());
    }

    #[test]
    fn test_object_values_merge() {
        let mut pen = pen();
        set_path(&mut pen, "rect", json!({"x": 5})).unwrap();
        assert_eq!(pen.props().rect, Rect::new(5.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn test_rejects_unknown_and_mistyped() {
        let mut pen = pen();
        assert!(matches!(set_path(&mut pen, "noSuchField", json!(1)), Err(Error::InvalidPath { .. })));
        assert!(matches!(set_path(&mut pen, "lineWidth", json!("wide")), Err(Error::InvalidPath { .. })));
        assert!(matches!(set_path(&mut pen, "id", json!("b")), Err(Error::InvalidPath { .. })));
        assert!(matches!(set_path(&mut pen, "rect..x", json!(1)), Err(Error::InvalidPath { .. })));
        assert_eq!(pen.props().line_width, 1.0);
        assert_eq!(pen.id(), "a");
    }

    #[test]
    fn test_lookup_through_arrays() {
        let value = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(lookup(&value, "a.1.b"), Some(&json!(2)));
        assert_eq!(lookup(&value, "a.5.b"), None);
    }
}
