//! Scripted event bindings attached to pens and diagrams.

use serde::{Deserialize, Serialize};

use crate::serde_util::lenient;

/// What fires an event binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum EventType {
    #[default]
    Click,
    DblClick,
    WebSocket,
    Mqtt,
}

impl From<u8> for EventType {
    fn from(value: u8) -> Self {
        match value {
            1 => EventType::DblClick,
            2 => EventType::WebSocket,
            3 => EventType::Mqtt,
            _ => EventType::Click,
        }
    }
}

impl From<EventType> for u8 {
    fn from(kind: EventType) -> Self {
        kind as u8
    }
}

/// What an event binding does when fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum EventAction {
    #[default]
    Link,
    StartAnimate,
    Function,
    WindowFn,
    SetProps,
    PauseAnimate,
    StopAnimate,
}

impl From<u8> for EventAction {
    fn from(value: u8) -> Self {
        match value {
            1 => EventAction::StartAnimate,
            2 => EventAction::Function,
            3 => EventAction::WindowFn,
            4 => EventAction::SetProps,
            5 => EventAction::PauseAnimate,
            6 => EventAction::StopAnimate,
            _ => EventAction::Link,
        }
    }
}

impl From<EventAction> for u8 {
    fn from(action: EventAction) -> Self {
        action as u8
    }
}

/// One event binding.
///
/// `value` holds the link url, animation tag, script source or window
/// function name depending on `action`. `name` filters realtime messages:
/// the WebSocket event name or a substring of the MQTT topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenEvent {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: EventType,
    #[serde(default, deserialize_with = "lenient")]
    pub action: EventAction,
    #[serde(default, deserialize_with = "lenient")]
    pub value: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl PenEvent {
    pub fn new(kind: EventType, action: EventAction, value: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_wire_format() {
        let json = r#"{"type": 2, "action": 4, "value": "[]", "name": "temp"}"#;
        let event: PenEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind, EventType::WebSocket);
        assert_eq!(event.action, EventAction::SetProps);
        assert_eq!(event.name, "temp");

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], 2);
        assert_eq!(back["action"], 4);
    }

    #[test]
    fn test_unknown_numbers_fall_back() {
        let event: PenEvent = serde_json::from_str(r#"{"type": 9, "action": "x"}"#).unwrap();
        assert_eq!(event.kind, EventType::Click);
        assert_eq!(event.action, EventAction::Link);
    }
}
