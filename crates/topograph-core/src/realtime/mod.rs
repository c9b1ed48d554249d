//! Live data feeds: the diagram's WebSocket and MQTT connections and the
//! routing of their messages to event bindings.

pub mod mqtt;
pub mod props;
pub mod script;
pub mod transport;
pub mod websocket;

use serde_json::Value;

use crate::data::TopologyData;
use crate::error::Result;
use crate::pen::{EventType, Pen, PenEvent};

pub use mqtt::{MqttClient, MqttEvent};
pub use transport::ConnectionState;
pub use websocket::WebSocketClient;

/// Where a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    WebSocket,
    Mqtt { topic: String },
}

impl Channel {
    pub fn event_type(&self) -> EventType {
        match self {
            Channel::WebSocket => EventType::WebSocket,
            Channel::Mqtt { .. } => EventType::Mqtt,
        }
    }
}

/// An inbound message. Text that is not JSON is kept as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: Channel,
    pub payload: Value,
}

impl Message {
    pub fn parse(channel: Channel, text: &str) -> Self {
        let payload = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
        Self { channel, payload }
    }

    pub fn websocket(text: &str) -> Self {
        Self::parse(Channel::WebSocket, text)
    }

    pub fn mqtt(topic: impl Into<String>, text: &str) -> Self {
        Self::parse(Channel::Mqtt { topic: topic.into() }, text)
    }

    /// The part of the message handed to a matching binding, or `None`
    /// when the binding's name filter rejects it.
    ///
    /// A named WebSocket binding wants `{"event": name, "data": ...}` and
    /// receives `data`; an unnamed one receives the whole message. MQTT
    /// bindings need a name contained in the topic.
    pub fn payload_for(&self, event: &PenEvent) -> Option<Value> {
        if event.kind != self.channel.event_type() {
            return None;
        }
        match &self.channel {
            Channel::WebSocket if event.name.is_empty() => Some(self.payload.clone()),
            Channel::WebSocket => {
                let name = self.payload.get("event").and_then(Value::as_str)?;
                (name == event.name).then(|| self.payload.get("data").cloned().unwrap_or(Value::Null))
            }
            Channel::Mqtt { topic } => {
                (!event.name.is_empty() && topic.contains(&event.name)).then(|| self.payload.clone())
            }
        }
    }
}

/// One binding to execute, with the pen that owns it (`None` for
/// diagram-level bindings).
#[derive(Debug, Clone, PartialEq)]
pub struct EventRun {
    pub pen: Option<String>,
    pub event: PenEvent,
    pub payload: Value,
}

/// Every binding a message fires: diagram bindings first, then pen
/// bindings in document order, children included.
pub fn collect_runs(data: &TopologyData, message: &Message) -> Vec<EventRun> {
    let mut runs: Vec<EventRun> = data
        .events
        .iter()
        .filter_map(|event| {
            message.payload_for(event).map(|payload| EventRun {
                pen: None,
                event: event.clone(),
                payload,
            })
        })
        .collect();
    collect_pen_runs(&data.pens, message, &mut runs);
    runs
}

fn collect_pen_runs(pens: &[Pen], message: &Message, runs: &mut Vec<EventRun>) {
    for pen in pens {
        for event in &pen.props().events {
            if let Some(payload) = message.payload_for(event) {
                runs.push(EventRun {
                    pen: Some(pen.id().to_string()),
                    event: event.clone(),
                    payload,
                });
            }
        }
        collect_pen_runs(pen.children(), message, runs);
    }
}

/// The open connections of one diagram.
#[derive(Debug, Default)]
pub struct Connections {
    websocket: Option<WebSocketClient>,
    mqtt: Option<MqttClient>,
}

impl Connections {
    /// Open whatever the document configures, replacing any previous
    /// connections. A failure to open one feed does not prevent the other.
    pub fn open(&mut self, data: &TopologyData) {
        self.close();
        if let Some(url) = data.websocket.as_deref().filter(|u| !u.is_empty()) {
            match WebSocketClient::connect(url) {
                Ok(client) => self.websocket = Some(client),
                Err(e) => log::error!("Failed to open WebSocket {}: {}", url, e),
            }
        }
        if let Some(url) = data.mqtt_url.as_deref().filter(|u| !u.is_empty()) {
            match MqttClient::connect(url, &data.mqtt_options, data.mqtt_topics.as_deref()) {
                Ok(client) => self.mqtt = Some(client),
                Err(e) => log::error!("Failed to open MQTT {}: {}", url, e),
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.websocket.is_some() || self.mqtt.is_some()
    }

    /// Drain both feeds.
    pub fn poll(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(ws) = self.websocket.as_mut() {
            messages.extend(ws.poll().iter().map(|text| Message::websocket(text)));
        }
        if let Some(mqtt) = self.mqtt.as_mut() {
            for event in mqtt.poll() {
                match event {
                    MqttEvent::Message { topic, payload } => {
                        messages.push(Message::mqtt(topic, &String::from_utf8_lossy(&payload)));
                    }
                    MqttEvent::Error { message } => log::error!("MQTT: {}", message),
                    MqttEvent::Connected | MqttEvent::Disconnected => {}
                }
            }
        }
        messages
    }

    pub fn send_websocket(&self, text: &str) -> Result<()> {
        match &self.websocket {
            Some(ws) => ws.send(text),
            None => Err(crate::Error::Realtime("No WebSocket configured".to_string())),
        }
    }

    pub fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        match &self.mqtt {
            Some(mqtt) => mqtt.publish(topic, payload.as_bytes()),
            None => Err(crate::Error::Realtime("No MQTT connection configured".to_string())),
        }
    }

    pub fn websocket_state(&self) -> Option<ConnectionState> {
        self.websocket.as_ref().map(WebSocketClient::state)
    }

    pub fn mqtt_state(&self) -> Option<ConnectionState> {
        self.mqtt.as_ref().map(MqttClient::state)
    }

    /// Tear down both feeds.
    pub fn close(&mut self) {
        if let Some(mut ws) = self.websocket.take() {
            ws.close();
        }
        if let Some(mut mqtt) = self.mqtt.take() {
            mqtt.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::geometry::Rect;
    use crate::pen::{EventAction, Node};

    fn ws_event(name: &str) -> PenEvent {
        PenEvent::new(EventType::WebSocket, EventAction::SetProps, "").with_name(name)
    }

    fn data() -> TopologyData {
        let mut child = Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0));
        child.props.id = "child".into();
        child.props.events.push(ws_event("temp"));
        let mut parent = Node::new("combine", Rect::new(0.0, 0.0, 100.0, 100.0));
        parent.props.id = "parent".into();
        parent.props.events.push(ws_event(""));
        parent.children.push(child.into());
        let mut mqtt = Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0));
        mqtt.props.id = "m".into();
        mqtt.props
            .events
            .push(PenEvent::new(EventType::Mqtt, EventAction::SetProps, "").with_name("sensors/"));

        let mut data = TopologyData::new();
        data.events.push(ws_event("temp"));
        data.events.push(ws_event("other"));
        data.pens = vec![parent.into(), mqtt.into()];
        data
    }

    #[test]
    fn test_non_json_is_kept_as_string() {
        let msg = Message::websocket("not json");
        assert_eq!(msg.payload, json!("not json"));
        assert_eq!(Message::websocket("{\"a\":1}").payload, json!({"a": 1}));
    }

    #[test]
    fn test_websocket_routing() {
        let data = data();
        let msg = Message::websocket(r#"{"event":"temp","data":[{"key":"text","value":"21"}]}"#);
        let runs = collect_runs(&data, &msg);
        let owners: Vec<Option<&str>> = runs.iter().map(|r| r.pen.as_deref()).collect();
        assert_eq!(owners, vec![None, Some("parent"), Some("child")]);
        assert_eq!(runs[0].payload, json!([{"key": "text", "value": "21"}]));
        assert_eq!(runs[1].payload, msg.payload);
    }

    #[test]
    fn test_mqtt_routing_requires_name_in_topic() {
        let data = data();
        let runs = collect_runs(&data, &Message::mqtt("plant/sensors/1", "42"));
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].pen.as_deref(), Some("m"));
        assert_eq!(runs[0].payload, json!(42));
        assert!(collect_runs(&data, &Message::mqtt("plant/alarms", "1")).is_empty());
    }

    #[test]
    fn test_connections_without_config() {
        let mut conns = Connections::default();
        conns.open(&TopologyData::new());
        assert!(!conns.is_open());
        assert!(conns.poll().is_empty());
        assert!(conns.send_websocket("x").is_err());
        assert!(conns.publish("t", "x").is_err());
    }
}
