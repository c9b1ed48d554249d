//! A small MQTT 3.1.1 client: connect, subscribe, QoS 0 publish and
//! keep-alive pings, over WebSocket or plain TCP.
//!
//! The packet codec is independent of the transport so it can be tested
//! without a broker.

use crate::data::MqttOptions;
use crate::error::{Error, Result};

use super::transport::{ConnectionState, LinkEvent, Outgoing, Transport};

#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Keep-alive interval announced in CONNECT, in seconds.
const KEEP_ALIVE_SECS: u16 = 60;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

/// An inbound control packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    ConnAck { session_present: bool, code: u8 },
    SubAck { packet_id: u16, codes: Vec<u8> },
    Publish { topic: String, payload: Vec<u8> },
    PingResp,
    /// Any other packet type, by its first byte.
    Other(u8),
}

fn put_remaining_length(out: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

/// Length-prefixed UTF-8 string. MQTT caps these at 65535 bytes.
fn put_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::Realtime(format!("MQTT string of {} bytes exceeds 65535", s.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn packet(header: u8, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.push(header);
    put_remaining_length(&mut out, body.len());
    out.extend(body);
    out
}

/// CONNECT with a clean session.
pub fn connect_packet(options: &MqttOptions, keep_alive: u16) -> Result<Vec<u8>> {
    let mut flags = 0x02;
    if options.username.is_some() {
        flags |= 0x80;
    }
    if options.password.is_some() {
        flags |= 0x40;
    }
    let mut body = Vec::new();
    put_str(&mut body, "MQTT")?;
    body.push(4);
    body.push(flags);
    body.extend_from_slice(&keep_alive.to_be_bytes());
    put_str(&mut body, &options.client_id)?;
    if let Some(username) = &options.username {
        put_str(&mut body, username)?;
    }
    if let Some(password) = &options.password {
        put_str(&mut body, password)?;
    }
    Ok(packet(CONNECT, body))
}

/// SUBSCRIBE at QoS 0.
pub fn subscribe_packet(packet_id: u16, topics: &[&str]) -> Result<Vec<u8>> {
    let mut body = packet_id.to_be_bytes().to_vec();
    for topic in topics {
        put_str(&mut body, topic)?;
        body.push(0);
    }
    Ok(packet(SUBSCRIBE, body))
}

/// PUBLISH at QoS 0.
pub fn publish_packet(topic: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(topic.len() + payload.len() + 2);
    put_str(&mut body, topic)?;
    body.extend_from_slice(payload);
    Ok(packet(PUBLISH, body))
}

pub fn pingreq_packet() -> Vec<u8> {
    vec![PINGREQ, 0]
}

pub fn disconnect_packet() -> Vec<u8> {
    vec![DISCONNECT, 0]
}

/// Splits a byte stream into packets.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: Vec<u8>,
}

impl Decoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete packet, or `None` until more bytes arrive.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        let Some(&header) = self.buf.first() else {
            return Ok(None);
        };
        let mut len = 0usize;
        let mut shift = 0;
        let mut pos = 1;
        loop {
            let Some(&byte) = self.buf.get(pos) else {
                return Ok(None);
            };
            len |= ((byte & 0x7F) as usize) << shift;
            pos += 1;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 21 {
                return Err(Error::Realtime("Malformed MQTT remaining length".to_string()));
            }
        }
        if self.buf.len() < pos + len {
            return Ok(None);
        }
        let body: Vec<u8> = self.buf[pos..pos + len].to_vec();
        self.buf.drain(..pos + len);
        decode(header, &body).map(Some)
    }
}

fn read_u16(body: &[u8], at: usize) -> Result<u16> {
    match body.get(at..at + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(Error::Realtime("Truncated MQTT packet".to_string())),
    }
}

fn decode(header: u8, body: &[u8]) -> Result<Packet> {
    match header & 0xF0 {
        CONNACK => {
            if body.len() < 2 {
                return Err(Error::Realtime("Truncated CONNACK".to_string()));
            }
            Ok(Packet::ConnAck {
                session_present: body[0] & 1 == 1,
                code: body[1],
            })
        }
        SUBACK => Ok(Packet::SubAck {
            packet_id: read_u16(body, 0)?,
            codes: body.get(2..).unwrap_or_default().to_vec(),
        }),
        PUBLISH => {
            let topic_len = read_u16(body, 0)? as usize;
            let topic = body
                .get(2..2 + topic_len)
                .ok_or_else(|| Error::Realtime("Truncated PUBLISH topic".to_string()))?;
            let topic = String::from_utf8_lossy(topic).into_owned();
            let qos = (header >> 1) & 0x03;
            let start = 2 + topic_len + if qos > 0 { 2 } else { 0 };
            Ok(Packet::Publish {
                topic,
                payload: body.get(start..).unwrap_or_default().to_vec(),
            })
        }
        PINGRESP => Ok(Packet::PingResp),
        _ => Ok(Packet::Other(header)),
    }
}

/// Something the client received.
#[derive(Debug, Clone, PartialEq)]
pub enum MqttEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
    Disconnected,
    Error { message: String },
}

/// An MQTT session over one transport. Connection errors end the session;
/// there is no reconnect.
pub struct MqttClient {
    transport: Transport,
    options: MqttOptions,
    topics: Vec<String>,
    decoder: Decoder,
    state: ConnectionState,
    last_ping: Instant,
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("client_id", &self.options.client_id)
            .field("topics", &self.topics)
            .field("state", &self.state)
            .finish()
    }
}

impl MqttClient {
    /// Connect to `ws://`, `wss://`, `mqtt://` or `tcp://` and subscribe to
    /// the comma-separated `topics` once the broker accepts.
    pub fn connect(url: &str, options: &MqttOptions, topics: Option<&str>) -> Result<Self> {
        let transport = if url.starts_with("ws://") || url.starts_with("wss://") {
            Transport::websocket(url, Some("mqtt"))?
        } else if url.starts_with("mqtt://") || url.starts_with("tcp://") {
            Transport::tcp(url)?
        } else {
            return Err(Error::Realtime(format!("Unsupported MQTT URL: {}", url)));
        };
        let mut options = options.clone();
        if options.client_id.is_empty() {
            options.client_id = format!("topograph_{}", crate::pen::new_id());
        }
        let topics = topics
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        log::info!("MQTT connecting to {} as {}", url, options.client_id);
        Ok(Self {
            transport,
            options,
            topics,
            decoder: Decoder::default(),
            state: ConnectionState::Connecting,
            last_ping: Instant::now(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn send(&self, bytes: Vec<u8>) -> Result<()> {
        self.transport.send(Outgoing::Binary(bytes))
    }

    /// Publish at QoS 0.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(Error::Realtime("MQTT not connected".to_string()));
        }
        self.send(publish_packet(topic, payload)?)
    }

    /// Drain transport events, answer the protocol and ping when due.
    pub fn poll(&mut self) -> Vec<MqttEvent> {
        let mut out = Vec::new();
        for event in self.transport.poll() {
            match event {
                LinkEvent::Connected => {
                    let connect = connect_packet(&self.options, KEEP_ALIVE_SECS);
                    if let Err(e) = connect.and_then(|bytes| self.send(bytes)) {
                        log::error!("MQTT connect failed: {}", e);
                    }
                    self.last_ping = Instant::now();
                }
                LinkEvent::Binary(bytes) => {
                    self.decoder.push(&bytes);
                    self.drain_packets(&mut out);
                }
                LinkEvent::Text(text) => {
                    self.decoder.push(text.as_bytes());
                    self.drain_packets(&mut out);
                }
                LinkEvent::Disconnected => {
                    log::info!("MQTT disconnected");
                    self.state = ConnectionState::Disconnected;
                    out.push(MqttEvent::Disconnected);
                }
                LinkEvent::Error { message } => {
                    self.state = ConnectionState::Error;
                    out.push(MqttEvent::Error { message });
                }
            }
        }

        self.keep_alive(&mut out);
        out
    }

    /// Ping at half the keep-alive interval. A failed ping ends the session.
    fn keep_alive(&mut self, out: &mut Vec<MqttEvent>) {
        if self.state != ConnectionState::Connected
            || self.last_ping.elapsed().as_secs() < u64::from(KEEP_ALIVE_SECS / 2)
        {
            return;
        }
        log::trace!("MQTT ping");
        self.last_ping = Instant::now();
        if let Err(e) = self.send(pingreq_packet()) {
            log::warn!("MQTT ping failed: {}", e);
            self.transport.close();
            self.state = ConnectionState::Disconnected;
            out.push(MqttEvent::Disconnected);
        }
    }

    fn drain_packets(&mut self, out: &mut Vec<MqttEvent>) {
        loop {
            match self.decoder.next_packet() {
                Ok(Some(Packet::ConnAck { code: 0, .. })) => {
                    log::info!("MQTT connected");
                    self.state = ConnectionState::Connected;
                    out.push(MqttEvent::Connected);
                    if !self.topics.is_empty() {
                        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
                        if let Err(e) = subscribe_packet(1, &topics).and_then(|bytes| self.send(bytes)) {
                            log::error!("MQTT subscribe failed: {}", e);
                        }
                    }
                }
                Ok(Some(Packet::ConnAck { code, .. })) => {
                    log::error!("MQTT broker refused connection: code {}", code);
                    self.state = ConnectionState::Error;
                    out.push(MqttEvent::Error {
                        message: format!("Connection refused: code {}", code),
                    });
                }
                Ok(Some(Packet::Publish { topic, payload })) => {
                    log::debug!("MQTT message on {}", topic);
                    out.push(MqttEvent::Message { topic, payload });
                }
                Ok(Some(Packet::SubAck { codes, .. })) => {
                    if codes.contains(&0x80) {
                        log::warn!("MQTT broker rejected a subscription");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    log::error!("MQTT decode error: {}", e);
                    self.decoder = Decoder::default();
                    break;
                }
            }
        }
    }

    pub fn close(&mut self) {
        if self.state == ConnectionState::Connected {
            let _ = self.send(disconnect_packet());
        }
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_packet_layout() {
        let options = MqttOptions {
            client_id: "c1".into(),
            username: Some("u".into()),
            password: Some("p".into()),
        };
        let bytes = connect_packet(&options, 60).unwrap();
        assert_eq!(bytes[0], CONNECT);
        assert_eq!(bytes[1] as usize, bytes.len() - 2);
        assert_eq!(&bytes[2..8], b"\x00\x04MQTT");
        assert_eq!(bytes[8], 4);
        assert_eq!(bytes[9], 0xC2);
        assert_eq!(&bytes[10..12], &[0, 60]);
        assert_eq!(&bytes[12..16], b"\x00\x02c1");
        assert_eq!(&bytes[16..19], b"\x00\x01u");
        assert_eq!(&bytes[19..22], b"\x00\x01p");
    }

    #[test]
    fn test_subscribe_packet_lists_topics() {
        let bytes = subscribe_packet(7, &["a/b", "c"]).unwrap();
        assert_eq!(bytes, vec![SUBSCRIBE, 12, 0, 7, 0, 3, b'a', b'/', b'b', 0, 0, 1, b'c', 0]);
    }

    #[test]
    fn test_long_remaining_length() {
        let payload = vec![b'x'; 200];
        let bytes = publish_packet("t", &payload).unwrap();
        // 2 + 1 topic bytes + 200 payload = 203 = 0xCB 0x01
        assert_eq!(&bytes[..3], &[PUBLISH, 0xCB, 0x01]);
        let mut decoder = Decoder::default();
        decoder.push(&bytes);
        assert_eq!(
            decoder.next_packet().unwrap(),
            Some(Packet::Publish {
                topic: "t".into(),
                payload
            })
        );
    }

    #[test]
    fn test_oversized_strings_are_rejected() {
        let topic = "t".repeat(70_000);
        assert!(matches!(publish_packet(&topic, b"x"), Err(Error::Realtime(_))));
        assert!(subscribe_packet(1, &[topic.as_str()]).is_err());
        let options = MqttOptions {
            client_id: topic.clone(),
            ..MqttOptions::default()
        };
        assert!(connect_packet(&options, 60).is_err());
        // A large payload is not a length-prefixed string.
        assert!(publish_packet("t", topic.as_bytes()).is_ok());
    }

    #[test]
    fn test_failed_ping_ends_session() {
        let mut client = MqttClient::connect("tcp://127.0.0.1:1", &MqttOptions::default(), None).unwrap();
        client.transport.close();
        client.state = ConnectionState::Connected;
        client.last_ping = Instant::now()
            .checked_sub(std::time::Duration::from_secs(u64::from(KEEP_ALIVE_SECS)))
            .unwrap();
        assert_eq!(client.poll(), vec![MqttEvent::Disconnected]);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_decoder_waits_for_whole_packets() {
        let mut decoder = Decoder::default();
        let publish = publish_packet("sensors/1", b"{\"v\":1}").unwrap();
        decoder.push(&[CONNACK, 2, 0]);
        assert_eq!(decoder.next_packet().unwrap(), None);
        decoder.push(&[0]);
        decoder.push(&publish[..4]);
        assert_eq!(
            decoder.next_packet().unwrap(),
            Some(Packet::ConnAck {
                session_present: false,
                code: 0
            })
        );
        assert_eq!(decoder.next_packet().unwrap(), None);
        decoder.push(&publish[4..]);
        decoder.push(&[PINGRESP, 0]);
        assert!(matches!(decoder.next_packet().unwrap(), Some(Packet::Publish { topic, .. }) if topic == "sensors/1"));
        assert_eq!(decoder.next_packet().unwrap(), Some(Packet::PingResp));
        assert_eq!(decoder.next_packet().unwrap(), None);
    }

    #[test]
    fn test_qos1_publish_skips_packet_id() {
        let mut decoder = Decoder::default();
        decoder.push(&[PUBLISH | 0x02, 6, 0, 1, b't', 0, 9, b'!']);
        assert_eq!(
            decoder.next_packet().unwrap(),
            Some(Packet::Publish {
                topic: "t".into(),
                payload: b"!".to_vec()
            })
        );
    }

    #[test]
    fn test_suback_and_unknown() {
        let mut decoder = Decoder::default();
        decoder.push(&[SUBACK, 3, 0, 1, 0, 0x40, 0]);
        assert_eq!(
            decoder.next_packet().unwrap(),
            Some(Packet::SubAck {
                packet_id: 1,
                codes: vec![0]
            })
        );
        assert_eq!(decoder.next_packet().unwrap(), Some(Packet::Other(0x40)));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = MqttClient::connect("http://broker", &MqttOptions::default(), None).unwrap_err();
        assert!(matches!(err, Error::Realtime(_)));
    }
}
