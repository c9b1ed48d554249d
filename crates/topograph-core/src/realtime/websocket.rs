//! Diagram WebSocket feed.

use crate::error::Result;

use super::transport::{ConnectionState, LinkEvent, Outgoing, Transport};

/// A text WebSocket that reopens as soon as it closes or fails.
pub struct WebSocketClient {
    url: String,
    transport: Option<Transport>,
    reconnects: u32,
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("reconnects", &self.reconnects)
            .finish()
    }
}

impl WebSocketClient {
    pub fn connect(url: &str) -> Result<Self> {
        let transport = Transport::websocket(url, None)?;
        log::info!("WebSocket connecting to {}", url);
        Ok(Self {
            url: url.to_string(),
            transport: Some(transport),
            reconnects: 0,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.as_ref().map_or(ConnectionState::Disconnected, Transport::state)
    }

    /// How often the socket has been reopened.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn send(&self, text: &str) -> Result<()> {
        match &self.transport {
            Some(transport) => transport.send(Outgoing::Text(text.to_string())),
            None => Err(crate::Error::Realtime("WebSocket closed".to_string())),
        }
    }

    /// Received text frames. Binary frames are passed on as lossy UTF-8.
    pub fn poll(&mut self) -> Vec<String> {
        let Some(transport) = self.transport.as_mut() else {
            return Vec::new();
        };
        let mut texts = Vec::new();
        let mut lost = false;
        for event in transport.poll() {
            match event {
                LinkEvent::Text(text) => texts.push(text),
                LinkEvent::Binary(bytes) => texts.push(String::from_utf8_lossy(&bytes).into_owned()),
                LinkEvent::Disconnected | LinkEvent::Error { .. } => lost = true,
                LinkEvent::Connected => log::debug!("WebSocket open: {}", self.url),
            }
        }
        if lost {
            log::info!("WebSocket {} closed, reconnecting", self.url);
            transport.close();
            match Transport::websocket(&self.url, None) {
                Ok(transport) => {
                    self.transport = Some(transport);
                    self.reconnects += 1;
                }
                Err(e) => {
                    log::error!("WebSocket reconnect failed: {}", e);
                    self.transport = None;
                }
            }
        }
        texts
    }

    /// Close for good.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn test_receives_text_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            for round in 0..2 {
                let (stream, _) = listener.accept().unwrap();
                let mut ws = tungstenite::accept(stream).unwrap();
                ws.send(tungstenite::Message::Text(format!("hello {}", round))).unwrap();
                let _ = ws.close(None);
                let _ = ws.flush();
            }
        });

        let mut client = WebSocketClient::connect(&format!("ws://{}", addr)).unwrap();
        let mut received = Vec::new();
        for _ in 0..200 {
            received.extend(client.poll());
            if received.len() >= 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        client.close();
        server.join().unwrap();
        assert_eq!(received, vec!["hello 0".to_string(), "hello 1".to_string()]);
        assert!(client.reconnects() >= 1);
    }
}
