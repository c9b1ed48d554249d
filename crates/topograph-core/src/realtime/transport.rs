//! Byte and text links used by the realtime clients.
//!
//! A [`Transport`] owns one connection. On native targets the connection
//! runs on a background thread and events are drained with
//! [`Transport::poll`]; in the browser the `WebSocket` callbacks queue
//! events for the same call.

use crate::error::{Error, Result};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Something that happened on a link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    Text(String),
    Binary(Vec<u8>),
    Disconnected,
    Error { message: String },
}

/// A frame to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
}

fn track(state: &mut ConnectionState, event: &LinkEvent) {
    match event {
        LinkEvent::Connected => *state = ConnectionState::Connected,
        LinkEvent::Disconnected => *state = ConnectionState::Disconnected,
        LinkEvent::Error { .. } => *state = ConnectionState::Error,
        _ => {}
    }
}

// ============================================================================
// Native links
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::*;
    use std::io::{self, Read, Write};
    use std::net::TcpStream;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use tungstenite::client::IntoClientRequest;
    use tungstenite::http::HeaderValue;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket};
    use url::Url;

    const READ_TIMEOUT: Duration = Duration::from_millis(50);
    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
    const DEFAULT_MQTT_PORT: u16 = 1883;

    /// Commands sent to the link thread.
    enum Command {
        Send(Outgoing),
        Close,
    }

    /// Result of one read attempt.
    enum Poll {
        Event(LinkEvent),
        Idle,
        Closed,
    }

    /// A blocking connection driven by the link thread.
    trait Link: Send {
        fn send(&mut self, frame: Outgoing) -> io::Result<()>;
        fn read(&mut self) -> std::result::Result<Poll, String>;
        fn close(&mut self);
    }

    fn is_timeout(e: &io::Error) -> bool {
        matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    }

    struct WsLink(WebSocket<MaybeTlsStream<TcpStream>>);

    impl Link for WsLink {
        fn send(&mut self, frame: Outgoing) -> io::Result<()> {
            let message = match frame {
                Outgoing::Text(text) => Message::Text(text),
                Outgoing::Binary(bytes) => Message::Binary(bytes),
            };
            self.0.send(message).map_err(io::Error::other)
        }

        fn read(&mut self) -> std::result::Result<Poll, String> {
            match self.0.read() {
                Ok(Message::Text(text)) => Ok(Poll::Event(LinkEvent::Text(text))),
                Ok(Message::Binary(bytes)) => Ok(Poll::Event(LinkEvent::Binary(bytes))),
                Ok(Message::Ping(data)) => {
                    let _ = self.0.send(Message::Pong(data));
                    Ok(Poll::Idle)
                }
                Ok(Message::Close(_)) => Ok(Poll::Closed),
                Ok(_) => Ok(Poll::Idle),
                Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => Ok(Poll::Idle),
                Err(tungstenite::Error::ConnectionClosed) => Ok(Poll::Closed),
                Err(e) => Err(e.to_string()),
            }
        }

        fn close(&mut self) {
            let _ = self.0.close(None);
            let _ = self.0.flush();
        }
    }

    struct TcpLink {
        stream: TcpStream,
        buf: Vec<u8>,
    }

    impl Link for TcpLink {
        fn send(&mut self, frame: Outgoing) -> io::Result<()> {
            match frame {
                Outgoing::Text(text) => self.stream.write_all(text.as_bytes()),
                Outgoing::Binary(bytes) => self.stream.write_all(&bytes),
            }
        }

        fn read(&mut self) -> std::result::Result<Poll, String> {
            match self.stream.read(&mut self.buf) {
                Ok(0) => Ok(Poll::Closed),
                Ok(n) => Ok(Poll::Event(LinkEvent::Binary(self.buf[..n].to_vec()))),
                Err(ref e) if is_timeout(e) => Ok(Poll::Idle),
                Err(e) => Err(e.to_string()),
            }
        }

        fn close(&mut self) {
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn open_websocket(url: &str, protocol: Option<&str>) -> std::result::Result<Box<dyn Link>, String> {
        let mut request = url.into_client_request().map_err(|e| e.to_string())?;
        if let Some(protocol) = protocol {
            let value = HeaderValue::from_str(protocol).map_err(|e| e.to_string())?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }
        let (mut socket, response) = tungstenite::connect(request).map_err(|e| e.to_string())?;
        log::info!("WebSocket connected to {}, status: {}", url, response.status());
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
                let _ = tcp.set_write_timeout(Some(WRITE_TIMEOUT));
            }
            #[allow(unreachable_patterns)]
            _ => log::debug!("TLS stream - using default timeout handling"),
        }
        Ok(Box::new(WsLink(socket)))
    }

    fn open_tcp(url: &Url) -> std::result::Result<Box<dyn Link>, String> {
        let host = url.host_str().ok_or_else(|| format!("No host in {}", url))?;
        let port = url.port().unwrap_or(DEFAULT_MQTT_PORT);
        let stream = TcpStream::connect((host, port)).map_err(|e| e.to_string())?;
        log::info!("TCP connected to {}:{}", host, port);
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
        let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
        let _ = stream.set_nodelay(true);
        Ok(Box::new(TcpLink {
            stream,
            buf: vec![0; 4096],
        }))
    }

    fn run(mut link: Box<dyn Link>, commands: Receiver<Command>, events: Sender<LinkEvent>) {
        let _ = events.send(LinkEvent::Connected);
        loop {
            match commands.try_recv() {
                Ok(Command::Send(frame)) => {
                    if let Err(e) = link.send(frame) {
                        log::error!("Link send error: {}", e);
                        break;
                    }
                }
                Ok(Command::Close) => {
                    log::info!("Link close requested");
                    link.close();
                    break;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match link.read() {
                Ok(Poll::Event(event)) => {
                    if events.send(event).is_err() {
                        link.close();
                        break;
                    }
                }
                Ok(Poll::Idle) => {}
                Ok(Poll::Closed) => {
                    log::info!("Link closed by peer");
                    break;
                }
                Err(e) => {
                    log::error!("Link read error: {}", e);
                    break;
                }
            }
        }
        log::info!("Link thread exiting");
        let _ = events.send(LinkEvent::Disconnected);
    }

    /// A connection running on a background thread.
    pub struct Transport {
        state: ConnectionState,
        commands: Option<Sender<Command>>,
        events: Option<Receiver<LinkEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl Transport {
        /// Open a WebSocket, optionally requesting a subprotocol.
        pub fn websocket(url: &str, protocol: Option<&str>) -> Result<Self> {
            let parsed = Url::parse(url).map_err(|e| Error::Realtime(format!("Invalid URL {}: {}", url, e)))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(Error::Realtime(format!("Invalid WebSocket URL scheme: {}", parsed.scheme())));
            }
            let url = url.to_string();
            let protocol = protocol.map(str::to_string);
            Ok(Self::spawn(move || open_websocket(&url, protocol.as_deref())))
        }

        /// Open a raw TCP connection to `mqtt://host[:port]` or
        /// `tcp://host[:port]`.
        pub fn tcp(url: &str) -> Result<Self> {
            let parsed = Url::parse(url).map_err(|e| Error::Realtime(format!("Invalid URL {}: {}", url, e)))?;
            if parsed.host_str().is_none() {
                return Err(Error::Realtime(format!("No host in {}", url)));
            }
            Ok(Self::spawn(move || open_tcp(&parsed)))
        }

        fn spawn<F>(open: F) -> Self
        where
            F: FnOnce() -> std::result::Result<Box<dyn Link>, String> + Send + 'static,
        {
            let (command_tx, command_rx) = channel::<Command>();
            let (event_tx, event_rx) = channel::<LinkEvent>();
            let handle = thread::spawn(move || match open() {
                Ok(link) => run(link, command_rx, event_tx),
                Err(message) => {
                    log::error!("Connection failed: {}", message);
                    let _ = event_tx.send(LinkEvent::Error {
                        message: format!("Connection failed: {}", message),
                    });
                }
            });
            Self {
                state: ConnectionState::Connecting,
                commands: Some(command_tx),
                events: Some(event_rx),
                _thread: Some(handle),
            }
        }

        pub fn send(&self, frame: Outgoing) -> Result<()> {
            match &self.commands {
                Some(tx) => tx
                    .send(Command::Send(frame))
                    .map_err(|e| Error::Realtime(format!("Send failed: {}", e))),
                None => Err(Error::Realtime("Not connected".to_string())),
            }
        }

        /// Drain pending events (non-blocking).
        pub fn poll(&mut self) -> Vec<LinkEvent> {
            let mut out = Vec::new();
            if let Some(rx) = &self.events {
                while let Ok(event) = rx.try_recv() {
                    track(&mut self.state, &event);
                    out.push(event);
                }
            }
            out
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn close(&mut self) {
            if let Some(tx) = self.commands.take() {
                let _ = tx.send(Command::Close);
            }
            self.events = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    impl Drop for Transport {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::Transport;

// ============================================================================
// Browser links
// ============================================================================

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

    /// A browser `WebSocket` whose callbacks queue events for polling.
    pub struct Transport {
        ws: Option<WebSocket>,
        state: ConnectionState,
        events: Rc<RefCell<Vec<LinkEvent>>>,
        // The callbacks must outlive the socket.
        _on_open: Option<Closure<dyn Fn()>>,
        _on_message: Option<Closure<dyn Fn(MessageEvent)>>,
        _on_close: Option<Closure<dyn Fn(CloseEvent)>>,
        _on_error: Option<Closure<dyn Fn(ErrorEvent)>>,
    }

    impl Transport {
        pub fn websocket(url: &str, protocol: Option<&str>) -> Result<Self> {
            let ws = match protocol {
                Some(protocol) => WebSocket::new_with_str(url, protocol),
                None => WebSocket::new(url),
            }
            .map_err(|e| Error::Realtime(format!("Failed to create WebSocket: {:?}", e)))?;
            ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

            let events = Rc::new(RefCell::new(Vec::new()));

            let queue = events.clone();
            let on_open = Closure::wrap(Box::new(move || {
                queue.borrow_mut().push(LinkEvent::Connected);
            }) as Box<dyn Fn()>);
            ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

            let queue = events.clone();
            let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
                let data = e.data();
                if let Ok(text) = data.clone().dyn_into::<js_sys::JsString>() {
                    queue.borrow_mut().push(LinkEvent::Text(text.into()));
                } else if let Ok(buffer) = data.dyn_into::<js_sys::ArrayBuffer>() {
                    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
                    queue.borrow_mut().push(LinkEvent::Binary(bytes));
                }
            }) as Box<dyn Fn(MessageEvent)>);
            ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

            let queue = events.clone();
            let on_close = Closure::wrap(Box::new(move |_e: CloseEvent| {
                queue.borrow_mut().push(LinkEvent::Disconnected);
            }) as Box<dyn Fn(CloseEvent)>);
            ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

            let queue = events.clone();
            let on_error = Closure::wrap(Box::new(move |_e: ErrorEvent| {
                queue.borrow_mut().push(LinkEvent::Error {
                    message: "WebSocket error".to_string(),
                });
            }) as Box<dyn Fn(ErrorEvent)>);
            ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            Ok(Self {
                ws: Some(ws),
                state: ConnectionState::Connecting,
                events,
                _on_open: Some(on_open),
                _on_message: Some(on_message),
                _on_close: Some(on_close),
                _on_error: Some(on_error),
            })
        }

        /// Browsers cannot open raw TCP sockets.
        pub fn tcp(url: &str) -> Result<Self> {
            Err(Error::Realtime(format!("TCP is not available in the browser: {}", url)))
        }

        pub fn send(&self, frame: Outgoing) -> Result<()> {
            let Some(ws) = &self.ws else {
                return Err(Error::Realtime("Not connected".to_string()));
            };
            match frame {
                Outgoing::Text(text) => ws.send_with_str(&text),
                Outgoing::Binary(bytes) => ws.send_with_u8_array(&bytes),
            }
            .map_err(|e| Error::Realtime(format!("Send failed: {:?}", e)))
        }

        pub fn poll(&mut self) -> Vec<LinkEvent> {
            let events = std::mem::take(&mut *self.events.borrow_mut());
            for event in &events {
                track(&mut self.state, event);
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn close(&mut self) {
            if let Some(ws) = self.ws.take() {
                ws.set_onclose(None);
                let _ = ws.close();
            }
            self.state = ConnectionState::Disconnected;
            self._on_open = None;
            self._on_message = None;
            self._on_close = None;
            self._on_error = None;
        }
    }

    impl Drop for Transport {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::Transport;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_scheme() {
        assert!(matches!(Transport::websocket("http://localhost:1", None), Err(Error::Realtime(_))));
        assert!(matches!(Transport::websocket("not a url", None), Err(Error::Realtime(_))));
    }

    #[test]
    fn test_failed_connect_reports_error() {
        // Port 1 on localhost is closed on any sane test machine.
        let mut transport = Transport::tcp("tcp://127.0.0.1:1").unwrap();
        assert_eq!(transport.state(), ConnectionState::Connecting);
        let mut events = Vec::new();
        for _ in 0..100 {
            events.extend(transport.poll());
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(matches!(events.first(), Some(LinkEvent::Error { .. })));
        assert_eq!(transport.state(), ConnectionState::Error);
    }
}
