//! Message transport and the session driver.
//!
//! A [`Transport`] moves JSON strings; [`CollabSession`] pumps it on the
//! client's event loop, feeding incoming messages to the
//! [`CollaborationManager`] and handling reconnects.

use std::time::Instant;

use thiserror::Error;

use crate::collaboration::{CollabEvent, CollaborationManager, ConnectionStatus};
use crate::scene::Scene;

#[derive(Debug, Error, PartialEq)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("transport channel closed")]
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message(String),
    Error(String),
}

/// Ordered, reliable text transport.
pub trait Transport {
    fn connect(&mut self, url: &str) -> Result<(), TransportError>;

    fn disconnect(&mut self);

    fn send(&self, message: &str) -> Result<(), TransportError>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    fn state(&self) -> ConnectionState;
}

// ============================================================================
// Native WebSocket (tungstenite on a background thread)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// The socket lives on a background thread; the caller only exchanges
    /// strings with it through channels.
    pub struct NativeWebSocket {
        state: ConnectionState,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<TransportEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        fn run(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
            log::info!("websocket thread: connecting to {url}");
            let (mut socket, response) = match connect(url.as_str()) {
                Ok(ok) => ok,
                Err(e) => {
                    log::error!("websocket connection failed: {e}");
                    let _ = event_tx.send(TransportEvent::Error(format!("connection failed: {e}")));
                    return;
                }
            };
            log::info!("websocket connected, status: {}", response.status());
            let _ = event_tx.send(TransportEvent::Connected);

            // Short read timeout so the loop can also service outgoing commands.
            match socket.get_mut() {
                tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                    let _ = tcp.set_read_timeout(Some(Duration::from_millis(20)));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }
                #[allow(unreachable_patterns)]
                _ => log::debug!("non-plain stream, using default timeouts"),
            }

            loop {
                loop {
                    match cmd_rx.try_recv() {
                        Ok(WsCommand::Send(msg)) => {
                            log::debug!("websocket sending: {}", &msg[..msg.len().min(100)]);
                            if let Err(e) = socket.send(Message::Text(msg)) {
                                log::error!("websocket send error: {e}");
                                let _ = event_tx.send(TransportEvent::Disconnected);
                                return;
                            }
                        }
                        Ok(WsCommand::Close) | Err(TryRecvError::Disconnected) => {
                            log::info!("websocket close requested");
                            let _ = socket.close(None);
                            let _ = socket.flush();
                            return;
                        }
                        Err(TryRecvError::Empty) => break,
                    }
                }

                match socket.read() {
                    Ok(Message::Text(txt)) => {
                        if event_tx.send(TransportEvent::Message(txt)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("websocket received close frame");
                        break;
                    }
                    // Pings are answered by tungstenite on the next write.
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        log::error!("websocket read error: {e}");
                        break;
                    }
                }
            }

            log::info!("websocket thread exiting");
            let _ = event_tx.send(TransportEvent::Disconnected);
        }
    }

    impl Transport for NativeWebSocket {
        fn connect(&mut self, url: &str) -> Result<(), TransportError> {
            if self.cmd_tx.is_some() {
                return Err(TransportError::AlreadyConnected);
            }
            let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(TransportError::InvalidUrl(format!("unsupported scheme: {}", parsed.scheme())));
            }

            self.state = ConnectionState::Connecting;
            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let url = url.to_string();
            let handle = thread::spawn(move || Self::run(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        fn send(&self, message: &str) -> Result<(), TransportError> {
            match &self.cmd_tx {
                Some(tx) if self.state == ConnectionState::Connected => tx
                    .send(WsCommand::Send(message.to_string()))
                    .map_err(|_| TransportError::ChannelClosed),
                _ => Err(TransportError::NotConnected),
            }
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            let mut events = Vec::new();
            if let Some(rx) = &self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        TransportEvent::Connected => self.state = ConnectionState::Connected,
                        TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        TransportEvent::Error(_) => self.state = ConnectionState::Error,
                        TransportEvent::Message(_) => {}
                    }
                    events.push(event);
                }
            }
            // The worker has exited; allow a fresh connect.
            if matches!(self.state, ConnectionState::Disconnected | ConnectionState::Error) && self.cmd_tx.is_some() {
                self.cmd_tx = None;
                self.event_rx = None;
                self._thread = None;
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

// ============================================================================
// Session driver
// ============================================================================

/// Drives one client's connection to a room.
pub struct CollabSession<T: Transport> {
    transport: T,
    manager: CollaborationManager,
    url: String,
    room_id: String,
    originator: bool,
    /// Whether the room has been seeded with our elements already.
    seeded: bool,
}

impl<T: Transport> CollabSession<T> {
    /// `originator` seeds the room with the local scene on the first join.
    pub fn new(
        transport: T,
        manager: CollaborationManager,
        url: impl Into<String>,
        room_id: impl Into<String>,
        originator: bool,
    ) -> Self {
        Self {
            transport,
            manager,
            url: url.into(),
            room_id: room_id.into(),
            originator,
            seeded: false,
        }
    }

    pub fn manager(&self) -> &CollaborationManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut CollaborationManager {
        &mut self.manager
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Open the connection. Joining happens once the transport reports it
    /// is connected.
    pub fn start(&mut self) -> Result<(), TransportError> {
        self.manager.on_connecting();
        self.transport.connect(&self.url)
    }

    /// Leave the room and close the connection.
    pub fn stop(&mut self) {
        self.manager.leave();
        self.flush();
        self.transport.disconnect();
    }

    /// One pump of the event loop: apply incoming messages, handle
    /// connection changes, broadcast local changes and pending presence.
    pub fn tick(&mut self, scene: &mut Scene, now: Instant) -> Vec<CollabEvent> {
        let mut events = Vec::new();

        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Connected => {
                    self.manager.on_connected();
                    if self.manager.room_id().is_some() {
                        self.manager.rejoin(scene, false);
                    } else {
                        let seed = self.originator && !self.seeded;
                        self.manager.join(self.room_id.clone(), scene, seed);
                        self.seeded |= seed;
                    }
                }
                TransportEvent::Message(text) => match self.manager.handle_message(&text, scene) {
                    Ok(applied) => events.extend(applied),
                    Err(e) => log::warn!("dropping message: {e}"),
                },
                TransportEvent::Disconnected | TransportEvent::Error(_) => {
                    self.manager.on_disconnected(now);
                }
            }
        }

        if self.manager.reconnect_due(now) {
            self.manager.on_connecting();
            if let Err(e) = self.transport.connect(&self.url) {
                log::warn!("reconnect failed: {e}");
                self.manager.on_disconnected(now);
            }
        }

        if self.manager.is_connected() {
            self.manager.queue_changes(scene);
            self.manager.poll_cursor(now);
        }
        self.flush();
        events
    }

    fn flush(&mut self) {
        for message in self.manager.drain_outgoing() {
            if let Err(e) = self.transport.send(&message) {
                log::warn!("send failed: {e}");
            }
        }
    }
}
