//! WebSocket endpoint: one task per socket relaying room messages.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use inkroom_core::protocol::{JoinPayload, UserId};
use inkroom_core::{Message, Payload};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::room::{ConnId, Room, RoomEvent, RoomRegistry, lock};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Membership of a connection in one room.
struct Joined {
    room_id: String,
    user_id: UserId,
    room: Arc<Mutex<Room>>,
    rx: broadcast::Receiver<RoomEvent>,
}

/// Protocol state of one socket, independent of the socket itself.
pub struct Connection {
    id: ConnId,
    joined: Option<Joined>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            joined: None,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.joined.as_ref().map(|j| j.room_id.as_str())
    }

    /// Handle one text frame. Returns the replies for this socket only;
    /// everything for the other members goes through the room channel.
    pub fn handle_text(&mut self, registry: &RoomRegistry, text: &str) -> Vec<String> {
        let message = match Message::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(conn = %self.id, error = %e, "invalid message");
                return self.error_reply(format!("invalid message: {e}"));
            }
        };
        match message.payload {
            Payload::Join(join) => self.join(registry, message.room_id, message.user_id, join),
            Payload::Leave => {
                self.leave();
                Vec::new()
            }
            payload => self.relay(payload),
        }
    }

    fn join(&mut self, registry: &RoomRegistry, room_id: String, user_id: UserId, join: JoinPayload) -> Vec<String> {
        if room_id.is_empty() || user_id.is_empty() {
            return self.error_reply("join requires roomId and userId");
        }
        self.leave();

        let conn = self.id;
        let (room, (rx, sync)) = registry.enter(&room_id, |room| {
            let collaborator = room.join(conn, &user_id, &join.username);
            let accepted = join.elements.map(|els| room.merge(els)).unwrap_or_default();
            let rx = room.subscribe();
            let sync = room.sync_message(&user_id);
            room.broadcast(conn, &Message::new(room.id(), user_id.as_str(), Payload::UserJoined(collaborator)));
            if !accepted.is_empty() {
                room.broadcast(conn, &room.update_message(&user_id, accepted));
            }
            (rx, sync)
        });
        info!(conn = %conn, room = %room_id, user = %user_id, "joined room");

        self.joined = Some(Joined {
            room_id,
            user_id,
            room,
            rx,
        });
        encode(&sync).into_iter().collect()
    }

    /// Remove this connection from its room, if any.
    pub fn leave(&mut self) {
        let Some(joined) = self.joined.take() else {
            return;
        };
        let mut room = lock(&joined.room);
        if room.leave(self.id, &joined.user_id) {
            room.broadcast(self.id, &Message::new(joined.room_id.as_str(), joined.user_id.as_str(), Payload::UserLeft));
        }
        info!(conn = %self.id, room = %joined.room_id, user = %joined.user_id, "left room");
    }

    fn relay(&mut self, payload: Payload) -> Vec<String> {
        let Some(joined) = self.joined.as_ref() else {
            return self.error_reply(format!("join a room before sending {}", payload.message_type()));
        };
        let conn = self.id;
        let mut room = lock(&joined.room);
        if room.is_closed() {
            drop(room);
            self.joined = None;
            return self.error_reply("room was closed");
        }

        let user_id = joined.user_id.as_str();
        match payload {
            Payload::Update(update) => {
                let accepted = room.merge(update.elements);
                debug!(room = %joined.room_id, accepted = accepted.len(), "update");
                if !accepted.is_empty() {
                    let message = room.update_message(user_id, accepted);
                    room.broadcast(conn, &message);
                }
            }
            Payload::Cursor(cursor) => {
                room.set_cursor(conn, user_id, cursor.cursor);
                room.broadcast(conn, &Message::new(room.id(), user_id, Payload::Cursor(cursor)));
            }
            Payload::Selection(selection) => {
                room.set_selection(conn, user_id, selection.selected_element_ids.clone());
                room.broadcast(conn, &Message::new(room.id(), user_id, Payload::Selection(selection)));
            }
            other => {
                drop(room);
                return self.error_reply(format!("unexpected message type {}", other.message_type()));
            }
        }
        Vec::new()
    }

    /// A fresh `sync` for this connection, used after falling behind.
    fn resync(&self) -> Option<String> {
        let joined = self.joined.as_ref()?;
        let room = lock(&joined.room);
        encode(&room.sync_message(&joined.user_id))
    }

    fn error_reply(&self, error: impl Into<String>) -> Vec<String> {
        let room_id = self.room_id().unwrap_or_default().to_string();
        encode(&Message::error(room_id, error)).into_iter().collect()
    }

    /// Wait for the next broadcast from another connection. Pends forever
    /// while not in a room.
    async fn next_broadcast(&mut self) -> Option<Arc<str>> {
        let id = self.id;
        let Some(joined) = self.joined.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            match joined.rx.recv().await {
                Ok((from, text)) if from != id => return Some(text),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(conn = %id, skipped, "connection fell behind");
                    return None;
                }
                Err(RecvError::Closed) => return std::future::pending().await,
            }
        }
    }
}

fn encode(message: &Message) -> Option<String> {
    match message.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(error = %e, "failed to encode reply");
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut conn = Connection::new();
    info!("New connection: {}", conn.id());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let replies = conn.handle_text(&state.rooms, text.as_str());
                        let mut failed = false;
                        for reply in replies {
                            if sender.send(WsMessage::Text(reply.into())).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        for reply in conn.error_reply("binary frames are not supported") {
                            if sender.send(WsMessage::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.id(), e);
                        break;
                    }
                }
            }

            broadcast = conn.next_broadcast() => {
                let text = match broadcast {
                    Some(text) => Some(text.to_string()),
                    None => conn.resync(),
                };
                if let Some(text) = text {
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    conn.leave();
    info!("Connection closed: {}", conn.id());
}
