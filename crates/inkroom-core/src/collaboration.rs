//! Client side of the room protocol.
//!
//! The manager owns presence and delta bookkeeping for one client. It never
//! touches the network itself: outgoing messages are queued as JSON strings
//! and drained by the session driver, incoming ones are fed to
//! [`CollaborationManager::handle_message`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use kurbo::Point;

use crate::protocol::{
    Collaborator, CursorPayload, CursorPosition, JoinPayload, Message, Payload, ProtocolError,
    SelectionPayload, UpdatePayload, UserId,
};
use crate::scene::Scene;
use crate::shapes::{Element, ElementId};

/// Timing knobs for the sync engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Minimum spacing between outgoing cursor messages.
    pub cursor_throttle: Duration,
    /// Reconnect attempts before going offline.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cursor_throttle: Duration::from_millis(16),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(8),
        }
    }
}

impl SyncConfig {
    /// Backoff before reconnect attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.reconnect_base_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting to retry after a lost connection.
    Reconnecting { attempt: u32, retry_at: Instant },
    /// Retry budget exhausted; local editing only.
    Offline,
}

/// What an incoming message did to local state.
#[derive(Debug, Clone, PartialEq)]
pub enum CollabEvent {
    /// A `sync` was merged; lists the elements that changed locally.
    Synced { changed: Vec<ElementId> },
    /// Remote elements were accepted by the merge.
    ElementsChanged(Vec<ElementId>),
    CollaboratorJoined(UserId),
    CollaboratorLeft(UserId),
    /// Cursor or selection of a collaborator changed.
    PresenceChanged(UserId),
    /// Canvas point the viewport should centre on after joining.
    CenterOn(Point),
    ServerError(String),
}

pub struct CollaborationManager {
    config: SyncConfig,
    user_id: UserId,
    username: String,
    room_id: Option<String>,
    status: ConnectionStatus,
    /// Remote collaborators, excluding this client.
    collaborators: HashMap<UserId, Collaborator>,
    /// Last `(version, version_nonce)` of each element sent to or received
    /// from the room.
    broadcast_versions: HashMap<ElementId, (u32, u32)>,
    last_cursor_sent: Option<Instant>,
    pending_cursor: Option<Option<CursorPosition>>,
    last_selection: Vec<ElementId>,
    /// Set until the viewport has been centred after joining an empty scene.
    center_pending: bool,
    awaiting_sync: bool,
    reconnect_attempt: u32,
    outgoing: Vec<String>,
}

impl CollaborationManager {
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>, config: SyncConfig) -> Self {
        Self {
            config,
            user_id: user_id.into(),
            username: username.into(),
            room_id: None,
            status: ConnectionStatus::Disconnected,
            collaborators: HashMap::new(),
            broadcast_versions: HashMap::new(),
            last_cursor_sent: None,
            pending_cursor: None,
            last_selection: Vec::new(),
            center_pending: false,
            awaiting_sync: false,
            reconnect_attempt: 0,
            outgoing: Vec::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    fn in_room(&self) -> bool {
        self.is_connected() && self.room_id.is_some()
    }

    /// Remote collaborators sorted by user id.
    pub fn collaborators(&self) -> Vec<&Collaborator> {
        let mut list: Vec<&Collaborator> = self.collaborators.values().collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    pub fn collaborator(&self, user_id: &str) -> Option<&Collaborator> {
        self.collaborators.get(user_id)
    }

    /// Take the queued outgoing messages.
    pub fn drain_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    fn queue(&mut self, payload: Payload) {
        if !self.is_connected() {
            return;
        }
        let Some(room_id) = &self.room_id else {
            return;
        };
        let message = Message::new(room_id.clone(), self.user_id.clone(), payload);
        match message.to_json() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("failed to encode {} message: {e}", message.message_type()),
        }
    }

    // --- Connection lifecycle ---

    /// A connection attempt has started.
    pub fn on_connecting(&mut self) {
        if self.status != ConnectionStatus::Offline {
            self.status = ConnectionStatus::Connecting;
        }
    }

    /// The transport is open; the retry budget is restored.
    pub fn on_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.reconnect_attempt = 0;
    }

    /// The transport dropped. Returns the delay before the next attempt, or
    /// `None` once the retry budget is spent and the manager is offline.
    pub fn on_disconnected(&mut self, now: Instant) -> Option<Duration> {
        self.collaborators.clear();
        self.pending_cursor = None;
        self.awaiting_sync = false;
        if self.status == ConnectionStatus::Offline {
            return None;
        }
        if self.reconnect_attempt >= self.config.max_reconnect_attempts {
            log::warn!(
                "giving up after {} reconnect attempts, continuing offline",
                self.reconnect_attempt
            );
            self.status = ConnectionStatus::Offline;
            return None;
        }
        self.reconnect_attempt += 1;
        let delay = self.config.reconnect_delay(self.reconnect_attempt);
        log::info!("connection lost, retry {} in {delay:?}", self.reconnect_attempt);
        self.status = ConnectionStatus::Reconnecting {
            attempt: self.reconnect_attempt,
            retry_at: now + delay,
        };
        Some(delay)
    }

    /// Whether a scheduled reconnect attempt is due.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        matches!(self.status, ConnectionStatus::Reconnecting { retry_at, .. } if now >= retry_at)
    }

    // --- Room membership ---

    /// Enter a room. The originator seeds the room with its full element
    /// list; other clients only receive the room's state.
    pub fn join(&mut self, room_id: impl Into<String>, scene: &Scene, originator: bool) {
        self.room_id = Some(room_id.into());
        self.collaborators.clear();
        self.center_pending = scene.live_elements().next().is_none();
        self.rejoin(scene, originator);
    }

    /// Re-send `join` for the current room, e.g. after a reconnect.
    pub fn rejoin(&mut self, scene: &Scene, originator: bool) {
        if self.room_id.is_none() {
            return;
        }
        let elements = if originator {
            let elements = scene.elements();
            self.record_broadcast(&elements);
            Some(elements)
        } else {
            None
        };
        self.awaiting_sync = true;
        self.queue(Payload::Join(JoinPayload {
            username: self.username.clone(),
            elements,
        }));
    }

    pub fn leave(&mut self) {
        self.queue(Payload::Leave);
        self.room_id = None;
        self.collaborators.clear();
        self.broadcast_versions.clear();
        self.pending_cursor = None;
        self.last_selection.clear();
        self.awaiting_sync = false;
    }

    // --- Outgoing changes ---

    fn record_broadcast(&mut self, elements: &[Element]) {
        for element in elements {
            self.broadcast_versions.insert(element.id, revision(element));
        }
    }

    /// Elements whose revision differs from the last one exchanged with the
    /// room. Uncommitted elements (version 0) are never sent.
    pub fn pending_changes(&self, scene: &Scene) -> Vec<Element> {
        scene
            .store()
            .iter()
            .filter(|e| e.version > 0 && self.broadcast_versions.get(&e.id) != Some(&revision(e)))
            .cloned()
            .collect()
    }

    /// Queue an `update` carrying every changed element. Returns how many
    /// elements were sent.
    pub fn queue_changes(&mut self, scene: &Scene) -> usize {
        if !self.in_room() || self.awaiting_sync {
            return 0;
        }
        let changes = self.pending_changes(scene);
        if changes.is_empty() {
            return 0;
        }
        self.record_broadcast(&changes);
        let count = changes.len();
        log::debug!("broadcasting {count} changed elements");
        self.queue(Payload::Update(UpdatePayload { elements: changes }));
        count
    }

    /// Report the local cursor. Sends immediately when the throttle window
    /// has passed, otherwise keeps only the most recent position.
    pub fn set_cursor(&mut self, cursor: Option<Point>, now: Instant) {
        if !self.in_room() {
            return;
        }
        let cursor = cursor.map(CursorPosition::from);
        let open = self
            .last_cursor_sent
            .is_none_or(|last| now.duration_since(last) >= self.config.cursor_throttle);
        if open {
            self.send_cursor(cursor, now);
        } else {
            self.pending_cursor = Some(cursor);
        }
    }

    fn send_cursor(&mut self, cursor: Option<CursorPosition>, now: Instant) {
        self.pending_cursor = None;
        self.last_cursor_sent = Some(now);
        self.queue(Payload::Cursor(CursorPayload { cursor }));
    }

    /// Send the pending cursor once its throttle window has elapsed.
    pub fn poll_cursor(&mut self, now: Instant) -> bool {
        let due = self
            .last_cursor_sent
            .is_none_or(|last| now.duration_since(last) >= self.config.cursor_throttle);
        if !due {
            return false;
        }
        self.flush_cursor(now)
    }

    /// Send the pending cursor now, ignoring the throttle.
    pub fn flush_cursor(&mut self, now: Instant) -> bool {
        match self.pending_cursor.take() {
            Some(cursor) if self.in_room() => {
                self.send_cursor(cursor, now);
                true
            }
            _ => false,
        }
    }

    /// Report the local selection if it changed.
    pub fn set_selection(&mut self, ids: &[ElementId]) {
        if !self.in_room() || self.last_selection == ids {
            return;
        }
        self.last_selection = ids.to_vec();
        self.queue(Payload::Selection(SelectionPayload {
            selected_element_ids: ids.to_vec(),
        }));
    }

    // --- Incoming ---

    /// Decode and apply one incoming message.
    pub fn handle_message(&mut self, json: &str, scene: &mut Scene) -> Result<Vec<CollabEvent>, ProtocolError> {
        let message = Message::from_json(json)?;
        Ok(self.apply_message(message, scene))
    }

    pub fn apply_message(&mut self, message: Message, scene: &mut Scene) -> Vec<CollabEvent> {
        if self.room_id.as_deref() != Some(message.room_id.as_str()) && !message.room_id.is_empty() {
            log::debug!("ignoring message for room {}", message.room_id);
            return Vec::new();
        }
        let from_self = message.user_id == self.user_id;
        let mut events = Vec::new();

        match message.payload {
            Payload::Sync(sync) => {
                let order: Vec<ElementId> = sync.elements.iter().map(|e| e.id).collect();
                let changed = self.merge(scene, sync.elements);
                scene.apply_remote_order(order);
                self.collaborators = sync
                    .collaborators
                    .into_iter()
                    .filter(|c| c.user_id != self.user_id)
                    .map(|c| (c.user_id.clone(), c))
                    .collect();
                self.awaiting_sync = false;
                log::info!(
                    "synced room: {} elements changed, {} collaborators",
                    changed.len(),
                    self.collaborators.len()
                );
                events.push(CollabEvent::Synced { changed });
                events.extend(self.resolve_center(scene));
            }
            // Another tab of the same user shares our id; the relay already
            // skips the sending connection.
            Payload::Update(update) => {
                let changed = self.merge(scene, update.elements);
                if !changed.is_empty() {
                    events.push(CollabEvent::ElementsChanged(changed));
                }
            }
            Payload::Cursor(cursor) if !from_self => {
                if let Some(c) = self.collaborators.get_mut(&message.user_id) {
                    c.cursor = cursor.cursor;
                    events.push(CollabEvent::PresenceChanged(message.user_id));
                    events.extend(self.resolve_center(scene));
                }
            }
            Payload::Selection(selection) if !from_self => {
                if let Some(c) = self.collaborators.get_mut(&message.user_id) {
                    c.selected_element_ids = selection.selected_element_ids;
                    events.push(CollabEvent::PresenceChanged(message.user_id));
                }
            }
            Payload::UserJoined(collaborator) if collaborator.user_id != self.user_id => {
                let id = collaborator.user_id.clone();
                self.collaborators.insert(id.clone(), collaborator);
                events.push(CollabEvent::CollaboratorJoined(id));
            }
            Payload::UserLeft if !from_self => {
                if self.collaborators.remove(&message.user_id).is_some() {
                    events.push(CollabEvent::CollaboratorLeft(message.user_id));
                }
            }
            Payload::Error(error) => {
                log::warn!("relay error: {}", error.error);
                events.push(CollabEvent::ServerError(error.error));
            }
            other => {
                log::debug!("ignoring {} message", other.message_type());
            }
        }
        events
    }

    fn merge(&mut self, scene: &mut Scene, elements: Vec<Element>) -> Vec<ElementId> {
        let received: Vec<(ElementId, (u32, u32))> = elements.iter().map(|e| (e.id, revision(e))).collect();
        let changed = scene.merge_remote(elements);
        // Remember what the room holds so it is not echoed back. A local copy
        // that beat the incoming one keeps its old record and is sent next.
        for (id, incoming) in received {
            let held = scene.get(id).map(revision);
            if held == Some(incoming) {
                self.broadcast_versions.insert(id, incoming);
            }
        }
        changed
    }

    /// Centre on the received content, or on the first known cursor when
    /// the room is empty.
    fn resolve_center(&mut self, scene: &Scene) -> Option<CollabEvent> {
        if !self.center_pending {
            return None;
        }
        let target = match scene.store().live_bounds() {
            Some(bounds) => Some(bounds.center()),
            None => self
                .collaborators()
                .into_iter()
                .find_map(|c| c.cursor)
                .map(Point::from),
        };
        let target = target?;
        self.center_pending = false;
        Some(CollabEvent::CenterOn(target))
    }
}

fn revision(element: &Element) -> (u32, u32) {
    (element.version, element.version_nonce)
}
