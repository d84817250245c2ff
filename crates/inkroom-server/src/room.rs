//! Room state and the registry of live rooms.
//!
//! Each room sits behind its own mutex so that reading the store, merging,
//! writing and broadcasting happen as one step per room, while different
//! rooms never contend. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use inkroom_core::protocol::{CursorPosition, SyncPayload, UpdatePayload, UserId};
use inkroom_core::{Collaborator, Element, ElementId, ElementStore, Message, Payload};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one WebSocket connection.
pub type ConnId = Uuid;

/// A serialized message and the connection it came from. Receivers skip
/// their own messages.
pub type RoomEvent = (ConnId, Arc<str>);

struct Member {
    collaborator: Collaborator,
    conn: ConnId,
}

pub struct Room {
    id: String,
    store: ElementStore,
    members: HashMap<UserId, Member>,
    tx: broadcast::Sender<RoomEvent>,
    empty_since: Option<Instant>,
    /// Set once the room has left the registry.
    closed: bool,
}

impl Room {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            id: id.into(),
            store: ElementStore::new(),
            members: HashMap::new(),
            tx,
            empty_since: Some(Instant::now()),
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    /// Presence records of everyone in the room.
    pub fn roster(&self) -> Vec<Collaborator> {
        let mut roster: Vec<Collaborator> =
            self.members.values().map(|m| m.collaborator.clone()).collect();
        roster.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        roster
    }

    /// Add or take over the record for `user_id`. A second connection with
    /// the same user id becomes the owner of the record.
    pub fn join(&mut self, conn: ConnId, user_id: &str, username: &str) -> Collaborator {
        let collaborator = Collaborator::new(user_id, username);
        self.members.insert(
            user_id.to_string(),
            Member {
                collaborator: collaborator.clone(),
                conn,
            },
        );
        self.empty_since = None;
        collaborator
    }

    /// Remove the record for `user_id` if `conn` owns it.
    pub fn leave(&mut self, conn: ConnId, user_id: &str) -> bool {
        let owned = self.members.get(user_id).is_some_and(|m| m.conn == conn);
        if owned {
            self.members.remove(user_id);
            if self.members.is_empty() {
                self.empty_since = Some(Instant::now());
            }
        }
        owned
    }

    fn member_mut(&mut self, conn: ConnId, user_id: &str) -> Option<&mut Collaborator> {
        self.members
            .get_mut(user_id)
            .filter(|m| m.conn == conn)
            .map(|m| &mut m.collaborator)
    }

    pub fn set_cursor(&mut self, conn: ConnId, user_id: &str, cursor: Option<CursorPosition>) -> bool {
        match self.member_mut(conn, user_id) {
            Some(c) => {
                c.cursor = cursor;
                true
            }
            None => false,
        }
    }

    pub fn set_selection(&mut self, conn: ConnId, user_id: &str, ids: Vec<ElementId>) -> bool {
        match self.member_mut(conn, user_id) {
            Some(c) => {
                c.selected_element_ids = ids;
                true
            }
            None => false,
        }
    }

    /// Merge incoming elements and return the copies that were accepted.
    pub fn merge(&mut self, elements: Vec<Element>) -> Vec<Element> {
        let accepted = self.store.merge(elements);
        accepted
            .into_iter()
            .filter_map(|id| self.store.get(id).cloned())
            .collect()
    }

    /// Elements in paint order, tombstones included, plus the roster.
    pub fn sync_message(&self, user_id: &str) -> Message {
        Message::new(
            self.id.clone(),
            user_id,
            Payload::Sync(SyncPayload {
                elements: self.store.to_vec(),
                collaborators: self.roster(),
            }),
        )
    }

    pub fn update_message(&self, user_id: &str, elements: Vec<Element>) -> Message {
        Message::new(self.id.clone(), user_id, Payload::Update(UpdatePayload { elements }))
    }

    /// Send `message` to every subscriber except `from`.
    pub fn broadcast(&self, from: ConnId, message: &Message) {
        match message.to_json() {
            Ok(json) => {
                // No receivers is fine: the room may be empty.
                let _ = self.tx.send((from, Arc::from(json)));
            }
            Err(e) => warn!(room = %self.id, error = %e, "failed to encode broadcast"),
        }
    }

    fn idle_for(&self, idle: Duration, now: Instant) -> bool {
        self.members.is_empty()
            && self
                .empty_since
                .is_some_and(|since| now.saturating_duration_since(since) >= idle)
    }
}

/// Lock a room, recovering the state if a previous holder panicked.
pub fn lock(room: &Mutex<Room>) -> MutexGuard<'_, Room> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}

/// All live rooms, keyed by id.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    capacity: usize,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(id).map(|room| room.clone())
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<Room>> {
        self.rooms
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(room = %id, "creating room");
                Arc::new(Mutex::new(Room::new(id, self.capacity)))
            })
            .clone()
    }

    /// Create a room under a fresh id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.get_or_create(&id);
        id
    }

    /// Run `f` on the room named `id`, creating it if needed. Retries when
    /// the room was reaped between lookup and lock.
    pub fn enter<R>(&self, id: &str, f: impl FnOnce(&mut Room) -> R) -> (Arc<Mutex<Room>>, R) {
        loop {
            let room = self.get_or_create(id);
            let mut guard = lock(&room);
            if guard.closed {
                continue;
            }
            let result = f(&mut guard);
            drop(guard);
            return (room, result);
        }
    }

    /// Drop a room. Connected members see it as closed on their next message.
    pub fn remove(&self, id: &str) -> bool {
        match self.rooms.remove(id) {
            Some((_, room)) => {
                lock(&room).closed = true;
                true
            }
            None => false,
        }
    }

    /// Drop rooms that have been empty for at least `idle`.
    pub fn reap(&self, idle: Duration, now: Instant) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|id, room| {
            let mut room = lock(room);
            if room.idle_for(idle, now) {
                debug!(room = %id, "reaping idle room");
                room.closed = true;
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.rooms.len())
    }
}

/// Periodically drop idle rooms until the task is aborted.
pub fn spawn_reaper(registry: Arc<RoomRegistry>, interval: Duration, idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = registry.reap(idle, Instant::now());
            if reaped > 0 {
                info!(reaped, remaining = registry.len(), "reaped idle rooms");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{ElementStyle, ElementType};

    fn rect(version: u32) -> Element {
        let mut el = Element::new(ElementType::Rectangle, 0.0, 0.0, ElementStyle::default());
        el.version = version;
        el
    }

    #[test]
    fn test_leave_requires_owning_connection() {
        let mut room = Room::new("r", 8);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        room.join(first, "alice", "Alice");
        // A second tab takes over the record.
        room.join(second, "alice", "Alice");

        assert!(!room.leave(first, "alice"));
        assert_eq!(room.roster().len(), 1);
        assert!(room.leave(second, "alice"));
        assert!(room.is_empty());
    }

    #[test]
    fn test_merge_returns_accepted_copies() {
        let mut room = Room::new("r", 8);
        let el = rect(3);
        assert_eq!(room.merge(vec![el.clone()]).len(), 1);

        let mut stale = el.clone();
        stale.version = 2;
        stale.x = 99.0;
        assert!(room.merge(vec![stale]).is_empty());
        assert_eq!(room.store().get(el.id).map(|e| e.x), Some(0.0));
    }

    #[test]
    fn test_presence_updates_only_for_owner() {
        let mut room = Room::new("r", 8);
        let conn = Uuid::new_v4();
        room.join(conn, "bob", "Bob");

        assert!(room.set_cursor(conn, "bob", Some(CursorPosition { x: 1.0, y: 2.0 })));
        assert!(!room.set_cursor(Uuid::new_v4(), "bob", None));
        assert_eq!(room.roster()[0].cursor, Some(CursorPosition { x: 1.0, y: 2.0 }));

        let id = Uuid::new_v4();
        assert!(room.set_selection(conn, "bob", vec![id]));
        assert_eq!(room.roster()[0].selected_element_ids, vec![id]);
    }

    #[test]
    fn test_broadcast_tags_sender() {
        let room = Room::new("r", 8);
        let mut rx = room.subscribe();
        let conn = Uuid::new_v4();
        room.broadcast(conn, &room.update_message("alice", vec![rect(1)]));

        let (from, json) = rx.try_recv().unwrap();
        assert_eq!(from, conn);
        let decoded = Message::from_json(&json).unwrap();
        assert_eq!(decoded.user_id, "alice");
        assert!(matches!(decoded.payload, Payload::Update(_)));
    }

    #[test]
    fn test_reap_drops_only_idle_empty_rooms() {
        let registry = RoomRegistry::new(8);
        let busy = registry.get_or_create("busy");
        lock(&busy).join(Uuid::new_v4(), "alice", "Alice");
        let idle = registry.get_or_create("idle");

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(registry.reap(Duration::from_secs(60), Instant::now()), 0);
        assert_eq!(registry.reap(Duration::from_secs(60), later), 1);
        assert!(registry.get("busy").is_some());
        assert!(registry.get("idle").is_none());
        assert!(lock(&idle).is_closed());
    }

    #[test]
    fn test_enter_replaces_closed_room() {
        let registry = RoomRegistry::new(8);
        let old = registry.get_or_create("r");
        assert!(registry.remove("r"));

        let (room, members) = registry.enter("r", |room| {
            room.join(Uuid::new_v4(), "alice", "Alice");
            room.roster().len()
        });
        assert_eq!(members, 1);
        assert!(!Arc::ptr_eq(&old, &room));
        assert!(lock(&old).is_closed());
    }

    #[tokio::test]
    async fn test_reaper_task_sweeps() {
        let registry = Arc::new(RoomRegistry::new(8));
        registry.create();
        let handle = spawn_reaper(registry.clone(), Duration::from_millis(10), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert!(registry.is_empty());
    }
}
