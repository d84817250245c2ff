//! End-to-end relay tests.
//!
//! Runs the real router on an ephemeral port and drives it with clients
//! built from the core sync engine.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use inkroom_core::protocol::CursorPosition;
use inkroom_core::scene::ElementUpdate;
use inkroom_core::store::incoming_wins;
use inkroom_core::{
    CollabEvent, CollabSession, CollaborationManager, ElementId, ElementType, Message, MessageType,
    NativeWebSocket, Payload, Scene, StyleDefaults, SyncConfig,
};
use inkroom_server::room::lock;
use inkroom_server::{AppState, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
        let addr = listener.local_addr().expect("failed to get local addr");
        let state = AppState::new(ServerConfig::default());
        let serve_state = state.clone();
        let handle = tokio::spawn(async move {
            let _ = inkroom_server::serve(listener, serve_state).await;
        });
        Self { addr, state, handle }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Poll the room until `check` holds for its store.
    async fn wait_for_room(&self, room_id: &str, check: impl Fn(&inkroom_core::ElementStore) -> bool) {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if let Some(room) = self.state.rooms.get(room_id) {
                if check(lock(&room).store()) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room_id} never reached the expected state");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client made of a raw socket, the sync engine and a scene.
struct Peer {
    ws: Socket,
    manager: CollaborationManager,
    scene: Scene,
}

impl Peer {
    async fn join(server: &TestServer, user: &str, room: &str, scene: Scene) -> Self {
        let (ws, _) = connect_async(server.ws_url()).await.expect("failed to connect");
        let mut manager = CollaborationManager::new(user, user.to_uppercase(), SyncConfig::default());
        manager.on_connecting();
        manager.on_connected();
        manager.join(room, &scene, true);
        let mut peer = Self { ws, manager, scene };
        peer.flush().await;
        peer.recv_until(MessageType::Sync).await;
        peer
    }

    async fn flush(&mut self) {
        for json in self.manager.drain_outgoing() {
            self.ws.send(WsMessage::Text(json.into())).await.expect("send failed");
        }
    }

    async fn publish(&mut self) {
        self.manager.queue_changes(&self.scene);
        self.flush().await;
    }

    /// Apply incoming messages until one of type `ty` arrives.
    async fn recv_until(&mut self, ty: MessageType) -> Vec<CollabEvent> {
        loop {
            let frame = timeout(WAIT, self.ws.next())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {ty}"))
                .expect("socket closed")
                .expect("socket error");
            let WsMessage::Text(text) = frame else {
                continue;
            };
            let message = Message::from_json(text.as_str()).expect("relay sent an invalid message");
            let received = message.message_type();
            let events = self.manager.apply_message(message, &mut self.scene);
            if received == ty {
                return events;
            }
        }
    }

    fn add_rect(&mut self, x: f64, y: f64) -> ElementId {
        let element = Scene::create(
            ElementType::Rectangle,
            x,
            y,
            &StyleDefaults::default(),
            &ElementUpdate::size(100.0, 50.0),
        );
        self.scene.add(element)
    }
}

async fn send_raw(ws: &mut Socket, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into())).await.expect("send failed");
}

async fn recv_raw(ws: &mut Socket) -> Message {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out")
            .expect("socket closed")
            .expect("socket error");
        if let WsMessage::Text(text) = frame {
            return Message::from_json(text.as_str()).expect("relay sent an invalid message");
        }
    }
}

#[tokio::test]
async fn edits_propagate_in_both_directions() {
    let server = TestServer::start().await;
    let mut alice = Peer::join(&server, "alice", "room-a", Scene::new()).await;
    let mut bob = Peer::join(&server, "bob", "room-a", Scene::new()).await;
    alice.recv_until(MessageType::UserJoined).await;

    let id = alice.add_rect(10.0, 10.0);
    alice.publish().await;
    bob.recv_until(MessageType::Update).await;
    let copy = bob.scene.get(id).expect("bob received the rectangle");
    assert_eq!(copy.version, 1);

    bob.scene.update(id, &ElementUpdate::position(200.0, 80.0)).unwrap();
    bob.publish().await;
    alice.recv_until(MessageType::Update).await;
    let moved = alice.scene.get(id).unwrap();
    assert_eq!(moved.version, 2);
    assert_eq!((moved.x, moved.y), (200.0, 80.0));
}

#[tokio::test]
async fn concurrent_edits_to_different_elements_are_kept() {
    let server = TestServer::start().await;
    let mut alice = Peer::join(&server, "alice", "room-b", Scene::new()).await;
    let mut bob = Peer::join(&server, "bob", "room-b", Scene::new()).await;
    alice.recv_until(MessageType::UserJoined).await;

    let a = alice.add_rect(0.0, 0.0);
    let b = bob.add_rect(300.0, 0.0);
    alice.publish().await;
    bob.publish().await;

    alice.recv_until(MessageType::Update).await;
    bob.recv_until(MessageType::Update).await;
    for peer in [&alice, &bob] {
        assert!(peer.scene.get(a).is_some());
        assert!(peer.scene.get(b).is_some());
    }
    server
        .wait_for_room("room-b", |store| store.contains(a) && store.contains(b))
        .await;
}

#[tokio::test]
async fn equal_version_conflict_converges() {
    let server = TestServer::start().await;
    let mut alice = Peer::join(&server, "alice", "room-c", Scene::new()).await;
    let mut bob = Peer::join(&server, "bob", "room-c", Scene::new()).await;
    alice.recv_until(MessageType::UserJoined).await;

    let id = alice.add_rect(0.0, 0.0);
    alice.publish().await;
    bob.recv_until(MessageType::Update).await;

    // Both move the same version-1 rectangle; bob has not published yet.
    bob.scene.update(id, &ElementUpdate::position(-100.0, 0.0)).unwrap();
    alice.scene.update(id, &ElementUpdate::position(100.0, 0.0)).unwrap();
    alice.publish().await;
    let bob_local = bob.scene.get(id).unwrap().clone();
    bob.recv_until(MessageType::Update).await;
    let bob_wins = !incoming_wins(&bob_local, alice.scene.get(id).unwrap());

    bob.publish().await;
    if bob_wins {
        alice.recv_until(MessageType::Update).await;
    }

    let a = alice.scene.get(id).unwrap();
    let b = bob.scene.get(id).unwrap();
    assert_eq!((a.version, a.version_nonce, a.x), (b.version, b.version_nonce, b.x));
    assert_eq!(a.x, if bob_wins { -100.0 } else { 100.0 });
    let (version, nonce) = (a.version, a.version_nonce);
    server
        .wait_for_room("room-c", |store| {
            store
                .get(id)
                .is_some_and(|e| e.version == version && e.version_nonce == nonce)
        })
        .await;
}

#[tokio::test]
async fn second_tab_of_same_user_receives_edits() {
    let server = TestServer::start().await;
    let mut first = Peer::join(&server, "bob", "room-t", Scene::new()).await;
    let mut second = Peer::join(&server, "bob", "room-t", Scene::new()).await;

    let id = first.add_rect(10.0, 10.0);
    first.publish().await;
    second.recv_until(MessageType::Update).await;
    assert!(second.scene.get(id).is_some());

    second.scene.update(id, &ElementUpdate::position(60.0, 60.0)).unwrap();
    second.publish().await;
    first.recv_until(MessageType::Update).await;
    assert_eq!(first.scene.get(id).unwrap().x, 60.0);
}

#[tokio::test]
async fn reconnect_receives_missed_updates() {
    let server = TestServer::start().await;
    let mut alice = Peer::join(&server, "alice", "room-d", Scene::new()).await;
    let mut bob = Peer::join(&server, "bob", "room-d", Scene::new()).await;
    alice.recv_until(MessageType::UserJoined).await;

    let shared = alice.add_rect(0.0, 0.0);
    alice.publish().await;
    bob.recv_until(MessageType::Update).await;

    // Bob drops off.
    bob.ws.close(None).await.expect("close failed");
    assert!(bob.manager.on_disconnected(Instant::now()).is_some());
    alice.recv_until(MessageType::UserLeft).await;

    // Both keep editing while apart.
    alice.scene.update(shared, &ElementUpdate::position(40.0, 40.0)).unwrap();
    let fresh = alice.add_rect(500.0, 500.0);
    alice.publish().await;
    let offline = bob.add_rect(-300.0, 0.0);
    server
        .wait_for_room("room-d", |store| {
            store.contains(fresh) && store.get(shared).is_some_and(|e| e.version == 2)
        })
        .await;

    // Bob comes back on a new socket.
    let (ws, _) = connect_async(server.ws_url()).await.expect("failed to reconnect");
    bob.ws = ws;
    bob.manager.on_connected();
    bob.manager.rejoin(&bob.scene, false);
    bob.flush().await;
    bob.recv_until(MessageType::Sync).await;
    assert!(bob.scene.get(fresh).is_some());
    assert_eq!(bob.scene.get(shared).unwrap().x, 40.0);

    // The offline edit goes out once the room state is known.
    bob.publish().await;
    alice.recv_until(MessageType::UserJoined).await;
    alice.recv_until(MessageType::Update).await;
    assert!(alice.scene.get(offline).is_some());
}

#[tokio::test]
async fn presence_is_relayed_and_listed_in_sync() {
    let server = TestServer::start().await;
    let mut alice = Peer::join(&server, "alice", "room-p", Scene::new()).await;
    let mut bob = Peer::join(&server, "bob", "room-p", Scene::new()).await;
    alice.recv_until(MessageType::UserJoined).await;

    bob.manager.set_cursor(Some(CursorPosition { x: 12.0, y: 34.0 }.into()), Instant::now());
    bob.flush().await;
    alice.recv_until(MessageType::Cursor).await;
    let cursor = alice.manager.collaborator("bob").and_then(|c| c.cursor).unwrap();
    assert_eq!((cursor.x, cursor.y), (12.0, 34.0));

    let carol = Peer::join(&server, "carol", "room-p", Scene::new()).await;
    let listed = carol.manager.collaborator("bob").expect("roster includes bob");
    assert_eq!(listed.cursor.map(|c| c.x), Some(12.0));
    assert!(carol.manager.collaborator("alice").is_some());
}

#[tokio::test]
async fn malformed_messages_get_an_error_and_keep_the_socket() {
    let server = TestServer::start().await;
    let (mut ws, _) = connect_async(server.ws_url()).await.expect("failed to connect");

    send_raw(&mut ws, "{ not json").await;
    assert_eq!(recv_raw(&mut ws).await.message_type(), MessageType::Error);

    send_raw(&mut ws, r#"{"type":"shout","roomId":"r","userId":"u","payload":null}"#).await;
    let reply = recv_raw(&mut ws).await;
    match reply.payload {
        Payload::Error(e) => assert!(e.error.contains("shout")),
        other => panic!("expected error, got {other:?}"),
    }

    send_raw(
        &mut ws,
        r#"{"type":"join","roomId":"r","userId":"u","payload":{"username":"U"}}"#,
    )
    .await;
    assert_eq!(recv_raw(&mut ws).await.message_type(), MessageType::Sync);
}

#[tokio::test]
async fn health_endpoint_answers() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.addr).await.expect("failed to connect");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("ok"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn native_session_joins_and_publishes() {
    let server = TestServer::start().await;
    let mut observer = Peer::join(&server, "observer", "room-n", Scene::new()).await;

    let mut scene = Scene::new();
    let manager = CollaborationManager::new("native", "Native", SyncConfig::default());
    let mut session = CollabSession::new(NativeWebSocket::new(), manager, server.ws_url(), "room-n", true);
    session.start().expect("failed to start session");

    let deadline = Instant::now() + WAIT;
    let mut synced = false;
    while !synced && Instant::now() < deadline {
        let events = session.tick(&mut scene, Instant::now());
        synced = events.iter().any(|e| matches!(e, CollabEvent::Synced { .. }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(synced, "native session never synced");
    observer.recv_until(MessageType::UserJoined).await;

    let id = scene.add(Scene::create(
        ElementType::Ellipse,
        0.0,
        0.0,
        &StyleDefaults::default(),
        &ElementUpdate::size(40.0, 40.0),
    ));
    session.tick(&mut scene, Instant::now());
    observer.recv_until(MessageType::Update).await;
    assert!(observer.scene.get(id).is_some());

    session.stop();
    observer.recv_until(MessageType::UserLeft).await;
    assert!(observer.manager.collaborator("native").is_none());
}
