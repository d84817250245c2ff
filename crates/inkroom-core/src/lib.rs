//! Inkroom core library
//!
//! Platform-agnostic collaborative scene engine: the element model and its
//! mutation surface, geometry and hit testing, arrow bindings, the pointer
//! interaction state machine, and the room sync protocol with its
//! version-based merge rule. The relay server links this crate so both sides
//! merge identically.

pub mod binding;
pub mod camera;
pub mod canvas;
pub mod collaboration;
pub mod geometry;
pub mod history;
pub mod hit_test;
pub mod input;
pub mod interaction;
pub mod protocol;
pub mod scene;
pub mod selection;
pub mod shapes;
pub mod snap;
pub mod storage;
pub mod store;
pub mod tools;
pub mod transport;

pub use binding::{ArrowEnd, Binding};
pub use camera::Camera;
pub use canvas::Canvas;
pub use collaboration::{CollabEvent, CollaborationManager, ConnectionStatus, SyncConfig};
pub use input::{Modifiers, PointerButton, PointerEvent};
pub use interaction::{InteractionOutcome, InteractionResolver, InteractionState};
pub use protocol::{Collaborator, Message, MessageType, Payload, ProtocolError};
pub use scene::{ElementUpdate, Scene, SceneError};
pub use shapes::{Element, ElementId, ElementKind, ElementStyle, ElementType};
pub use snap::GridSettings;
pub use storage::{ExportDocument, LocalSnapshot};
pub use store::ElementStore;
pub use tools::{StyleDefaults, ToolKind};
pub use transport::{CollabSession, Transport, TransportError, TransportEvent};

#[cfg(not(target_arch = "wasm32"))]
pub use transport::NativeWebSocket;
