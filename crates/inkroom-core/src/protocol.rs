//! Room protocol shared by clients and the relay.
//!
//! Every message is a JSON envelope `{ type, roomId, userId, payload }` with
//! a kebab-case `type`. The payload shape depends on the type.

use std::fmt;
use std::str::FromStr;

use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shapes::{Element, ElementId};

/// Client-chosen user identifier.
pub type UserId = String;

/// Collaborator colours, picked deterministically from the user id.
pub const COLLABORATOR_PALETTE: [&str; 8] = [
    "#e03131", "#2f9e44", "#1971c2", "#f08c00", "#9c36b5", "#0c8599", "#e8590c", "#6741d9",
];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Join,
    Leave,
    Update,
    Cursor,
    Selection,
    Sync,
    UserJoined,
    UserLeft,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Join => "join",
            MessageType::Leave => "leave",
            MessageType::Update => "update",
            MessageType::Cursor => "cursor",
            MessageType::Selection => "selection",
            MessageType::Sync => "sync",
            MessageType::UserJoined => "user-joined",
            MessageType::UserLeft => "user-left",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "join" => MessageType::Join,
            "leave" => MessageType::Leave,
            "update" => MessageType::Update,
            "cursor" => MessageType::Cursor,
            "selection" => MessageType::Selection,
            "sync" => MessageType::Sync,
            "user-joined" => MessageType::UserJoined,
            "user-left" => MessageType::UserLeft,
            "error" => MessageType::Error,
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl From<Point> for CursorPosition {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<CursorPosition> for Point {
    fn from(c: CursorPosition) -> Self {
        Point::new(c.x, c.y)
    }
}

/// Presence record of one connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: UserId,
    pub username: String,
    pub color: String,
    #[serde(default)]
    pub cursor: Option<CursorPosition>,
    #[serde(default)]
    pub selected_element_ids: Vec<ElementId>,
}

impl Collaborator {
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let color = collaborator_color(&user_id).to_string();
        Self {
            user_id,
            username: username.into(),
            color,
            cursor: None,
            selected_element_ids: Vec::new(),
        }
    }
}

/// Palette colour for `user_id` (FNV-1a, stable across builds).
pub fn collaborator_color(user_id: &str) -> &'static str {
    let hash = user_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3));
    COLLABORATOR_PALETTE[(hash % COLLABORATOR_PALETTE.len() as u64) as usize]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub username: String,
    /// Present only when the joining client originates the room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<Element>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    /// Full element list in paint order, tombstones included.
    pub elements: Vec<Element>,
    pub collaborators: Vec<Collaborator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPayload {
    pub cursor: Option<CursorPosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPayload {
    pub selected_element_ids: Vec<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

/// Typed message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Join(JoinPayload),
    Leave,
    Update(UpdatePayload),
    Cursor(CursorPayload),
    Selection(SelectionPayload),
    Sync(SyncPayload),
    UserJoined(Collaborator),
    UserLeft,
    Error(ErrorPayload),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Join(_) => MessageType::Join,
            Payload::Leave => MessageType::Leave,
            Payload::Update(_) => MessageType::Update,
            Payload::Cursor(_) => MessageType::Cursor,
            Payload::Selection(_) => MessageType::Selection,
            Payload::Sync(_) => MessageType::Sync,
            Payload::UserJoined(_) => MessageType::UserJoined,
            Payload::UserLeft => MessageType::UserLeft,
            Payload::Error(_) => MessageType::Error,
        }
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Payload::Join(p) => serde_json::to_value(p),
            Payload::Update(p) => serde_json::to_value(p),
            Payload::Cursor(p) => serde_json::to_value(p),
            Payload::Selection(p) => serde_json::to_value(p),
            Payload::Sync(p) => serde_json::to_value(p),
            Payload::UserJoined(p) => serde_json::to_value(p),
            Payload::Error(p) => serde_json::to_value(p),
            Payload::Leave | Payload::UserLeft => Ok(serde_json::Value::Null),
        }
    }

    fn from_value(ty: MessageType, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match ty {
            MessageType::Join => Payload::Join(serde_json::from_value(value)?),
            MessageType::Update => Payload::Update(serde_json::from_value(value)?),
            MessageType::Cursor => Payload::Cursor(serde_json::from_value(value)?),
            MessageType::Selection => Payload::Selection(serde_json::from_value(value)?),
            MessageType::Sync => Payload::Sync(serde_json::from_value(value)?),
            MessageType::UserJoined => Payload::UserJoined(serde_json::from_value(value)?),
            MessageType::Error => Payload::Error(serde_json::from_value(value)?),
            MessageType::Leave => Payload::Leave,
            MessageType::UserLeft => Payload::UserLeft,
        })
    }
}

/// Wire form of the envelope.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    room_id: String,
    user_id: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub room_id: String,
    pub user_id: UserId,
    pub payload: Payload,
}

impl Message {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<UserId>, payload: Payload) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            payload,
        }
    }

    /// An `error` reply from the relay.
    pub fn error(room_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(room_id, "", Payload::Error(ErrorPayload { error: error.into() }))
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = Envelope {
            kind: self.message_type().as_str().to_string(),
            room_id: self.room_id.clone(),
            user_id: self.user_id.clone(),
            payload: self.payload.to_value()?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(json)?;
        let ty: MessageType = envelope.kind.parse()?;
        Ok(Self {
            room_id: envelope.room_id,
            user_id: envelope.user_id,
            payload: Payload::from_value(ty, envelope.payload)?,
        })
    }
}
