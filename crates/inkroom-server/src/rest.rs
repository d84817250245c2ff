//! Room REST surface.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use inkroom_core::protocol::Collaborator;
use inkroom_core::{Element, ElementId, ExportDocument};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::RelayError;
use crate::room::lock;

/// Broadcasts from the REST surface carry this user id.
pub const REST_USER_ID: &str = "rest";

const EXPORT_SOURCE: &str = "inkroom-server";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoom {
    pub room_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: String,
    /// Paint order, tombstones included.
    pub elements: Vec<Element>,
    pub collaborators: Vec<Collaborator>,
}

#[derive(Debug, Deserialize)]
pub struct PutRoomBody {
    pub elements: Vec<Element>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRoomResponse {
    pub room_id: String,
    /// Ids whose incoming copy won the merge.
    pub accepted: Vec<ElementId>,
}

/// `POST /api/rooms` — create an empty room under a fresh id.
pub async fn create_room(State(state): State<AppState>) -> (StatusCode, Json<CreatedRoom>) {
    let room_id = state.rooms.create();
    tracing::info!(room = %room_id, "room created");
    (StatusCode::CREATED, Json(CreatedRoom { room_id }))
}

/// `GET /api/rooms/{id}` — current elements and roster.
pub async fn get_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<RoomState>, RelayError> {
    let room = state.rooms.get(&id).ok_or_else(|| RelayError::RoomNotFound(id.clone()))?;
    let room = lock(&room);
    Ok(Json(RoomState {
        room_id: id,
        elements: room.store().to_vec(),
        collaborators: room.roster(),
    }))
}

/// `PUT /api/rooms/{id}` — merge elements into the room, creating it if
/// needed. Accepted elements are broadcast to connected members.
pub async fn put_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PutRoomBody>,
) -> Result<Json<PutRoomResponse>, RelayError> {
    if id.is_empty() {
        return Err(RelayError::BadRequest("room id must not be empty".into()));
    }
    let rest_conn = Uuid::nil();
    let (_, accepted) = state.rooms.enter(&id, |room| {
        let accepted = room.merge(body.elements);
        let ids = accepted.iter().map(|e| e.id).collect::<Vec<_>>();
        if !accepted.is_empty() {
            room.broadcast(rest_conn, &room.update_message(REST_USER_ID, accepted));
        }
        ids
    });
    Ok(Json(PutRoomResponse { room_id: id, accepted }))
}

/// `DELETE /api/rooms/{id}`
pub async fn delete_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, RelayError> {
    if state.rooms.remove(&id) {
        tracing::info!(room = %id, "room deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RelayError::RoomNotFound(id))
    }
}

/// `GET /api/rooms/{id}/export` — live elements as a downloadable document.
pub async fn export_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, RelayError> {
    let room = state.rooms.get(&id).ok_or_else(|| RelayError::RoomNotFound(id.clone()))?;
    let document = ExportDocument::new(EXPORT_SOURCE, lock(&room).store().to_vec());
    let body = serde_json::to_string_pretty(&document)?;
    let filename = format!("inkroom-{id}.json");

    Ok((
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response())
}
