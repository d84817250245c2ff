//! Relay errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inkroom_core::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::BadRequest(_) | RelayError::Protocol(_) => StatusCode::BAD_REQUEST,
            RelayError::Serialization(_) | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::RoomNotFound("r".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(RelayError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        let unknown = ProtocolError::UnknownType("nope".into());
        assert_eq!(RelayError::from(unknown).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_response_carries_status() {
        let response = RelayError::RoomNotFound("gone".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
