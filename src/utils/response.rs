use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Success envelope shared by every endpoint: `{message, status, success, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub message: String,
    pub status: u16,
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, status: StatusCode, data: T) -> Self {
        Self {
            message: message.into(),
            status: status.as_u16(),
            success: status.as_u16() < 400,
            data,
        }
    }

    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::new(message, StatusCode::OK, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::new(message, StatusCode::CREATED, data)
    }
}

impl ApiResponse<serde_json::Value> {
    /// Envelope with an empty `data` object.
    pub fn message(message: impl Into<String>, status: StatusCode) -> Self {
        Self::new(message, status, serde_json::json!({}))
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}
