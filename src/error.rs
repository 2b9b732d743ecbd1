// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::media_store::MediaStoreError;

/// Global Application Error Enum.
/// Every handler and service returns this; it maps onto an HTTP status and a
/// JSON body of the form `{"error": ..., "status": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 401 Unauthorized (no or invalid session)
    #[error("unauthenticated: {0}")]
    AuthError(String),

    // 403 Forbidden (authenticated, but not allowed)
    #[error("forbidden: {0}")]
    Forbidden(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict (e.g., duplicate email)
    #[error("conflict: {0}")]
    Conflict(String),

    // 502 Bad Gateway: remote media could not be removed, database untouched
    #[error("media cleanup failed: {0}")]
    MediaCleanupFailed(String),

    // 502 Bad Gateway: the media store rejected an upload or timed out
    #[error("media store error: {0}")]
    MediaStore(#[from] MediaStoreError),

    // 500: the database did not delete exactly the rows it was asked to
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) | AppError::PersistenceFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MediaCleanupFailed(_) | AppError::MediaStore(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Converts the error into a JSON response with the matching HTTP status.
/// Server-side failures are logged with their detail and answered with a
/// generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::PersistenceFailure(msg) => {
                tracing::error!("Persistence failure: {}", msg);
                "Error while deleting post(s)".to_string()
            }
            AppError::MediaStore(err) => {
                tracing::error!("Media store failure: {}", err);
                "Error while processing post media".to_string()
            }
            AppError::MediaCleanupFailed(msg) => {
                tracing::warn!("Media cleanup failed: {}", msg);
                msg
            }
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
        };
        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// True when the database rejected a write because of a unique constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            AppError::AuthError("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::MediaCleanupFailed("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::PersistenceFailure("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let response =
            AppError::InternalServerError("connection refused on 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["status"], 500);
    }
}
