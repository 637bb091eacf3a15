//! Error taxonomy for the round lifecycle and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors raised by [`crate::state::GameService`] operations
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// A state-machine precondition was violated, usually by a benign race
    #[error("conflict: {0}")]
    Conflict(String),

    /// No eligible statement exists for the group's edition
    #[error("no content available: {0}")]
    NoContent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    /// Caller is not the owner or not a member
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(StoreError),
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Conflict(_) => "CONFLICT",
            GameError::NoContent(_) => "NO_CONTENT",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Validation(_) => "VALIDATION",
            GameError::Forbidden(_) => "FORBIDDEN",
            GameError::Store(_) => "STORE",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GameError::Conflict(_))
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => GameError::Conflict(msg),
            StoreError::NotFound(msg) => GameError::NotFound(msg),
            other => GameError::Store(other),
        }
    }
}

/// Errors surfaced by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or empty user identity")]
    Unauthorized,

    #[error(transparent)]
    Game(#[from] GameError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Game(err.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Game(GameError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Game(GameError::NoContent(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Game(GameError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Game(GameError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Game(GameError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Game(GameError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Game(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_game_conflict() {
        let err: GameError = StoreError::Conflict("open round".to_string()).into();
        assert!(err.is_conflict());

        let err: GameError = StoreError::Backend("disk full".to_string()).into();
        assert_eq!(err.code(), "STORE");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (GameError::Conflict("x".into()).into(), StatusCode::CONFLICT),
            (GameError::NoContent("x".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (GameError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (GameError::Validation("x".into()).into(), StatusCode::BAD_REQUEST),
            (GameError::Forbidden("x".into()).into(), StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
