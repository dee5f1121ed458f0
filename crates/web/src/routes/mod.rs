use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use position_trainer_core::Error;

use crate::AppState;

pub mod analysis;
pub mod exercise;

/// Error returned by every JSON handler
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    BadRequest(String),
    NotFound(&'static str),
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::Core(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Core(error) => {
                let status = match &error {
                    Error::EngineBusy => StatusCode::CONFLICT,
                    Error::NoMatchingGame | Error::NoDatabase => StatusCode::NOT_FOUND,
                    Error::ConnectionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    Error::InvalidPosition(_) | Error::IllegalMove(_) | Error::Config(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!("request failed: {}", error);
                }
                (status, error.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct DatabaseSummary {
    pub games: usize,
}

#[derive(Serialize)]
pub struct ScoreView {
    pub score: i32,
}

/// Replaces the loaded database with the PGN text in the body
pub async fn load_database(
    State(state): State<Arc<AppState>>,
    body: String,
) -> ApiResult<DatabaseSummary> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("empty database".to_string()));
    }

    let games = state.trainer.load_database(&body);
    let count = games.len();
    *state.games.write().await = games;

    Ok(Json(DatabaseSummary { games: count }))
}

pub async fn score(State(state): State<Arc<AppState>>) -> Json<ScoreView> {
    Json(ScoreView {
        score: state.trainer.score(),
    })
}

pub async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: ApiError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(Error::EngineBusy.into()), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::NoDatabase.into()), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::NoMatchingGame.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Error::ConnectionUnavailable.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::InvalidPosition("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::Disconnected.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::NotFound("no active exercise")),
            StatusCode::NOT_FOUND
        );
    }
}
