use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::state::engine::Rejection;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A game command was refused by the engine.
    #[error("command rejected: {0}")]
    Rejected(#[from] Rejection),
    /// Every room is taken and no new one may be opened.
    #[error("no room available")]
    RoomFull,
    /// Requested room or binding does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors surfaced by the HTTP routes.
#[derive(Debug, Error)]
pub enum AppError {
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request clashes with the current game state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// No capacity left to serve the request.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(rejection) => AppError::Conflict(rejection.to_string()),
            ServiceError::RoomFull => AppError::ServiceUnavailable(err.to_string()),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::NotFound("room".into()), StatusCode::NOT_FOUND),
            (ServiceError::RoomFull, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
