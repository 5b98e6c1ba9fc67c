// HTTP handlers for the API server
pub mod health;
pub mod metrics;
pub mod tickets;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use boxoffice_common::BoxofficeError;
use serde_json::json;

/// Error surface for the HTTP layer: everything renders as
/// `{"error": ...}` with a status chosen per failure class.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<BoxofficeError> for ApiError {
    fn from(err: BoxofficeError) -> Self {
        let status = match &err {
            BoxofficeError::EventNotFound(_) => StatusCode::BAD_REQUEST,
            BoxofficeError::TxnConflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_failure_class() {
        let err: ApiError = BoxofficeError::EventNotFound(9).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = BoxofficeError::TxnConflict { retries: 5 }.into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = BoxofficeError::CorruptCacheEntry("x".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
