//! Relay error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the relay service to its callers
///
/// A failed dispatch is not an error: the dispatcher reports exhaustion
/// through its outcome's `ok` flag. These variants cover what prevents a
/// dispatch from happening at all.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("No API keys configured. Add one with `gemini-relay keys add <KEY>`.")]
    NoKeysConfigured,

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            RelayError::NoKeysConfigured => (
                StatusCode::BAD_REQUEST,
                "configuration_error",
                self.to_string(),
            ),
            RelayError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            type_: "error".to_string(),
            error: ErrorDetail {
                type_: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "type")]
    type_: String,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    type_: String,
    message: String,
}
