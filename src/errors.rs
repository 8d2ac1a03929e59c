use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Failure taxonomy for every service operation. Translated to an HTTP
/// response at the handler boundary, exactly once per request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    /// Unknown email and wrong password collapse into this variant so the
    /// response cannot be used to probe which accounts exist.
    #[error("invalid credentials")]
    Authentication,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Database(sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        // Unique violation on users.email surfaces as a validation fault,
        // not a storage failure.
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                return ApiError::Validation("email already registered".into());
            }
        }
        ApiError::Database(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => {
                warn!(error = %msg, "validation rejected");
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Authentication => {
                warn!("authentication failed");
                StatusCode::BAD_REQUEST.into_response()
            }
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Database(e) => {
                error!(error = %e, "database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
            ApiError::Hash(e) => {
                error!(error = %e, "password hashing failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e })),
                )
                    .into_response()
            }
            ApiError::Token(e) => {
                error!(error = %e, "token signing failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
