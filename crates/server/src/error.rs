use axum::{
    Json,
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::{event::EventError, payment::PaymentError};
use serde_json::{Value, json};
use thiserror::Error;
use utils::{
    pagination::PaginationError,
    response::{ErrorBody, FieldError},
};

use crate::auth::{JwtError, password::PasswordError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Attached to error responses so the development-mode layer can add a `stack`.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub body: ErrorBody,
    pub detail: String,
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>, value: Value) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message, value)])
    }

    pub fn forbidden(message: &str) -> Self {
        ApiError::Forbidden(message.to_string())
    }

    pub fn not_found(resource: &str) -> Self {
        ApiError::NotFound(format!("{resource} not found"))
    }

    fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("Validation failed").with_errors(errors.clone()),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg.clone())),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorBody::new(msg.clone()))
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorBody::new(msg.clone())),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::new(msg.clone())),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, ErrorBody::new(msg.clone())),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody::new("Request body too large"),
            ),
            ApiError::Database(error) => database_status(error),
            ApiError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new("Invalid or expired token"),
            ),
            ApiError::Password(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Internal server error"),
            ),
        }
    }
}

fn database_status(error: &sqlx::Error) -> (StatusCode, ErrorBody) {
    match error {
        sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, ErrorBody::new("Resource not found")),
        sqlx::Error::Database(db) if db.is_unique_violation() => (
            StatusCode::CONFLICT,
            ErrorBody::new("Resource already exists"),
        ),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Referenced resource does not exist"),
        ),
        sqlx::Error::Database(db) if db.is_check_violation() => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Value violates a data constraint"),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Internal server error"),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }

        let report = ErrorReport {
            body: body.clone(),
            detail: format!("{self:?}"),
        };
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::NotFound => ApiError::not_found("Event"),
            EventError::Full => ApiError::Conflict("Event is at capacity".to_string()),
            EventError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound => ApiError::not_found("Payment"),
            PaymentError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            PaymentError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<PaginationError> for ApiError {
    fn from(err: PaginationError) -> Self {
        let value = match &err {
            PaginationError::InvalidPage(page) => json!(page),
            PaginationError::InvalidLimit(limit) => json!(limit),
            PaginationError::InvalidSort(sort) => json!(sort),
        };
        ApiError::validation(err.field(), err.to_string(), value)
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::validation("params", rejection.body_text(), Value::Null)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation("query", rejection.body_text(), Value::Null)
    }
}
