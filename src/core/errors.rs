//! Application error taxonomy.
//!
//! Every failure that reaches a channel boundary is an [`AppError`]: a closed
//! [`ErrorKind`], a short human-readable message, and a structured detail map
//! that is logged but only rendered for kinds that are safe to show.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

/// Closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic infrastructure fault (network, broker, storage engine).
    Infrastructure,
    /// Storage engine operation failed.
    Database,
    /// External API (generative backend, Telegram) failed.
    ExternalApi,
    NotFound,
    Validation,
    /// The linguistic service rejected the input.
    Linguistic,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code rendered in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure_error",
            Self::Database => "database_error",
            Self::ExternalApi => "external_api_error",
            Self::NotFound => "not_found",
            Self::Validation => "validation_error",
            Self::Linguistic => "linguistic_logic_error",
            Self::Internal => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Infrastructure | Self::Database | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ExternalApi => StatusCode::BAD_GATEWAY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Linguistic => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the failure is ours rather than the caller's or the content's.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure | Self::Database | Self::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Tagged application error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Map<String, Value>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a structured detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// JSON body: `{"error": {"code", "message", "details"?}}`.
    ///
    /// Details of infrastructure kinds stay in the logs.
    pub fn to_body(&self) -> Value {
        let mut error = serde_json::json!({
            "code": self.kind.code(),
            "message": self.message,
        });
        if !self.kind.is_infrastructure() && !self.details.is_empty() {
            error["details"] = Value::Object(self.details.clone());
        }
        serde_json::json!({ "error": error })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.kind.is_infrastructure() {
            let details = Value::Object(self.details.clone());
            tracing::error!(
                code = self.kind.code(),
                message = %self.message,
                details = %details,
                "Application error occurred"
            );
        } else {
            tracing::warn!(code = self.kind.code(), message = %self.message, "Request rejected");
        }
        (self.kind.status_code(), Json(self.to_body())).into_response()
    }
}
