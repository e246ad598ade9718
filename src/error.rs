//! Closed error-kind set shared by every component and surfaced verbatim
//! over HTTP and streaming channels as `{kind, message, context}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error, Clone)]
pub enum AppError {
    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("name conflict: {message}")]
    ConflictName { message: String },

    #[error("port conflict: {message}")]
    ConflictPort { message: String },

    #[error("invalid path: {message}")]
    InvalidPath { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("server not running: {message}")]
    NotRunning { message: String },

    #[error("server already running: {message}")]
    AlreadyRunning { message: String },

    #[error("server already stopped: {message}")]
    AlreadyStopped { message: String },

    #[error("catalog disabled: {message}")]
    CatalogDisabled { message: String },

    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("download too large: {message}")]
    DownloadTooLarge { message: String },

    #[error("checksum mismatch: {message}")]
    ChecksumMismatch { message: String },

    #[error("installer failed: {message}")]
    InstallerFailed { message: String, stderr_tail: String },

    #[error("manifest missing: {message}")]
    ManifestMissing { message: String },

    #[error("manifest invalid: {message}")]
    ManifestInvalid { message: String },

    #[error("unknown session: {message}")]
    UnknownSession { message: String },

    #[error("slow consumer: {message}")]
    SlowConsumer { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("cancelled by caller: {message}")]
    CancelledByCaller { message: String },

    #[error("internal error")]
    Internal { message: String },
}

impl AppError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        // Internal assertions never surface their raw text to callers.
        tracing::error!("internal error: {}", err);
        AppError::Internal {
            message: "an internal error occurred".to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NotFound",
            AppError::ConflictName { .. } => "ConflictName",
            AppError::ConflictPort { .. } => "ConflictPort",
            AppError::InvalidPath { .. } => "InvalidPath",
            AppError::InvalidRequest { .. } => "InvalidRequest",
            AppError::NotRunning { .. } => "NotRunning",
            AppError::AlreadyRunning { .. } => "AlreadyRunning",
            AppError::AlreadyStopped { .. } => "AlreadyStopped",
            AppError::CatalogDisabled { .. } => "CatalogDisabled",
            AppError::UpstreamUnavailable { .. } => "UpstreamUnavailable",
            AppError::DownloadTooLarge { .. } => "DownloadTooLarge",
            AppError::ChecksumMismatch { .. } => "ChecksumMismatch",
            AppError::InstallerFailed { .. } => "InstallerFailed",
            AppError::ManifestMissing { .. } => "ManifestMissing",
            AppError::ManifestInvalid { .. } => "ManifestInvalid",
            AppError::UnknownSession { .. } => "UnknownSession",
            AppError::SlowConsumer { .. } => "SlowConsumer",
            AppError::Timeout { .. } => "Timeout",
            AppError::CancelledByCaller { .. } => "CancelledByCaller",
            AppError::Internal { .. } => "Internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } | AppError::UnknownSession { .. } => StatusCode::NOT_FOUND,
            AppError::ConflictName { .. }
            | AppError::ConflictPort { .. }
            | AppError::NotRunning { .. }
            | AppError::AlreadyRunning { .. }
            | AppError::AlreadyStopped { .. }
            | AppError::SlowConsumer { .. } => StatusCode::CONFLICT,
            AppError::InvalidPath { .. } | AppError::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::CatalogDisabled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamUnavailable { .. }
            | AppError::ChecksumMismatch { .. }
            | AppError::InstallerFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::DownloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ManifestMissing { .. } | AppError::ManifestInvalid { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            // 499 is nonstandard but used consistently across this crate's responses.
            AppError::CancelledByCaller { .. } => StatusCode::from_u16(499).unwrap(),
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub context: HashMap<String, String>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        let mut context = HashMap::new();
        if let AppError::InstallerFailed { stderr_tail, .. } = err {
            context.insert("stderr_tail".to_string(), stderr_tail.clone());
        }
        ErrorBody {
            kind: err.kind(),
            message: err.message(),
            context,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body: ErrorBody = (&self).into();
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound {
                message: "record not found".to_string(),
            },
            other => AppError::internal(other),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound {
                message: err.to_string(),
            }
        } else {
            AppError::internal(err)
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout {
                message: err.to_string(),
            }
        } else {
            AppError::UpstreamUnavailable {
                message: err.to_string(),
            }
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidRequest {
            message: format!("invalid id: {}", err),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ManifestInvalid {
            message: err.to_string(),
        }
    }
}
