//! Error taxonomy shared by the ingestion pipeline and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by source loading, metric computation, and request
/// handling.
#[derive(Error, Debug)]
pub enum Error {
    /// The file exists but cannot be understood as delimited text.
    #[error("format error in {path}: {reason}")]
    Format { path: String, reason: String },

    /// A referenced source, folder, column, or finder does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A special metric could not be evaluated.
    #[error("cannot compute {metric}: {reason}")]
    Compute { metric: String, reason: String },

    /// The request itself is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn format(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn compute(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Compute {
            metric: metric.into(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Format { .. } | Error::Compute { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
