//! Caller-side errors raised before any forward attempt is made

use hyper::StatusCode;
use thiserror::Error;

/// Errors detected while validating an upload before it is forwarded.
///
/// Destination failures never show up here; they are folded into
/// [`UploadResult::Failure`](super::UploadResult::Failure).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file was provided")]
    MissingFile,

    #[error("No upload URL was provided")]
    MissingUploadUrl,

    #[error("Invalid upload URL: {0}")]
    InvalidUploadUrl(String),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Invalid max_retries value: {0}")]
    InvalidMaxRetries(String),

    #[error("max_retries {requested} exceeds the limit of {limit}")]
    RetryLimitExceeded { requested: u32, limit: u32 },

    #[error("Malformed multipart form: {0}")]
    MalformedForm(String),

    #[error("Request body too large (max {0} bytes)")]
    BodyTooLarge(usize),
}

impl UploadError {
    /// HTTP status the relay answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
