//! Upload request and result values

use hyper::body::Bytes;

use crate::config::DEFAULT_MAX_RETRIES;

/// Content type used when the client did not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single relay job: the payload and where to put it.
///
/// Built once per incoming request and never mutated afterwards; every
/// attempt sends the same `payload` buffer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    payload: Bytes,
    content_type: Option<String>,
    filename: Option<String>,
    destination_url: String,
    max_retries: u32,
}

impl UploadRequest {
    pub fn new(payload: impl Into<Bytes>, destination_url: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            content_type: None,
            filename: None,
            destination_url: destination_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the declared content type (blank values fall back to the default)
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type.filter(|ct| !ct.trim().is_empty());
        self
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Declared content type, or `application/octet-stream`
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn destination_url(&self) -> &str {
        &self.destination_url
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts this request is allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Result of one PUT against the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub succeeded: bool,
    pub http_status: Option<u16>,
    pub error_detail: Option<String>,
}

impl AttemptOutcome {
    pub fn success(status: u16) -> Self {
        Self {
            succeeded: true,
            http_status: Some(status),
            error_detail: None,
        }
    }

    /// Destination answered with a status outside the accepted set
    pub fn rejected(status: u16, detail: String) -> Self {
        Self {
            succeeded: false,
            http_status: Some(status),
            error_detail: Some(detail),
        }
    }

    /// Request never produced a response (connect error, timeout, TLS)
    pub fn transport_failure(detail: String) -> Self {
        Self {
            succeeded: false,
            http_status: None,
            error_detail: Some(detail),
        }
    }
}

/// Terminal outcome of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Success {
        http_status: u16,
        bytes_sent: usize,
        attempts_used: u32,
    },
    Failure {
        attempts_used: u32,
        last_error: String,
    },
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn attempts_used(&self) -> u32 {
        match self {
            Self::Success { attempts_used, .. } | Self::Failure { attempts_used, .. } => {
                *attempts_used
            }
        }
    }
}
