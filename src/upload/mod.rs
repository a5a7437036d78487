//! Forwarding uploader and its request/result types

pub mod error;
pub mod request;
pub mod uploader;

pub use error::UploadError;
pub use request::{AttemptOutcome, UploadRequest, UploadResult, DEFAULT_CONTENT_TYPE};
pub use uploader::{
    attempt_timeout, backoff_delay, is_accepted_status, ForwardingUploader, ACCEPTED_STATUSES,
};
