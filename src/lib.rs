//! presign-relay library - forwards uploaded files to presigned URLs

pub mod config;
pub mod http_logger;
pub mod server;
pub mod upload;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, ConfigOptions, UploaderSettings};
pub use server::RelayServer;
pub use upload::{ForwardingUploader, UploadError, UploadRequest, UploadResult};
