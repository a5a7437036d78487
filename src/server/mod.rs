//! HTTP front end: routing, multipart parsing and response mapping

pub mod http;
pub mod multipart;

pub use http::{handle_request, AppState, RelayServer, ROUTE_UPLOAD, ROUTE_UPLOAD_RETRY};
pub use multipart::{read_upload_form, FilePart, UploadForm};
