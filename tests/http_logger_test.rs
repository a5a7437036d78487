//! Tests for http_logger module

use presign_relay::http_logger::{
    format_entry, write_log, write_log_async, HttpRequestLog, HttpResponseLog,
};
use presign_relay::utils::redact::redact_url;
use tempfile::TempDir;

fn request_log(url: &str) -> HttpRequestLog {
    HttpRequestLog {
        method: "PUT".to_string(),
        url: redact_url(url),
        headers: vec![
            ("Content-Type".to_string(), "application/octet-stream".to_string()),
            ("Authorization".to_string(), "Bearer abcdefghijklmnop".to_string()),
        ],
        body_len: 1024,
    }
}

#[test]
fn test_entry_masks_sensitive_headers() {
    let entry = format_entry(
        1,
        &request_log("https://storage.example.com/obj?token=eyJhbGciOi"),
        None,
        12,
        None,
    );
    assert!(entry.contains("Authorization: Bear...mnop"));
    assert!(!entry.contains("abcdefghijklmnop"));
    assert!(!entry.contains("eyJhbGciOi"));
}

#[test]
fn test_entry_with_transport_error() {
    let entry = format_entry(
        3,
        &request_log("http://127.0.0.1:9/obj"),
        None,
        250,
        Some("tcp connect error: Connection refused"),
    );
    assert!(entry.contains("(attempt 3)"));
    assert!(entry.contains("--- Error (250ms) ---"));
    assert!(entry.contains("Connection refused"));
    assert!(!entry.contains("--- Response"));
}

#[test]
fn test_entry_with_response() {
    let response = HttpResponseLog {
        status: 500,
        headers: vec![("x-amz-request-id".to_string(), "REQ123".to_string())],
        body: Some("InternalError".to_string()),
    };
    let entry = format_entry(
        2,
        &request_log("https://storage.example.com/obj"),
        Some(&response),
        40,
        None,
    );
    assert!(entry.contains("--- Response (40ms) ---"));
    assert!(entry.contains("Status: 500"));
    assert!(entry.contains("x-amz-request-id: REQ123"));
    assert!(entry.contains("InternalError"));
}

#[test]
fn test_write_log_creates_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("http_requests.log");

    write_log(&path, "entry\n").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "entry\n");
}

#[test]
fn test_write_log_missing_directory_errors() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing").join("http_requests.log");

    assert!(write_log(&path, "entry\n").is_err());
}

#[tokio::test]
async fn test_write_log_async_appends_from_runtime() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("http_requests.log");

    write_log_async(path.clone(), "first\n".to_string()).await.unwrap();
    write_log_async(path.clone(), "second\n".to_string()).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[tokio::test]
async fn test_write_log_async_reports_io_errors() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing").join("http_requests.log");

    assert!(write_log_async(path, "entry\n".to_string()).await.is_err());
}
