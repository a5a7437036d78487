//! Outbound HTTP Attempt Logger
//!
//! Logs every forward attempt to a file when enabled via environment variable.
//! Set `PRESIGN_RELAY_HTTP_LOG=1` or `PRESIGN_RELAY_HTTP_LOG=true` to enable.
//! Destination URLs are always written in redacted form.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing::warn;

use crate::utils::redact::{redact_url, truncate_chars};

/// Environment variable to control HTTP logging
const ENV_HTTP_LOG: &str = "PRESIGN_RELAY_HTTP_LOG";

/// Directory the log file is written to
const LOG_DIR_NAME: &str = ".presign-relay";

/// Log file name
const LOG_FILE_NAME: &str = "http_requests.log";

/// Maximum response body characters to log
const MAX_BODY_CHARS: usize = 2000;

/// Sensitive headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "set-cookie",
    "cookie",
    "x-amz-security-token",
    "x-api-key",
    "proxy-authorization",
];

/// Global mutex for thread-safe log writing
static LOG_MUTEX: Mutex<()> = Mutex::new(());

/// Check if HTTP logging is enabled
pub fn is_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_HTTP_LOG)
            .map(|v| parse_flag(&v))
            .unwrap_or(false)
    })
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes" || v == "on"
}

/// Get log file path under the working directory
fn get_log_file_path() -> PathBuf {
    let log_dir = PathBuf::from(LOG_DIR_NAME);
    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            warn!("Failed to create {} directory: {}", LOG_DIR_NAME, e);
        }
    }
    log_dir.join(LOG_FILE_NAME)
}

/// Outbound request log entry
pub struct HttpRequestLog {
    pub method: String,
    /// Already redacted destination URL
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body_len: usize,
}

/// Destination response log entry
pub struct HttpResponseLog {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Log one forward attempt
pub async fn log_request(
    attempt: u32,
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let content = format_entry(attempt, request, response, duration_ms, error);
    let write = tokio::task::spawn_blocking(move || write_log(&get_log_file_path(), &content))
        .await
        .map_err(std::io::Error::other)
        .and_then(|r| r);
    if let Err(e) = write {
        warn!("Failed to write HTTP log: {}", e);
    }
}

/// Render a log entry as text
pub fn format_entry(
    attempt: u32,
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let separator = "=".repeat(80);

    let mut log_content = String::new();
    log_content.push_str(&format!(
        "\n{}\n[{}] {} {} (attempt {})\n{}\n",
        separator, timestamp, request.method, request.url, attempt, separator
    ));

    log_content.push_str("\n--- Request Headers ---\n");
    for (name, value) in &request.headers {
        let display_value = mask_sensitive_header(name, value);
        log_content.push_str(&format!("{}: {}\n", name, display_value));
    }
    log_content.push_str(&format!(
        "\n--- Request Body ---\n<{} bytes>\n",
        request.body_len
    ));

    if let Some(resp) = response {
        log_content.push_str(&format!("\n--- Response ({}ms) ---\n", duration_ms));
        log_content.push_str(&format!("Status: {}\n", resp.status));

        log_content.push_str("\n--- Response Headers ---\n");
        for (name, value) in &resp.headers {
            let display_value = mask_sensitive_header(name, value);
            log_content.push_str(&format!("{}: {}\n", name, display_value));
        }

        if let Some(body) = &resp.body {
            log_content.push_str("\n--- Response Body ---\n");
            log_content.push_str(&format_body(body));
            log_content.push('\n');
        }
    }

    if let Some(err) = error {
        log_content.push_str(&format!("\n--- Error ({}ms) ---\n", duration_ms));
        log_content.push_str(err);
        log_content.push('\n');
    }

    log_content.push_str(&format!("\n{}\n", separator));
    log_content
}

/// Append log content to file (thread-safe)
pub fn write_log(path: &Path, content: &str) -> std::io::Result<()> {
    // Concurrent uploads must not interleave their entries
    let _guard = LOG_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Append log content off the async runtime (runs in blocking thread)
pub async fn write_log_async(path: PathBuf, content: String) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_log(&path, &content))
        .await
        .map_err(std::io::Error::other)?
}

/// Check if a header is sensitive and should be masked
fn is_sensitive_header(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    SENSITIVE_HEADERS.iter().any(|h| name_lower == *h)
}

/// Mask sensitive header values
fn mask_sensitive_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        mask_token(value)
    } else {
        value.to_string()
    }
}

/// Keep the first and last four characters of long secrets
fn mask_token(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let prefix: String = chars[..4].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "****".to_string()
    }
}

/// Format body for logging with truncation
fn format_body(body: &str) -> String {
    let total = body.chars().count();
    if total <= MAX_BODY_CHARS {
        return body.to_string();
    }
    format!(
        "{}...\n[truncated, total {} chars]",
        truncate_chars(body, MAX_BODY_CHARS),
        total
    )
}

/// Build the request entry for an attempt, or None if logging is disabled
pub fn build_request_log_if_enabled(
    url: &str,
    content_type: &str,
    body_len: usize,
) -> Option<HttpRequestLog> {
    if !is_enabled() {
        return None;
    }

    Some(HttpRequestLog {
        method: "PUT".to_string(),
        url: redact_url(url),
        headers: vec![
            ("Content-Type".to_string(), content_type.to_string()),
            ("Content-Length".to_string(), body_len.to_string()),
        ],
        body_len,
    })
}

/// Extract headers from reqwest Response
pub fn extract_response_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}
