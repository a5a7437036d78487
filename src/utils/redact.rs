//! Helpers for keeping presigned credentials and large bodies out of logs

use reqwest::Url;

/// Placeholder used when an error response carries no body
pub const NO_ERROR_DETAILS: &str = "No error details";

/// Maximum number of characters of a destination response kept for reporting
pub const ERROR_BODY_MAX_CHARS: usize = 200;

/// Strip the query string (where presigned signatures live) from a URL.
///
/// Unparseable input is never echoed back, since it may still hold a token.
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut out = format!("{}://", parsed.scheme());
            if let Some(host) = parsed.host_str() {
                out.push_str(host);
            }
            if let Some(port) = parsed.port() {
                out.push_str(&format!(":{}", port));
            }
            out.push_str(parsed.path());
            if parsed.query().is_some() {
                out.push_str("?<redacted>");
            }
            out
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Keep the first `max_chars` characters of `s` (UTF-8 safe)
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => s[..end].to_string(),
        None => s.to_string(),
    }
}

/// Error detail for a rejected attempt: truncated body or a placeholder
pub fn error_body_detail(body: &str) -> String {
    if body.trim().is_empty() {
        NO_ERROR_DETAILS.to_string()
    } else {
        truncate_chars(body, ERROR_BODY_MAX_CHARS)
    }
}
