//! Forwarding uploader - PUTs a payload to a presigned URL with retry and backoff

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use anyhow::Result;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::{error, info, warn};

use super::error::UploadError;
use super::request::{AttemptOutcome, UploadRequest, UploadResult};
use crate::config::UploaderSettings;
use crate::http_logger::{self, HttpResponseLog};
use crate::utils::redact::{error_body_detail, redact_url};

/// Status codes a presigned PUT endpoint answers with on success
pub const ACCEPTED_STATUSES: [u16; 3] = [200, 201, 204];

/// Whether a destination status counts as a successful upload
pub fn is_accepted_status(status: u16) -> bool {
    ACCEPTED_STATUSES.contains(&status)
}

/// Timeout for attempt `attempt` (0-indexed): base plus one step per retry
pub fn attempt_timeout(settings: &UploaderSettings, attempt: u32) -> Duration {
    settings
        .timeout_step
        .checked_mul(attempt)
        .and_then(|extra| settings.base_timeout.checked_add(extra))
        .unwrap_or(Duration::MAX)
}

/// Delay after failed attempt `attempt` (0-indexed): `unit * 2^attempt`
pub fn backoff_delay(settings: &UploaderSettings, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| settings.backoff_unit.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// States of the attempt loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    Attempting(u32),
    Waiting(u32),
    Succeeded { attempt: u32, status: u16 },
    Exhausted,
}

/// Relays payloads to presigned URLs.
///
/// Holds no per-upload state, so one instance is shared by every request
/// handler.
pub struct ForwardingUploader {
    client: Client,
    settings: UploaderSettings,
}

impl ForwardingUploader {
    pub fn new(settings: UploaderSettings) -> Result<Self> {
        // No idle pooling: every attempt opens and releases its own connection
        let client = Client::builder().pool_max_idle_per_host(0).build()?;
        Ok(Self { client, settings })
    }

    /// Check a request without touching the network
    pub fn validate(&self, request: &UploadRequest) -> Result<Url, UploadError> {
        let raw_url = request.destination_url().trim();
        if raw_url.is_empty() {
            return Err(UploadError::MissingUploadUrl);
        }

        let url = Url::parse(raw_url).map_err(|e| UploadError::InvalidUploadUrl(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UploadError::InvalidUploadUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        if HeaderValue::from_str(request.content_type()).is_err() {
            return Err(UploadError::InvalidContentType(
                request.content_type().to_string(),
            ));
        }

        if request.max_retries() > self.settings.max_retries_limit {
            return Err(UploadError::RetryLimitExceeded {
                requested: request.max_retries(),
                limit: self.settings.max_retries_limit,
            });
        }

        Ok(url)
    }

    /// Upload the payload, retrying failed attempts with exponential backoff.
    ///
    /// Only validation problems are returned as `Err`; destination failures
    /// end up in [`UploadResult::Failure`].
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, UploadError> {
        let url = self.validate(request)?;
        let max_attempts = request.max_attempts();

        info!(
            "Forwarding {} bytes ({}) to {}",
            request.payload().len(),
            request.content_type(),
            redact_url(request.destination_url())
        );

        let mut last_error = String::new();
        let mut state = AttemptState::Attempting(0);

        loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    let outcome = self.attempt(&url, request, attempt).await;
                    match outcome.http_status {
                        Some(status) if outcome.succeeded => {
                            AttemptState::Succeeded { attempt, status }
                        }
                        _ => {
                            last_error = outcome.error_detail.unwrap_or_default();
                            warn!(
                                "Upload attempt {}/{} failed: {}",
                                attempt + 1,
                                max_attempts,
                                last_error
                            );
                            if attempt < request.max_retries() {
                                AttemptState::Waiting(attempt)
                            } else {
                                AttemptState::Exhausted
                            }
                        }
                    }
                }
                AttemptState::Waiting(attempt) => {
                    let delay = backoff_delay(&self.settings, attempt);
                    info!("Retrying in {}...", format_duration(delay));
                    tokio::time::sleep(delay).await;
                    AttemptState::Attempting(attempt + 1)
                }
                AttemptState::Succeeded { attempt, status } => {
                    info!(
                        "Upload succeeded with HTTP {} (attempt {}/{})",
                        status,
                        attempt + 1,
                        max_attempts
                    );
                    return Ok(UploadResult::Success {
                        http_status: status,
                        bytes_sent: request.payload().len(),
                        attempts_used: attempt + 1,
                    });
                }
                AttemptState::Exhausted => {
                    error!(
                        "All {} upload attempts failed. Last error: {}",
                        max_attempts, last_error
                    );
                    return Ok(UploadResult::Failure {
                        attempts_used: max_attempts,
                        last_error,
                    });
                }
            };
        }
    }

    /// Issue one PUT and classify the response
    async fn attempt(&self, url: &Url, request: &UploadRequest, attempt: u32) -> AttemptOutcome {
        let timeout = attempt_timeout(&self.settings, attempt);
        let payload = request.payload();

        info!(
            "Upload attempt {}/{} (timeout {})",
            attempt + 1,
            request.max_attempts(),
            format_duration(timeout)
        );

        let log_entry = http_logger::build_request_log_if_enabled(
            request.destination_url(),
            request.content_type(),
            payload.len(),
        );
        let start = Instant::now();

        let result = self
            .client
            .put(url.clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, request.content_type())
            .header(CONTENT_LENGTH, payload.len())
            .body(payload.clone())
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = if log_entry.is_some() {
                    http_logger::extract_response_headers(&response)
                } else {
                    Vec::new()
                };

                if is_accepted_status(status) {
                    if let Some(entry) = &log_entry {
                        let resp_log = HttpResponseLog {
                            status,
                            headers,
                            body: None,
                        };
                        http_logger::log_request(
                            attempt + 1,
                            entry,
                            Some(&resp_log),
                            elapsed_ms(start),
                            None,
                        )
                        .await;
                    }
                    return AttemptOutcome::success(status);
                }

                let body = response.text().await.unwrap_or_default();
                let detail = format!("HTTP {}: {}", status, error_body_detail(&body));

                if let Some(entry) = &log_entry {
                    let resp_log = HttpResponseLog {
                        status,
                        headers,
                        body: Some(body),
                    };
                    http_logger::log_request(
                        attempt + 1,
                        entry,
                        Some(&resp_log),
                        elapsed_ms(start),
                        None,
                    )
                    .await;
                }

                AttemptOutcome::rejected(status, detail)
            }
            Err(e) => {
                let detail = describe_transport_error(e, timeout);
                if let Some(entry) = &log_entry {
                    http_logger::log_request(
                        attempt + 1,
                        entry,
                        None,
                        elapsed_ms(start),
                        Some(&detail),
                    )
                    .await;
                }
                AttemptOutcome::transport_failure(detail)
            }
        }
    }
}

/// Describe a transport error without leaking the (signed) request URL
fn describe_transport_error(err: reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        return format!("request timed out after {}", format_duration(timeout));
    }

    let err = err.without_url();
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Render whole seconds as `5s`, anything finer as `250ms`
fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
