//! Configuration module - CLI arguments and settings

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PORT: u16 = 8000;

/// Timeout of the first attempt (5 minutes)
pub const DEFAULT_BASE_TIMEOUT_SECS: u64 = 300;

/// Extra timeout granted per retry (1 minute)
pub const DEFAULT_TIMEOUT_STEP_SECS: u64 = 60;

/// Retry budget used when the client does not send one
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Highest retry budget a client may request
pub const DEFAULT_MAX_RETRIES_LIMIT: u32 = 10;

/// Maximum inbound request body size (20MB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Optional configuration parameters for Config::new()
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_timeout_secs: Option<u64>,
    pub timeout_step_secs: Option<u64>,
    pub max_retries_limit: Option<u32>,
    pub max_body_bytes: Option<usize>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub base_timeout_secs: u64,
    pub timeout_step_secs: u64,
    pub max_retries_limit: u32,
    pub max_body_bytes: usize,
}

/// Retry and timeout knobs consumed by the forwarding uploader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploaderSettings {
    /// Timeout of attempt 0
    pub base_timeout: Duration,
    /// Added to the timeout for every subsequent attempt
    pub timeout_step: Duration,
    /// Delay before the first retry; doubled for each one after it
    pub backoff_unit: Duration,
    /// Upper bound on a request's `max_retries`
    pub max_retries_limit: u32,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(DEFAULT_BASE_TIMEOUT_SECS),
            timeout_step: Duration::from_secs(DEFAULT_TIMEOUT_STEP_SECS),
            backoff_unit: Duration::from_secs(1),
            max_retries_limit: DEFAULT_MAX_RETRIES_LIMIT,
        }
    }
}

impl Config {
    /// Create a new Config, filling unset options with defaults
    pub fn new(options: ConfigOptions) -> Result<Arc<Self>> {
        let host = options
            .host
            .map(|h| h.trim().to_string())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        if host.is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }

        let base_timeout_secs = options
            .base_timeout_secs
            .unwrap_or(DEFAULT_BASE_TIMEOUT_SECS);
        if base_timeout_secs == 0 {
            return Err(anyhow!("base timeout must be at least 1 second"));
        }

        let max_body_bytes = options.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
        if max_body_bytes == 0 {
            return Err(anyhow!("max body size must be greater than 0"));
        }

        Ok(Arc::new(Self {
            host,
            port: options.port.unwrap_or(DEFAULT_PORT),
            base_timeout_secs,
            timeout_step_secs: options
                .timeout_step_secs
                .unwrap_or(DEFAULT_TIMEOUT_STEP_SECS),
            max_retries_limit: options
                .max_retries_limit
                .unwrap_or(DEFAULT_MAX_RETRIES_LIMIT),
            max_body_bytes,
        }))
    }

    /// Socket address the relay server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        // Accept bracketed IPv6 literals as well as bare ones
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        if host == "localhost" {
            return Ok(SocketAddr::from(([127, 0, 0, 1], self.port)));
        }
        let ip: IpAddr = host
            .parse()
            .map_err(|_| anyhow!("invalid bind host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Uploader settings derived from this configuration
    pub fn uploader_settings(&self) -> UploaderSettings {
        UploaderSettings {
            base_timeout: Duration::from_secs(self.base_timeout_secs),
            timeout_step: Duration::from_secs(self.timeout_step_secs),
            max_retries_limit: self.max_retries_limit,
            ..UploaderSettings::default()
        }
    }
}
