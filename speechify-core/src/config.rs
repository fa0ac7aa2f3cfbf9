use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

/// Validated, immutable settings for one run.
///
/// Built once through [`AppConfig::new`] and then shared read-only with every
/// worker. Fields are private so a constructed value is always valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    workers: usize,
    server_url: String,
    timeout: Duration,
    verbose: bool,
    voice_description: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be at least 1")]
    InvalidWorkers,
    #[error("server url cannot be empty")]
    EmptyServerUrl,
    #[error("timeout must be greater than zero")]
    InvalidTimeout,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl AppConfig {
    /// Validates the values and normalizes the server url (trailing slashes
    /// are stripped so `{server_url}/synthesize` is well formed).
    pub fn new(
        workers: usize,
        server_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if workers < 1 {
            return Err(ConfigError::InvalidWorkers);
        }
        let server_url = server_url.into().trim().trim_end_matches('/').to_string();
        if server_url.is_empty() {
            return Err(ConfigError::EmptyServerUrl);
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(Self {
            workers,
            server_url,
            timeout,
            verbose: false,
            voice_description: None,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Voice description sent along with every request. Blank values are ignored.
    pub fn with_voice_description(mut self, voice: Option<String>) -> Self {
        self.voice_description = voice.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn voice_description(&self) -> Option<&str> {
        self.voice_description.as_deref()
    }

    /// Full url of the synthesis endpoint.
    pub fn synthesize_url(&self) -> String {
        format!("{}/synthesize", self.server_url)
    }

    pub fn trace_loaded(&self) {
        info!(
            workers = self.workers,
            server_url = %self.server_url,
            timeout_secs = self.timeout.as_secs_f64(),
            verbose = self.verbose,
            "Loaded AppConfig"
        );
        debug!(?self, "AppConfig loaded (full debug)");
    }
}
