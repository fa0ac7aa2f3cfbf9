//! Synthesis client: one text file in, one MP3 file out.
//!
//! [`process_single_file`] is the per-job step run by every worker:
//! read the source → build a [`SynthesisRequest`] → call the [`Synthesizer`]
//! under the configured timeout → write the audio next to the source.
//! [`HttpSynthesizer`] is the reqwest-backed [`Synthesizer`] that talks to
//! `POST {server_url}/synthesize`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::{AppConfig, ConfigError};
use crate::contract::{ProcessError, SynthesisRequest, Synthesizer};
use crate::pool::CancelToken;

/// HTTP client for the synthesis endpoint.
pub struct HttpSynthesizer {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSynthesizer {
    /// Builds a client whose total request timeout (connect through end of
    /// body) is the configured timeout.
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("speechify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.synthesize_url(),
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, error: reqwest::Error) -> ProcessError {
        if error.is_timeout() {
            ProcessError::Timeout(self.timeout)
        } else {
            ProcessError::Request(error_chain(&error))
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProcessError> {
        debug!(
            endpoint = %self.endpoint,
            text_len = request.text.len(),
            "Sending synthesis request"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) if e.is_timeout() => return Err(ProcessError::Timeout(self.timeout)),
                Err(e) => format!("<unreadable body: {e}>"),
            };
            warn!(status = status.as_u16(), endpoint = %self.endpoint, "Synthesis request rejected");
            return Err(ProcessError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await.map_err(|e| self.classify(e))?;
        debug!(bytes = audio.len(), "Received synthesized audio");
        Ok(audio.to_vec())
    }
}

/// Joins an error and its sources into one line; reqwest keeps the useful
/// part (connection refused, dns) in the source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Destination for a source file: the final extension replaced by `.mp3`
/// (`chapter1.txt` → `chapter1.mp3`, `file.txt.backup` → `file.txt.mp3`).
pub fn output_path(source: &Path) -> PathBuf {
    source.with_extension("mp3")
}

/// Converts one source file into an MP3 next to it.
///
/// Cancellation is honoured before the read and while waiting on the
/// synthesizer; once audio is in hand the write always runs to completion.
pub async fn process_single_file<S>(
    path: &Path,
    synthesizer: &S,
    config: &AppConfig,
    cancel: &CancelToken,
) -> Result<PathBuf, ProcessError>
where
    S: Synthesizer + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let content = tokio::fs::read(path).await.map_err(ProcessError::Read)?;
    let text = String::from_utf8(content)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    let request = SynthesisRequest {
        text,
        voice_description: config.voice_description().map(str::to_owned),
    };

    let audio = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProcessError::Cancelled),
        outcome = tokio::time::timeout(config.timeout(), synthesizer.synthesize(&request)) => {
            match outcome {
                Ok(result) => result?,
                Err(_) => return Err(ProcessError::Timeout(config.timeout())),
            }
        }
    };

    let destination = output_path(path);
    write_atomically(&destination, audio).await?;
    Ok(destination)
}

/// Writes into a temporary sibling file and renames it over `destination`,
/// so a failed write never leaves a truncated or half-replaced file.
async fn write_atomically(destination: &Path, audio: Vec<u8>) -> Result<(), ProcessError> {
    let destination = destination.to_path_buf();
    let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".speechify-")
            .suffix(".part")
            .tempfile_in(&dir)?;
        tmp.write_all(&audio)?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(&destination).map_err(|e| e.error)?;
        Ok(())
    })
    .await;

    match written {
        Ok(result) => result.map_err(ProcessError::Write),
        Err(join_error) => Err(ProcessError::Write(std::io::Error::other(join_error))),
    }
}
