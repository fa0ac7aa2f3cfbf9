//! # contract: the seams of the pipeline
//!
//! Plain data and traits shared by the worker pool, the synthesis client and
//! the reporter.
//!
//! - [`Synthesizer`] turns one [`SynthesisRequest`] into audio bytes. The real
//!   implementation is [`crate::synthesis::HttpSynthesizer`]; tests use the
//!   generated `MockSynthesizer`.
//! - [`ProgressSink`] receives one tick per finished job. Rendering is left to
//!   the caller (the CLI draws a bar, verbose runs use [`NoopProgress`]).
//! - [`ProcessResult`] is the per-job outcome record, [`ProcessError`] its
//!   failure taxonomy.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; the mocks are exported under the
//! `test-export-mocks` feature so integration tests and downstream crates can
//! use them.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use thiserror::Error;

/// Body of `POST {server_url}/synthesize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisRequest {
    /// Full contents of the source file.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_description: Option<String>,
}

/// Why a single job failed. Attached to that job's [`ProcessResult`]; never
/// propagated past the worker.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Source file missing or unreadable.
    #[error("failed to read file: {0}")]
    Read(#[source] std::io::Error),

    /// Connection refused, DNS failure, reset, or a broken body stream.
    #[error("failed to send request: {0}")]
    Request(String),

    /// The configured timeout elapsed before the full response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Any response other than 200. The body is kept verbatim.
    #[error("server returned status {status}: {body}")]
    Server { status: u16, body: String },

    /// Destination could not be created or written.
    #[error("failed to write MP3 file: {0}")]
    Write(#[source] std::io::Error),

    /// The run was cancelled before this job finished its network call.
    #[error("cancelled before completion")]
    Cancelled,

    /// The worker holding this job stopped without reporting a result.
    #[error("worker aborted: {0}")]
    Aborted(String),
}

impl ProcessError {
    /// Stable short name of the failure class.
    pub fn category(&self) -> &'static str {
        match self {
            ProcessError::Read(_) => "read",
            ProcessError::Request(_) => "request",
            ProcessError::Timeout(_) => "timeout",
            ProcessError::Server { .. } => "server",
            ProcessError::Write(_) => "write",
            ProcessError::Cancelled => "cancelled",
            ProcessError::Aborted(_) => "aborted",
        }
    }
}

/// Outcome of one job.
///
/// `error` is `None` exactly when `destination_path` is `Some` and names a
/// fully written file.
#[derive(Debug)]
pub struct ProcessResult {
    pub source_path: PathBuf,
    pub destination_path: Option<PathBuf>,
    pub duration: Duration,
    pub error: Option<ProcessError>,
}

impl ProcessResult {
    pub fn from_outcome(
        source_path: PathBuf,
        outcome: Result<PathBuf, ProcessError>,
        duration: Duration,
    ) -> Self {
        match outcome {
            Ok(destination) => Self {
                source_path,
                destination_path: Some(destination),
                duration,
                error: None,
            },
            Err(error) => Self {
                source_path,
                destination_path: None,
                duration,
                error: Some(error),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Base name of the source file, for log lines and the summary.
    pub fn file_name(&self) -> Cow<'_, str> {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.source_path.to_string_lossy())
    }
}

/// One HTTP round trip against the synthesis endpoint.
///
/// Implementations must bound the call by their own timeout and map it to
/// [`ProcessError::Timeout`]; only `Request`, `Timeout` and `Server` are
/// expected from here.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProcessError>;
}

/// Receives progress ticks from the workers. Called concurrently.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ProgressSink: Send + Sync {
    /// One job finished, successfully or not.
    fn inc(&self);
    /// All jobs are accounted for.
    fn finish(&self);
}

/// Progress sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn inc(&self) {}
    fn finish(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_voice_description() {
        let req = SynthesisRequest {
            text: "hello".into(),
            voice_description: None,
        };
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"text":"hello"}"#);

        let req = SynthesisRequest {
            text: "hello".into(),
            voice_description: Some("warm".into()),
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"text":"hello","voice_description":"warm"}"#
        );
    }

    #[test]
    fn result_from_outcome_keeps_error_and_destination_exclusive() {
        let ok = ProcessResult::from_outcome(
            "a/book.txt".into(),
            Ok("a/book.mp3".into()),
            Duration::from_millis(5),
        );
        assert!(ok.is_success());
        assert_eq!(ok.destination_path.as_deref(), Some(std::path::Path::new("a/book.mp3")));
        assert_eq!(ok.file_name(), "book.txt");

        let failed = ProcessResult::from_outcome(
            "a/book.txt".into(),
            Err(ProcessError::Server {
                status: 503,
                body: "busy".into(),
            }),
            Duration::from_millis(5),
        );
        assert!(!failed.is_success());
        assert!(failed.destination_path.is_none());
        let error = failed.error.as_ref().unwrap();
        assert_eq!(error.category(), "server");
        assert_eq!(error.to_string(), "server returned status 503: busy");
    }
}
