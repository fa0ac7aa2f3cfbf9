#![doc = "speechify-core: the concurrent text-to-speech batch pipeline."]

//! This crate holds the pipeline logic for speechify: the worker pool, the
//! synthesis client, the per-job result model and the run summary.
//! Flag parsing, config files, directory scanning and progress-bar rendering
//! live in the `speechify` CLI crate.
//!
//! # Usage
//! Build an [`AppConfig`], pick a [`Synthesizer`] (normally [`HttpSynthesizer`]),
//! and hand an ordered list of text files to [`WorkerPool::process_files`].
//! Feed the returned results to [`Summary`] to get the overall [`RunStatus`].

pub mod config;
pub mod contract;
pub mod pool;
pub mod report;
pub mod synthesis;

pub use config::{AppConfig, ConfigError};
pub use contract::{NoopProgress, ProcessError, ProcessResult, ProgressSink, SynthesisRequest, Synthesizer};
pub use pool::{CancelToken, WorkerPool};
pub use report::{write_summary, RunStatus, Summary};
pub use synthesis::{output_path, process_single_file, HttpSynthesizer};
