///
/// This module implements the command-line interface for speechify: flag
/// parsing, validation of the merged configuration, and the batch run itself.
///
/// All pipeline logic (worker pool, synthesis client, result model) lives in
/// the [`speechify-core`] crate. This module wires the pieces together:
/// config file → flags → [`AppConfig`] → scanner → [`WorkerPool`] → summary.
///
/// ## How To Use
/// - For command-line users: run the `speechify` binary with `--help`.
/// - For programmatic/integration use: call [`run`] (or [`run_with_cancel`])
///   with a constructed [`Cli`]; the returned [`RunStatus`] maps to the exit code.
///
/// [`speechify-core`]: ../../speechify_core/
use crate::load_config::{executable_dir, load_or_default, ClientConfig, EXAMPLE_CONFIG_FILE_NAME};
use crate::{progress, scanner};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use speechify_core::{write_summary, AppConfig, CancelToken, HttpSynthesizer, RunStatus, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI for speechify: turn a folder of text files into MP3 audio.
#[derive(Parser, Debug)]
#[clap(
    name = "speechify",
    version,
    about = "Convert text files to MP3 using a remote speech synthesis server"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert every .txt file in a directory into an .mp3 next to it
    Convert(ConvertArgs),
    /// Write an annotated example configuration file
    InitConfig {
        /// Where to write the example (defaults to config.example.json next to the binary)
        #[clap(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Root directory to scan for .txt files
    #[clap(long)]
    pub scan: PathBuf,
    /// Search subdirectories recursively
    #[clap(long)]
    pub recursive: bool,
    /// Number of parallel workers
    #[clap(long, allow_hyphen_values = true)]
    pub workers: Option<i64>,
    /// Synthesis server URL
    #[clap(long, env = "SPEECHIFY_SERVER_URL")]
    pub server: Option<String>,
    /// HTTP request timeout in seconds
    #[clap(long, allow_hyphen_values = true)]
    pub timeout: Option<i64>,
    /// Voice description sent with every request
    #[clap(long)]
    pub voice: Option<String>,
    /// Skip files whose .mp3 already exists
    #[clap(long)]
    pub skip_existing: bool,
    /// Enable detailed logging and itemized failures
    #[clap(long, short)]
    pub verbose: bool,
    /// Path to a JSON or YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Convert(args) => args.verbose,
            Commands::InitConfig { .. } => false,
        }
    }
}

/// Merges flags over file values and validates the result. Flags always win.
pub fn build_app_config(args: &ConvertArgs, file: &ClientConfig) -> Result<AppConfig> {
    let workers = args.workers.unwrap_or(file.workers);
    if workers < 1 {
        bail!("workers must be at least 1");
    }
    let timeout = args.timeout.unwrap_or(file.timeout);
    if timeout < 1 {
        bail!("timeout must be at least 1 second");
    }
    let server_url = args.server.clone().unwrap_or_else(|| file.server_url.clone());
    let voice = args.voice.clone().or_else(|| file.voice_description.clone());

    let config = AppConfig::new(
        usize::try_from(workers).context("workers out of range")?,
        server_url,
        Duration::from_secs(timeout as u64),
    )?
    .with_verbose(args.verbose)
    .with_voice_description(voice);
    Ok(config)
}

/// Async CLI entrypoint for integration tests and main(). No cancellation.
pub async fn run(cli: Cli) -> Result<RunStatus> {
    run_with_cancel(cli, CancelToken::new()).await
}

/// Like [`run`], with a token the caller can trigger (main wires it to Ctrl-C).
pub async fn run_with_cancel(cli: Cli, cancel: CancelToken) -> Result<RunStatus> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Convert(args) => convert(args, cancel).await,
        Commands::InitConfig { path } => {
            let path = match path {
                Some(path) => path,
                None => executable_dir()
                    .context("Could not determine executable directory; pass --path")?
                    .join(EXAMPLE_CONFIG_FILE_NAME),
            };
            crate::load_config::write_example_config(&path)?;
            println!("Wrote example config to {}", path.display());
            Ok(RunStatus::Success)
        }
    }
}

async fn convert(args: ConvertArgs, cancel: CancelToken) -> Result<RunStatus> {
    if !args.scan.exists() {
        bail!("scan path does not exist: {}", args.scan.display());
    }
    let file_config = load_or_default(args.config.as_deref())?;
    let config = build_app_config(&args, &file_config)?;
    config.trace_loaded();

    let discovered = scanner::discover_files(&args.scan, args.recursive)
        .context("failed to scan files")?;
    let files = if args.skip_existing {
        let (pending, converted) = scanner::partition_converted(discovered);
        if !converted.is_empty() {
            println!("Skipped {} already converted file(s)", converted.len());
        }
        pending
    } else {
        discovered
    };

    if files.is_empty() {
        println!("No .txt files found");
        return Ok(RunStatus::Success);
    }
    println!("Found {} text file(s)", files.len());

    let progress = progress::for_run(files.len(), config.verbose());
    let synthesizer = HttpSynthesizer::new(&config)?;
    let verbose = config.verbose();
    let pool = WorkerPool::new(Arc::new(config), Arc::new(synthesizer))
        .with_progress(progress)
        .with_cancel_token(cancel);

    let results = pool.process_files(files).await;

    let summary = write_summary(&mut std::io::stdout().lock(), &results, verbose)
        .context("failed to print summary")?;
    let status = summary.status();
    tracing::info!(
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        ?status,
        "Run complete"
    );
    Ok(status)
}
