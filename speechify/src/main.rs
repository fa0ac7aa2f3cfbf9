use clap::error::ErrorKind;
use clap::Parser;
use speechify::cli::{run_with_cancel, Cli};
use speechify_core::CancelToken;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment (SPEECHIFY_SERVER_URL may come from a .env file)
    dotenvy::dotenv().ok();

    // Usage errors must not collide with the partial-failure exit code.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    // RUST_LOG wins; otherwise quiet unless --verbose.
    let default_filter = if cli.verbose() {
        "speechify=debug,speechify_core=debug"
    } else {
        "speechify=warn,speechify_core=error"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; skipping remaining jobs");
            on_interrupt.cancel();
        }
    });

    match run_with_cancel(cli, cancel).await {
        Ok(status) => {
            tracing::info!(?status, "CLI completed");
            ExitCode::from(status.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
