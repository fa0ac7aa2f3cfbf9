pub mod cli;
pub mod load_config;
pub mod progress;
pub mod scanner;

pub use cli::{run, run_with_cancel, Cli, Commands};
