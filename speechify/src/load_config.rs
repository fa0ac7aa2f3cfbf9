/// `load_config` module: reads the optional client config file (JSON or YAML) and
/// turns it into sanitized defaults for the command line.
///
/// # Responsibilities
/// - Locate the config file (`--config`, else `config.json` next to the executable)
/// - Parse JSON or YAML (chosen by file extension) into [`ClientConfig`]
/// - Repair out-of-range values with a warning, reject an empty server url
/// - Write an example config on request, or when the default file is missing
///
/// Command-line flags are applied on top of the returned values by the CLI;
/// the file only supplies defaults.
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path in the message.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: i64 = 600;
pub const DEFAULT_WORKERS: i64 = 1;
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const EXAMPLE_CONFIG_FILE_NAME: &str = "config.example.json";

/// Values read from the config file. Timeout is in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    #[serde(default = "default_workers")]
    pub workers: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_description: Option<String>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_workers() -> i64 {
    DEFAULT_WORKERS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            timeout: DEFAULT_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            voice_description: None,
        }
    }
}

/// Loads and sanitizes a config file. Any read or parse failure is an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let is_yaml = path_ref
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let parsed: ClientConfig = if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            anyhow!("Failed to parse config YAML {:?}: {e}", path_ref)
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config JSON");
            anyhow!("Failed to parse config JSON {:?}: {e}", path_ref)
        })?
    };

    let config = sanitize(parsed)?;
    info!(config_path = ?path_ref, "Configuration loaded successfully");
    Ok(config)
}

/// Resolves the config for a run.
///
/// An explicit path must load. Without one, `config.json` next to the
/// executable is tried; if it is missing an example file is dropped beside it
/// and defaults are used, and if it is broken defaults are used with a warning.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ClientConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    match executable_dir() {
        Some(dir) => Ok(load_from_dir(&dir)),
        None => {
            warn!("Could not determine executable directory; using default configuration");
            Ok(ClientConfig::default())
        }
    }
}

/// Implicit lookup of `config.json` in `dir`. Never fails: a missing file
/// drops `config.example.json` beside it (if absent) and yields defaults, and
/// a broken file yields defaults with a warning.
pub fn load_from_dir(dir: &Path) -> ClientConfig {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        info!(config_path = ?config_path, "Config file not found; using default configuration");
        let example_path = dir.join(EXAMPLE_CONFIG_FILE_NAME);
        if !example_path.exists() {
            match write_example_config(&example_path) {
                Ok(()) => info!(path = ?example_path, "Created example config"),
                Err(e) => warn!(error = %e, path = ?example_path, "Failed to create example config"),
            }
        }
        return ClientConfig::default();
    }

    match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Using default configuration");
            ClientConfig::default()
        }
    }
}

/// Directory holding the running binary.
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Writes an annotated example config. Keys starting with `_` are comments
/// and are ignored when the file is loaded.
pub fn write_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let example = serde_json::json!({
        "_comment": "speechify client configuration",
        "_usage": "Copy this file to config.json and adjust values as needed",
        "server_url": DEFAULT_SERVER_URL,
        "_server_url_note": "Synthesis server base URL (overridden by --server or SPEECHIFY_SERVER_URL)",
        "timeout": DEFAULT_TIMEOUT_SECS,
        "_timeout_note": "HTTP request timeout in seconds (overridden by --timeout)",
        "workers": DEFAULT_WORKERS,
        "_workers_note": "Number of parallel workers (overridden by --workers)",
        "_examples": [
            "Local server: http://localhost:8000",
            "Remote server: http://192.168.1.100:8000"
        ]
    });
    let data = serde_json::to_string_pretty(&example).context("Failed to serialize example config")?;
    fs::write(path, data).with_context(|| format!("Failed to write example config {path:?}"))?;
    Ok(())
}

fn sanitize(mut config: ClientConfig) -> Result<ClientConfig> {
    config.server_url = config.server_url.trim().to_string();
    if config.server_url.is_empty() {
        return Err(anyhow!("server_url cannot be empty"));
    }
    if config.timeout <= 0 {
        warn!(
            timeout = config.timeout,
            default = DEFAULT_TIMEOUT_SECS,
            "Invalid timeout in config; using default"
        );
        config.timeout = DEFAULT_TIMEOUT_SECS;
    }
    if config.workers < 1 {
        warn!(
            workers = config.workers,
            default = DEFAULT_WORKERS,
            "Invalid workers in config; using default"
        );
        config.workers = DEFAULT_WORKERS;
    } else if config.workers > 10 {
        warn!(workers = config.workers, "Workers count seems high, consider reducing");
    }
    Ok(config)
}
