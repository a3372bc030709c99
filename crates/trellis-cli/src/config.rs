//! Configuration file management for trellis.
//!
//! Provides a TOML-based config file at `~/.config/trellis/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use trellis_core::generate::WorkerConfig;
use trellis_core::model::{CommandModelClient, ModelClient};
use trellis_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub model: ModelSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// Executable wrapping the external model service.
    #[serde(default = "default_model_command")]
    pub command: String,
    /// Fixed arguments prepended to every invocation.
    #[serde(default = "default_model_args")]
    pub args: Vec<String>,
    /// Flag carrying the conversation handle; empty disables threading.
    #[serde(default = "default_thread_flag")]
    pub thread_flag: Option<String>,
    /// Wall-time limit per generation/adjustment job, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_command() -> String {
    "claude".to_string()
}

fn default_model_args() -> Vec<String> {
    vec!["-p".to_string()]
}

fn default_thread_flag() -> Option<String> {
    Some("--session-id".to_string())
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            command: default_model_command(),
            args: default_model_args(),
            thread_flag: default_thread_flag(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelSection {
    /// Build the subprocess-backed model client from this section.
    pub fn client(&self) -> Arc<dyn ModelClient> {
        Arc::new(CommandModelClient {
            command: self.command.clone(),
            args: self.args.clone(),
            thread_flag: self.thread_flag.clone(),
        })
    }

    /// Build the worker configuration from this section.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            job_timeout: Duration::from_secs(self.timeout_secs),
            ..WorkerConfig::default()
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the trellis config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/trellis` or `~/.config/trellis`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("trellis");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("trellis")
}

/// Return the path to the trellis config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Set permissions to 0600 (owner read/write only) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct TrellisConfig {
    pub db_config: DbConfig,
    pub model: ModelSection,
}

impl TrellisConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `TRELLIS_DATABASE_URL` env > `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Model command: `TRELLIS_MODEL_CMD` env > `config_file.model.command` > `"claude"`
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        // DB URL resolution.
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("TRELLIS_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        // Model section resolution.
        let mut model = file_config
            .map(|cfg| cfg.model)
            .unwrap_or_default();
        if let Ok(cmd) = std::env::var("TRELLIS_MODEL_CMD") {
            model.command = cmd;
        }

        Ok(Self { db_config, model })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
