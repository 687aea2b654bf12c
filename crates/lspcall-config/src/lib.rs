//! Layered TOML configuration for lspcall.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use lspcall_mcp::ServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// The MCP language server launched when nothing else is configured.
pub const DEFAULT_SERVER_COMMAND: &str = "mcp-language-server";

/// The language server backend the MCP server is asked to drive.
pub const DEFAULT_LSP: &str = "gopls";

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1_000;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Resolved configuration for one lspcall run.
#[derive(Debug, Clone)]
pub struct LspcallConfig {
    pub server: ServerConfig,
    pub workspace: PathBuf,
    pub lsp: String,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server: ServerSettings,
}

/// The `[server]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub command: Option<String>,
    pub workspace: Option<PathBuf>,
    pub lsp: Option<String>,
    /// Extra arguments appended after `--workspace` and `--lsp`.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub command: Option<String>,
    pub workspace: Option<PathBuf>,
    pub lsp: Option<String>,
    pub timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
}

impl LspcallConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`LSPCALL_SERVER`, `LSPCALL_WORKSPACE`, `LSPCALL_LSP`)
    /// 3. Config file (~/.lspcall/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(settings, overrides, |key| std::env::var(key).ok(), cwd, config_dir)
    }

    /// Apply precedence rules to already-gathered sources.
    pub fn resolve(
        settings: SettingsFile,
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
        cwd: PathBuf,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        let file = settings.server;

        let command = overrides
            .command
            .or_else(|| env("LSPCALL_SERVER"))
            .or(file.command)
            .unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_string());

        let workspace = overrides
            .workspace
            .or_else(|| env("LSPCALL_WORKSPACE").map(PathBuf::from))
            .or(file.workspace)
            .unwrap_or(cwd);

        let lsp = overrides
            .lsp
            .or_else(|| env("LSPCALL_LSP"))
            .or(file.lsp)
            .unwrap_or_else(|| DEFAULT_LSP.to_string());

        let request_timeout = positive_ms(
            "timeout_ms",
            overrides
                .timeout_ms
                .or(file.timeout_ms)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )?;
        let shutdown_grace = positive_ms(
            "shutdown_grace_ms",
            overrides
                .shutdown_grace_ms
                .or(file.shutdown_grace_ms)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS),
        )?;
        let drain_timeout = positive_ms(
            "drain_timeout_ms",
            file.drain_timeout_ms.unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS),
        )?;

        let mut server = ServerConfig::new(command)
            .with_arg("--workspace")
            .with_arg(workspace.display().to_string())
            .with_arg("--lsp")
            .with_arg(lsp.clone())
            .with_args(file.args)
            .with_request_timeout(request_timeout)
            .with_shutdown_grace(shutdown_grace)
            .with_drain_timeout(drain_timeout);
        for (key, value) in file.env {
            server = server.with_env(key, value);
        }

        Ok(LspcallConfig {
            server,
            workspace,
            lsp,
            config_dir,
        })
    }
}

fn positive_ms(key: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(value))
}

/// Get the lspcall config directory path (~/.lspcall/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LSPCALL_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lspcall")
}

/// Load and parse a TOML settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}
