//! Configuration loading and credential resolution
//!
//! File configuration is loaded from `.chatvault.toml` in the current
//! directory, falling back to the home directory. API credentials come from
//! the environment only and are never written to the config file:
//!
//! | Variable       | Effect                                           |
//! |----------------|--------------------------------------------------|
//! | `USER_TOKEN`   | Chat API credential (takes precedence)           |
//! | `BOT_TOKEN`    | Fallback chat credential                         |
//! | `ISSUE_USER`   | Issue-tracker user for basic auth                |
//! | `ISSUE_TOKEN`  | Issue-tracker API token                          |
//! | `ISSUE_SERVER` | Issue-tracker base URL (config `jira.server` wins) |

use crate::error::{Error, Result};
use crate::types::Channel;
use serde::Deserialize;
use std::path::PathBuf;

/// Config file name looked up in cwd, then home
pub const CONFIG_FILE_NAME: &str = ".chatvault.toml";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Default channels targeted when none are given on the command line
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Object-store mirror target (parsed for compatibility; the mirror
    /// itself is an external concern)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Issue-tracker overrides
    #[serde(default)]
    pub jira: JiraConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A configured channel: user-facing name plus platform ID
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub name: String,
    pub id: String,
}

impl ChannelConfig {
    /// Convert to the domain channel type.
    pub fn to_channel(&self) -> Channel {
        Channel {
            name: self.name.clone(),
            id: self.id.clone(),
        }
    }
}

/// Object-store mirror configuration (recognized, not acted on here)
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// Issue-tracker configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct JiraConfig {
    /// Base URL override for `ISSUE_SERVER`
    pub server: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of rotated log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from `.chatvault.toml` in cwd, then home.
    ///
    /// Returns defaults when no config file exists.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {:?}: {}", path, e)))?;

        tracing::info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Candidate config file locations, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(CONFIG_FILE_NAME),
            home_dir().join(CONFIG_FILE_NAME),
        ]
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/chatvault/` (~/.local/state/chatvault/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("chatvault")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("chatvault.log")
    }

    /// Default channel targets as domain values.
    pub fn default_channels(&self) -> Vec<Channel> {
        self.channels.iter().map(ChannelConfig::to_channel).collect()
    }
}

/// Which credential kind the chat client was built with.
///
/// Observable for logging only; behavior does not differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    User,
    Bot,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::User => "user",
            TokenKind::Bot => "bot",
        }
    }
}

/// Chat API credential resolved from the environment
#[derive(Debug, Clone)]
pub struct ChatCredentials {
    pub token: String,
    pub kind: TokenKind,
}

impl ChatCredentials {
    /// Resolve the chat credential: `USER_TOKEN` wins over `BOT_TOKEN`.
    ///
    /// Fails startup when neither is set.
    pub fn from_env() -> Result<Self> {
        if let Ok(token) = std::env::var("USER_TOKEN") {
            if !token.is_empty() {
                return Ok(Self {
                    token,
                    kind: TokenKind::User,
                });
            }
        }
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.is_empty() {
                return Ok(Self {
                    token,
                    kind: TokenKind::Bot,
                });
            }
        }
        Err(Error::Config(
            "no chat credential: set USER_TOKEN or BOT_TOKEN".to_string(),
        ))
    }
}

/// Issue-tracker credential trio
#[derive(Debug, Clone)]
pub struct IssueCredentials {
    pub user: String,
    pub token: String,
    pub server: String,
}

impl IssueCredentials {
    /// Resolve issue-tracker credentials from the environment.
    ///
    /// `server_override` (from the `jira.server` config key) takes
    /// precedence over `ISSUE_SERVER`.
    pub fn from_env(server_override: Option<&str>) -> Result<Self> {
        let user = std::env::var("ISSUE_USER")
            .map_err(|_| Error::Config("ISSUE_USER not set".to_string()))?;
        let token = std::env::var("ISSUE_TOKEN")
            .map_err(|_| Error::Config("ISSUE_TOKEN not set".to_string()))?;
        let server = match server_override {
            Some(server) if !server.is_empty() => server.to_string(),
            _ => std::env::var("ISSUE_SERVER")
                .map_err(|_| Error::Config("ISSUE_SERVER not set".to_string()))?,
        };

        Ok(Self {
            user,
            token,
            server: server.trim_end_matches('/').to_string(),
        })
    }
}
