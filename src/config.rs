//! Configuration loading and persistence.
//!
//! The bridge reads a single JSON file describing the IRC server, the
//! channels to join, and where the MegaHAL engine binary and its brain
//! live. Environment variables override individual fields.
//!
//! # Lookup order
//!
//! 1. `--config <path>` on the command line
//! 2. `STIRSPEARE_CONFIG`
//! 3. Platform config dir (`~/.config/stirspeare/config.json` on Linux)
//!
//! Relative engine paths are resolved against the directory holding the
//! config file, so a checkout can ship `config.json`, the engine binary and
//! its data directory side by side.

// Rust guideline compliant 2026-02

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::supervisor::RestartPolicy;

/// File name used when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Log file written inside the engine data directory.
pub const LOG_FILE_NAME: &str = "stirspeare.log";

/// Top-level configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// IRC connection settings.
    pub irc: IrcConfig,
    /// MegaHAL engine settings.
    pub engine: EngineConfig,
    /// How the supervisor restarts failed units.
    #[serde(default)]
    pub restart: RestartPolicy,
    /// Optional bound on how long the socket may stay silent.
    ///
    /// Absent by default: a silent server blocks the connection forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
}

/// IRC server and identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IrcConfig {
    /// Server host name.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Username sent in the `USER` registration line.
    pub user: String,
    /// Nickname; directed messages must start with `<nick>: `.
    pub nick: String,
    /// Channels joined after the welcome numeric, in order.
    pub join: Vec<String>,
}

/// Engine executable and brain location.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path to the MegaHAL binary.
    pub command: PathBuf,
    /// Directory passed to the engine with `-d`.
    pub data_dir: PathBuf,
    /// Optional bound on how long a single reply may take.
    ///
    /// Absent by default: a stalled engine blocks its unit forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_timeout_secs: Option<u64>,
}

impl EngineConfig {
    /// Configured reply bound.
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            irc: IrcConfig {
                server: "localhost".to_string(),
                port: 6667,
                user: "stirspeare".to_string(),
                nick: "stirspeare".to_string(),
                join: vec!["#stirspeare".to_string()],
            },
            engine: EngineConfig {
                command: PathBuf::from("megahal"),
                data_dir: PathBuf::from("data"),
                reply_timeout_secs: None,
            },
            restart: RestartPolicy::default(),
            read_timeout_secs: None,
        }
    }
}

impl Config {
    /// Default config path in the platform config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("stirspeare").join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Pick the config path from an explicit flag, the environment, or the default.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var("STIRSPEARE_CONFIG") {
            return PathBuf::from(path);
        }
        Self::default_path()
    }

    /// Load, resolve, override from the environment, and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(explicit);
        let mut config = Self::load_from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Read a config file and resolve its relative paths. Does not validate.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Anchor relative engine paths at `base`.
    ///
    /// A bare command name such as `megahal` is left alone so it is looked
    /// up on `PATH`; anything with a directory component is anchored.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let command = &self.engine.command;
        if command.is_relative() && command.components().count() > 1 {
            self.engine.command = base.join(command);
        }
        if self.engine.data_dir.is_relative() {
            self.engine.data_dir = base.join(&self.engine.data_dir);
        }
    }

    /// Apply `STIRSPEARE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server) = lookup("STIRSPEARE_SERVER") {
            self.irc.server = server;
        }
        if let Some(port) = lookup("STIRSPEARE_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.irc.port = port,
                Err(e) => log::warn!("[Config] Ignoring STIRSPEARE_PORT={}: {}", port, e),
            }
        }
        if let Some(user) = lookup("STIRSPEARE_USER") {
            self.irc.user = user;
        }
        if let Some(nick) = lookup("STIRSPEARE_NICK") {
            self.irc.nick = nick;
        }
        if let Some(join) = lookup("STIRSPEARE_JOIN") {
            self.irc.join = join
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(command) = lookup("STIRSPEARE_ENGINE") {
            self.engine.command = PathBuf::from(command);
        }
        if let Some(data_dir) = lookup("STIRSPEARE_DATA_DIR") {
            self.engine.data_dir = PathBuf::from(data_dir);
        }
    }

    /// Check that every field the units depend on is present and non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.irc.server.trim().is_empty() {
            return Err(ConfigError::Missing("irc.server"));
        }
        if self.irc.port == 0 {
            return Err(ConfigError::Missing("irc.port"));
        }
        if self.irc.user.trim().is_empty() {
            return Err(ConfigError::Missing("irc.user"));
        }
        if self.irc.nick.trim().is_empty() {
            return Err(ConfigError::Missing("irc.nick"));
        }
        if self.irc.join.is_empty() || self.irc.join.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Missing("irc.join"));
        }
        if self.engine.command.as_os_str().is_empty() {
            return Err(ConfigError::Missing("engine.command"));
        }
        if self.engine.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("engine.data_dir"));
        }
        Ok(())
    }

    /// Write the config as pretty JSON, creating the parent directory.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Path of the log file inside the engine data directory.
    pub fn log_path(&self) -> PathBuf {
        self.engine.data_dir.join(LOG_FILE_NAME)
    }

    /// `host:port` for the IRC server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.irc.server, self.irc.port)
    }

    /// Configured silence bound for the socket.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}
