//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Most server entries kept in the list.
pub const MAX_SERVERS: usize = 100;
/// Longest accepted server entry, in bytes.
pub const MAX_SERVER_LEN: usize = 127;

const CONFIG_FILE: &str = "config.ron";

/// Top-level launcher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Server list and saved login.
    pub launcher: LauncherConfig,
    /// Connection settings.
    pub network: NetworkConfig,
    /// Game executable and handoff.
    pub game: GameConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Server list and saved login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Server entries as `"host"` or `"host:port"`.
    pub servers: Vec<String>,
    /// Index of the last selected server.
    pub selected: usize,
    /// Last username entered.
    pub username: String,
    /// Saved password; only written when `save_password` is set.
    pub password: String,
    /// Remember the password between runs.
    pub save_password: bool,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Deadline for the TCP handshake in seconds (0 = wait for the OS).
    pub connect_timeout_secs: u64,
    /// Largest response packet accepted, in bytes. Values below the 10-byte
    /// response header reject every packet.
    pub max_packet_len: usize,
}

/// How the game is started after a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Game executable, relative to the launcher directory.
    pub executable: String,
    /// Handoff file the game reads its server address and token from.
    pub handoff_file: String,
    /// Start the game after writing the handoff file.
    pub launch: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 0,
            max_packet_len: u16::MAX as usize,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            executable: "mdark.exe".to_string(),
            handoff_file: "tenaddr.ini".to_string(),
            launch: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Server list ---

impl LauncherConfig {
    /// Entries that can be offered to the user: non-blank, within the length
    /// limit, and no more than [`MAX_SERVERS`] of them.
    pub fn usable_servers(&self) -> Vec<&str> {
        self.servers
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && s.len() <= MAX_SERVER_LEN)
            .take(MAX_SERVERS)
            .collect()
    }

    /// The selected entry, with the index clamped into range.
    pub fn selected_server(&self) -> Result<&str, ConfigError> {
        let servers = self.usable_servers();
        let last = servers.len().checked_sub(1).ok_or(ConfigError::NoServers)?;
        Ok(servers[self.selected.min(last)])
    }

    /// Select `server`, adding it to the list if it is not there yet.
    pub fn select_or_add(&mut self, server: &str) {
        let server = server.trim();
        let existing = self.usable_servers().iter().position(|s| *s == server);
        if let Some(index) = existing {
            self.selected = index;
            return;
        }
        if server.is_empty() || server.len() > MAX_SERVER_LEN {
            log::warn!("Ignoring server entry '{server}'");
            return;
        }

        self.servers.retain(|s| {
            let s = s.trim();
            !s.is_empty() && s.len() <= MAX_SERVER_LEN
        });
        if self.servers.len() >= MAX_SERVERS {
            log::warn!("Server list full, replacing the last entry with '{server}'");
            self.servers.truncate(MAX_SERVERS - 1);
        }
        self.servers.push(server.to_string());
        self.selected = self.servers.len() - 1;
    }

    /// Record the credentials of this run. The password is kept only when
    /// `save_password` is set.
    pub fn remember_login(&mut self, username: &str, password: &str) {
        self.username = username.to_string();
        self.password = if self.save_password {
            password.to_string()
        } else {
            String::new()
        };
    }
}

impl NetworkConfig {
    /// Connect deadline, if one is configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }
}

// --- Load / Save ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let mut config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            // A saved password implies the user asked for it to be saved.
            if !config.launcher.password.is_empty() {
                config.launcher.save_password = true;
            }
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        log::debug!("Saved config to {}", config_path.display());
        Ok(())
    }
}
