//! Launcher configuration.
//!
//! Settings persist to disk as a RON file: the server list, the last selected
//! server, saved credentials, network limits and how to start the game.
//! Command-line flags override individual values for one run.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, GameConfig, LauncherConfig, MAX_SERVER_LEN, MAX_SERVERS, NetworkConfig,
};
pub use error::ConfigError;
