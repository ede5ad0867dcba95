//! Command-line argument parsing for the launcher.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Dark Sun Online launcher command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "dso-launcher", about = "Dark Sun Online launcher")]
pub struct CliArgs {
    /// Server to log in to, as `host` or `host:port`. Added to the server list.
    #[arg(long)]
    pub server: Option<String>,

    /// Account name.
    #[arg(long)]
    pub username: Option<String>,

    /// Account password.
    #[arg(long)]
    pub password: Option<String>,

    /// Remember the password in the config file.
    #[arg(long)]
    pub save_password: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Connect deadline in seconds (0 disables it).
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Write the handoff file but do not start the game.
    #[arg(long)]
    pub no_launch: bool,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref server) = args.server {
            self.launcher.select_or_add(server);
        }
        if let Some(ref username) = args.username {
            self.launcher.username = username.clone();
        }
        if let Some(ref password) = args.password {
            self.launcher.password = password.clone();
        }
        if args.save_password {
            self.launcher.save_password = true;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(secs) = args.connect_timeout {
            self.network.connect_timeout_secs = secs;
        }
        if args.no_launch {
            self.game.launch = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        config.launcher.servers = vec!["a.example.net".to_string()];
        let args = CliArgs {
            server: Some("b.example.net:7000".to_string()),
            username: Some("alice".to_string()),
            connect_timeout: Some(15),
            no_launch: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.launcher.selected_server().unwrap(), "b.example.net:7000");
        assert_eq!(config.launcher.username, "alice");
        assert_eq!(config.network.connect_timeout_secs, 15);
        assert!(!config.game.launch);
        // Non-overridden fields retain defaults
        assert_eq!(config.debug.log_level, "info");
        assert!(!config.launcher.save_password);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parse_flags() {
        let args = CliArgs::parse_from([
            "dso-launcher",
            "--server",
            "dso.example.net",
            "--username",
            "bob",
            "--no-launch",
        ]);
        assert_eq!(args.server.as_deref(), Some("dso.example.net"));
        assert_eq!(args.username.as_deref(), Some("bob"));
        assert!(args.no_launch);
        assert!(args.password.is_none());
    }
}
