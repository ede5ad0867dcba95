//! The binary entry point for the Dark Sun Online launcher.

mod app;
mod handoff;
mod platform;

use std::process::ExitCode;

use clap::Parser;
use dso_config::{CliArgs, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let dirs = match args.config.clone() {
        Some(config_dir) => platform::PlatformDirs::with_config_dir(config_dir),
        None => match platform::PlatformDirs::resolve() {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to initialize platform directories: {e}");
                return ExitCode::FAILURE;
            }
        },
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to initialize platform directories: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);
    dso_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    let install_dir = match platform::install_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(
        "config: {}, logs: {}, game: {}",
        dirs.config_dir.display(),
        dirs.log_dir.display(),
        install_dir.display()
    );

    let code = match app::run(&mut config, &install_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    };

    if let Err(e) = config.save(&dirs.config_dir) {
        tracing::warn!("Could not save config: {e}");
    }
    code
}
