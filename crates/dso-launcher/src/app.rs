//! Console login flow: connect, log in, hand off to the game.

use std::path::Path;

use dso_config::{Config, ConfigError};
use dso_net::{
    ClientConfig, CredentialError, EndpointError, LaunchTicket, LauncherClient, Notification,
    ReceiveConfig, ServerEndpoint, SessionState, SystemResolver,
};

use crate::handoff::{self, HandoffError};

/// Reasons the launcher exits without starting the game.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid server entry: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("invalid credentials: {0}")]
    Credentials(#[from] CredentialError),
    #[error("a username and password are required")]
    MissingCredentials,
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error("login event loop stopped unexpectedly")]
    Stopped,
}

/// Log in to the selected server and start the game.
///
/// Records the username (and the password, if saving is enabled) in
/// `config` before connecting, so the caller can persist it whatever the
/// outcome.
pub async fn run(config: &mut Config, install_dir: &Path) -> Result<(), LauncherError> {
    let username = config.launcher.username.clone();
    let password = config.launcher.password.clone();
    config.launcher.remember_login(&username, &password);

    let endpoint: ServerEndpoint = config.launcher.selected_server()?.parse()?;
    if username.is_empty() || password.is_empty() {
        return Err(LauncherError::MissingCredentials);
    }

    let client_config = ClientConfig {
        receive: ReceiveConfig {
            max_packet_len: config.network.max_packet_len,
        },
        connect_timeout: config.network.connect_timeout(),
        ..Default::default()
    };
    let mut client = LauncherClient::spawn(SystemResolver, client_config);
    client.set_credentials(username, password)?;
    client.select_server(endpoint);

    let result = login(&mut client).await;
    client.shutdown().await;
    let ticket = result?;

    println!("Login accepted");
    let handoff_path = install_dir.join(&config.game.handoff_file);
    handoff::write_handoff(&handoff_path, &ticket)?;

    if config.game.launch {
        let executable = install_dir.join(&config.game.executable);
        let child = handoff::launch_game(&executable, install_dir)?;
        tracing::info!("Game started (pid {})", child.id());
    } else {
        println!("Handoff written to {}", handoff_path.display());
    }
    Ok(())
}

/// Print progress and submit the login as soon as the server is ready.
///
/// Outcomes are decided from the status delivered with each notification,
/// not the latest published one, so a failure is reported with its own text.
pub async fn login(client: &mut LauncherClient) -> Result<LaunchTicket, LauncherError> {
    while let Some((notification, status)) = client.next_notification().await {
        match notification {
            Notification::StatusMessage(text) => {
                println!("{text}");
                match status.state {
                    SessionState::Ready if status.can_submit => client.submit_login(),
                    SessionState::Closed(_) => return Err(LauncherError::Failed(text)),
                    _ => {}
                }
            }
            Notification::LoginRejected(text) => {
                println!("{text}");
                return Err(LauncherError::Rejected(text));
            }
            Notification::LoginAccepted(ticket) => return Ok(ticket),
            Notification::Fatal(text) => return Err(LauncherError::Failed(text)),
        }
    }
    Err(LauncherError::Stopped)
}
