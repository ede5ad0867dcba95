//! Login orchestration on top of [`Session`].
//!
//! The controller owns the session plus the credentials the user has typed so
//! far, and translates session notices into [`Notification`]s for the UI.
//! Like the session it performs no I/O; the commands it returns are executed
//! by the client driver.

use crate::credentials::{CredentialError, Credentials, check_field};
use crate::endpoint::ServerEndpoint;
use crate::error::SessionError;
use crate::receive_buffer::ReceiveConfig;
use crate::session::{
    Command, LaunchTicket, Session, SessionEvent, SessionHandle, SessionNotice, SessionState, Step,
};

/// What the UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Progress, server banner, or a recoverable failure.
    StatusMessage(String),
    /// Login accepted; time to start the game.
    LoginAccepted(LaunchTicket),
    /// The server said no.
    LoginRejected(String),
    /// The server spoke something we do not understand.
    Fatal(String),
}

/// Output of one controller call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Update {
    /// I/O for the driver, in order.
    pub commands: Vec<Command>,
    /// Messages for the UI, in order.
    pub notifications: Vec<Notification>,
}

impl Update {
    /// Whether nothing happened.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notifications.is_empty()
    }
}

impl From<Step> for Update {
    fn from(step: Step) -> Self {
        Self {
            commands: step.commands,
            notifications: step.notices.into_iter().map(notification).collect(),
        }
    }
}

fn notification(notice: SessionNotice) -> Notification {
    match notice {
        SessionNotice::Status(text) | SessionNotice::ServerInfo(text) => {
            Notification::StatusMessage(text)
        }
        SessionNotice::Rejected(text) => Notification::LoginRejected(text),
        SessionNotice::Accepted(ticket) => Notification::LoginAccepted(ticket),
        SessionNotice::Failed(error) => failure_notification(&error),
    }
}

/// Retryable failures are plain status lines; the rest are fatal.
fn failure_notification(error: &SessionError) -> Notification {
    let text = match error {
        SessionError::Resolve(e) => format!("Error retrieving server address: {e}"),
        SessionError::Connect(e) => format!("Error retrieving server information: {e}"),
        SessionError::Send(e) => format!("Server closed connection: {e}"),
        SessionError::Receive(e) => format!("Server closed connection: {e}"),
        SessionError::Protocol(e) => format!("Protocol error: {e}"),
    };
    if error.is_retryable() {
        Notification::StatusMessage(text)
    } else {
        Notification::Fatal(text)
    }
}

/// Drives one login from server selection to launch ticket.
#[derive(Default)]
pub struct LoginController {
    session: Session,
    username: Vec<u8>,
    password: Vec<u8>,
}

impl LoginController {
    /// Create a controller with an idle session.
    pub fn new(config: ReceiveConfig) -> Self {
        Self {
            session: Session::new(config),
            username: Vec::new(),
            password: Vec::new(),
        }
    }

    /// Current session state.
    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    /// Handle of the current attempt.
    pub fn current_handle(&self) -> SessionHandle {
        self.session.handle()
    }

    /// Connect to `endpoint`, abandoning whatever was in progress.
    pub fn select_server(&mut self, endpoint: ServerEndpoint) -> Update {
        self.session.start(endpoint).into()
    }

    /// Abandon the current attempt.
    pub fn cancel(&mut self) -> Update {
        self.session.cancel().into()
    }

    /// Store the credentials the user entered. Either may still be empty.
    pub fn set_credentials(
        &mut self,
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<(), CredentialError> {
        let username = username.into();
        let password = password.into();
        check_field("username", &username)?;
        check_field("password", &password)?;
        self.username = username;
        self.password = password;
        Ok(())
    }

    /// Whether both credential fields are filled in.
    pub fn credentials_present(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Whether [`submit_login`](Self::submit_login) would send a request.
    pub fn can_submit(&self) -> bool {
        *self.session.state() == SessionState::Ready && self.credentials_present()
    }

    /// Send the stored credentials. No-op unless [`can_submit`](Self::can_submit).
    pub fn submit_login(&mut self) -> Update {
        if !self.can_submit() {
            tracing::debug!(
                "Login not submitted (state {}, credentials present: {})",
                self.session.state().name(),
                self.credentials_present()
            );
            return Update::default();
        }

        match Credentials::new(self.username.clone(), self.password.clone()) {
            Ok(credentials) => self.session.submit(&credentials).into(),
            Err(e) => Update {
                commands: Vec::new(),
                notifications: vec![Notification::StatusMessage(e.to_string())],
            },
        }
    }

    /// Feed a network event into the session.
    pub fn handle_event(&mut self, event: SessionEvent) -> Update {
        self.session.handle_event(event).into()
    }
}
