//! Tokio driver for the login controller.
//!
//! [`LauncherClient::spawn`] starts a single event loop task that owns the
//! [`LoginController`]. Lookups, connects and socket reads run in their own
//! tasks and report back through one channel, each message tagged with the
//! [`SessionHandle`] it was started for. Sends are written inline from the
//! loop. The latest [`ClientStatus`] is published on a [`watch`] channel so
//! the UI can enable or disable its login button without polling. Each
//! notification also carries the status it was produced under, since the
//! watched value may already have moved on by the time it is read.

use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::controller::{LoginController, Notification, Update};
use crate::credentials::{CredentialError, check_field};
use crate::endpoint::ServerEndpoint;
use crate::error::{ConnectError, ReceiveError, SendError};
use crate::receive_buffer::ReceiveConfig;
use crate::resolver::{Resolve, Resolver};
use crate::session::{Command, SessionEvent, SessionHandle, SessionState};

const READ_CHUNK: usize = 4096;

/// Driver settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reassembly limits.
    pub receive: ReceiveConfig,
    /// Deadline for the TCP handshake. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Set `TCP_NODELAY` on new connections. Default: `true`.
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            receive: ReceiveConfig::default(),
            connect_timeout: None,
            tcp_nodelay: true,
        }
    }
}

/// Snapshot of the session published after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// Session state.
    pub state: SessionState,
    /// Whether a login submit would be sent right now.
    pub can_submit: bool,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            can_submit: false,
        }
    }
}

enum ClientCommand {
    SelectServer(ServerEndpoint),
    SetCredentials { username: Vec<u8>, password: Vec<u8> },
    SubmitLogin,
    Cancel,
    Shutdown,
}

enum LoopEvent {
    Session(SessionEvent),
    /// A connect finished; the stream is installed only if `handle` is still current.
    Connected {
        handle: SessionHandle,
        stream: TcpStream,
    },
}

/// Handle to the running login event loop.
pub struct LauncherClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    notifications: mpsc::UnboundedReceiver<(Notification, ClientStatus)>,
    status: watch::Receiver<ClientStatus>,
    task: JoinHandle<()>,
}

impl LauncherClient {
    /// Spawn the event loop on the current tokio runtime.
    pub fn spawn<R: Resolve>(resolver: R, config: ClientConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientStatus::default());

        let event_loop = EventLoop {
            controller: LoginController::new(config.receive.clone()),
            resolver: Resolver::new(resolver),
            config,
            events_tx,
            connect_task: None,
            connection: None,
            notifications: notifications_tx,
            status: status_tx,
        };
        let task = tokio::spawn(event_loop.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            notifications: notifications_rx,
            status: status_rx,
            task,
        }
    }

    /// Connect to `endpoint`, abandoning any attempt in progress.
    pub fn select_server(&self, endpoint: ServerEndpoint) {
        self.send(ClientCommand::SelectServer(endpoint));
    }

    /// Store credentials for the next submit. Either field may be empty.
    pub fn set_credentials(
        &self,
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<(), CredentialError> {
        let username = username.into();
        let password = password.into();
        check_field("username", &username)?;
        check_field("password", &password)?;
        self.send(ClientCommand::SetCredentials { username, password });
        Ok(())
    }

    /// Send a login request if the session is ready for one.
    pub fn submit_login(&self) {
        self.send(ClientCommand::SubmitLogin);
    }

    /// Abandon the current attempt.
    pub fn cancel(&self) {
        self.send(ClientCommand::Cancel);
    }

    /// Wait for the next UI notification, paired with the session status
    /// right after the transition that produced it. `None` once the loop has
    /// stopped.
    pub async fn next_notification(&mut self) -> Option<(Notification, ClientStatus)> {
        self.notifications.recv().await
    }

    /// Latest published status.
    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    /// Shortcut for `status().can_submit`.
    pub fn can_submit(&self) -> bool {
        self.status.borrow().can_submit
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }

    /// Stop the loop, closing any connection, and wait for it to exit.
    pub async fn shutdown(self) {
        self.send(ClientCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("Login event loop ended abnormally: {e}");
        }
    }

    fn send(&self, command: ClientCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Login event loop is gone, command dropped");
        }
    }
}

struct Connection {
    handle: SessionHandle,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

struct EventLoop<R: Resolve> {
    controller: LoginController,
    resolver: Resolver<R>,
    config: ClientConfig,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    connect_task: Option<JoinHandle<()>>,
    connection: Option<Connection>,
    notifications: mpsc::UnboundedSender<(Notification, ClientStatus)>,
    status: watch::Sender<ClientStatus>,
}

impl<R: Resolve> EventLoop<R> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
        mut events: mpsc::UnboundedReceiver<LoopEvent>,
    ) {
        tracing::debug!("Login event loop started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(event) = events.recv() => self.on_event(event).await,
            }
        }

        self.resolver.cancel();
        self.close_connection();
        tracing::debug!("Login event loop stopped");
    }

    async fn on_command(&mut self, command: ClientCommand) {
        let update = match command {
            ClientCommand::SelectServer(endpoint) => self.controller.select_server(endpoint),
            ClientCommand::SetCredentials { username, password } => {
                if let Err(e) = self.controller.set_credentials(username, password) {
                    tracing::warn!("Credentials ignored: {e}");
                }
                Update::default()
            }
            ClientCommand::SubmitLogin => self.controller.submit_login(),
            ClientCommand::Cancel => self.controller.cancel(),
            ClientCommand::Shutdown => return,
        };
        self.apply(update).await;
    }

    async fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Session(event) => {
                let update = self.controller.handle_event(event);
                self.apply(update).await;
            }
            LoopEvent::Connected { handle, stream } => {
                let wanted = handle == self.controller.current_handle()
                    && *self.controller.state() == SessionState::Connecting;
                if !wanted {
                    tracing::debug!("Dropping connection for superseded session {handle:?}");
                    return;
                }

                self.connect_task = None;
                self.install(handle, stream);
                let update = self.controller.handle_event(SessionEvent::ConnectComplete {
                    handle,
                    result: Ok(()),
                });
                self.apply(update).await;
            }
        }
    }

    /// Execute commands and publish notifications until the controller is quiet.
    async fn apply(&mut self, update: Update) {
        let mut pending = VecDeque::from([update]);
        while let Some(update) = pending.pop_front() {
            let status = self.publish_status();
            for notification in update.notifications {
                let _ = self.notifications.send((notification, status.clone()));
            }
            for command in update.commands {
                if let Some(event) = self.execute(command).await {
                    pending.push_back(self.controller.handle_event(event));
                }
            }
        }
        self.publish_status();
    }

    async fn execute(&mut self, command: Command) -> Option<SessionEvent> {
        match command {
            Command::Resolve { handle, host } => {
                let tx = self.events_tx.clone();
                self.resolver.start(handle, host, move |event| {
                    let _ = tx.send(LoopEvent::Session(event));
                });
                None
            }
            Command::CancelResolve => {
                self.resolver.cancel();
                None
            }
            Command::Connect { handle, addr } => {
                self.start_connect(handle, addr);
                None
            }
            Command::Send { handle, packet } => {
                let reason = match self.connection.as_mut() {
                    Some(conn) if conn.handle == handle => {
                        match conn.writer.write_all(&packet).await {
                            Ok(()) => {
                                tracing::trace!("Sent {} bytes for session {handle:?}", packet.len());
                                return None;
                            }
                            Err(e) => SendError::from(e),
                        }
                    }
                    _ => SendError::TransportFailure("not connected".to_string()),
                };
                Some(SessionEvent::SendFailed { handle, reason })
            }
            Command::Close => {
                self.close_connection();
                None
            }
        }
    }

    fn start_connect(&mut self, handle: SessionHandle, addr: SocketAddrV4) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }

        let tx = self.events_tx.clone();
        let timeout = self.config.connect_timeout;
        let nodelay = self.config.tcp_nodelay;
        self.connect_task = Some(tokio::spawn(async move {
            let event = match connect(addr, timeout, nodelay).await {
                Ok(stream) => LoopEvent::Connected { handle, stream },
                Err(e) => LoopEvent::Session(SessionEvent::ConnectComplete {
                    handle,
                    result: Err(e),
                }),
            };
            let _ = tx.send(event);
        }));
    }

    fn install(&mut self, handle: SessionHandle, stream: TcpStream) {
        self.close_connection();
        let (reader, writer) = stream.into_split();
        let reader = tokio::spawn(read_loop(handle, reader, self.events_tx.clone()));
        self.connection = Some(Connection {
            handle,
            writer,
            reader,
        });
    }

    fn close_connection(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if let Some(conn) = self.connection.take() {
            tracing::debug!("Closing connection for session {:?}", conn.handle);
            conn.reader.abort();
        }
    }

    fn publish_status(&self) -> ClientStatus {
        let status = ClientStatus {
            state: self.controller.state().clone(),
            can_submit: self.controller.can_submit(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        status
    }
}

async fn connect(
    addr: SocketAddrV4,
    timeout: Option<Duration>,
    nodelay: bool,
) -> Result<TcpStream, ConnectError> {
    let connecting = TcpStream::connect(addr);
    let stream = match timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| ConnectError::TimedOut)??,
        None => connecting.await?,
    };
    if nodelay {
        stream.set_nodelay(true)?;
    }
    Ok(stream)
}

/// Forward bytes until the peer closes, a read fails, or the task is aborted.
async fn read_loop(
    handle: SessionHandle,
    mut reader: OwnedReadHalf,
    tx: mpsc::UnboundedSender<LoopEvent>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => SessionEvent::Closed {
                handle,
                reason: ReceiveError::PeerClosed,
            },
            Ok(n) => SessionEvent::Readable {
                handle,
                bytes: buf[..n].to_vec(),
            },
            Err(e) => SessionEvent::Closed {
                handle,
                reason: e.into(),
            },
        };
        let finished = matches!(event, SessionEvent::Closed { .. });
        if tx.send(LoopEvent::Session(event)).is_err() || finished {
            break;
        }
    }
}
