//! Login session lifecycle.
//!
//! Tracks the state machine for one connection attempt:
//! Idle → Resolving → Connecting → AwaitingInfoExchange → Ready → LoggingIn →
//! Terminal, with Closed reachable from every active state.
//!
//! A [`Session`] performs no I/O. It consumes [`SessionEvent`]s and answers
//! each with a [`Step`]: the [`Command`]s the driver must execute and the
//! [`SessionNotice`]s to surface to the user. Every network event carries the
//! [`SessionHandle`] of the attempt it belongs to; events for any handle but
//! the current one are dropped without touching the session.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::credentials::Credentials;
use crate::endpoint::{ResolvedAddress, ServerEndpoint};
use crate::error::{ConnectError, ProtocolError, ReceiveError, ResolveError, SendError, SessionError};
use crate::packet::{InboundResponse, OutboundRequest};
use crate::receive_buffer::{ReceiveBuffer, ReceiveConfig};

/// Generation counter identifying one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(pub u64);

/// Everything the game needs to join the server after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTicket {
    /// Address the launcher logged in through.
    pub address: ResolvedAddress,
    /// Opaque token issued by the server.
    pub token: Vec<u8>,
}

impl LaunchTicket {
    /// Token as text (lossy for non-UTF-8 bytes).
    pub fn token_text(&self) -> String {
        String::from_utf8_lossy(&self.token).into_owned()
    }
}

/// How a session finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Login accepted.
    Accepted(LaunchTicket),
    /// The server refused us before any login was attempted.
    Rejected(String),
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No server selected.
    Idle,
    /// Waiting for the host name lookup.
    Resolving,
    /// TCP connect in progress.
    Connecting,
    /// Server info requested, waiting for the banner.
    AwaitingInfoExchange,
    /// Connected and idle; a login may be submitted.
    Ready,
    /// Login request sent, waiting for the verdict.
    LoggingIn,
    /// Finished; the connection is gone.
    Terminal(Outcome),
    /// Failed; a new server selection is needed to try again.
    Closed(SessionError),
}

impl SessionState {
    /// Short state name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Connecting => "connecting",
            Self::AwaitingInfoExchange => "awaiting server info",
            Self::Ready => "ready",
            Self::LoggingIn => "logging in",
            Self::Terminal(_) => "terminal",
            Self::Closed(_) => "closed",
        }
    }

    /// States in which network events are still expected.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Resolving
                | Self::Connecting
                | Self::AwaitingInfoExchange
                | Self::Ready
                | Self::LoggingIn
        )
    }

    /// States that own a socket (or a connect in progress).
    pub fn holds_connection(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingInfoExchange | Self::Ready | Self::LoggingIn
        )
    }

    fn accepts_bytes(&self) -> bool {
        matches!(
            self,
            Self::AwaitingInfoExchange | Self::Ready | Self::LoggingIn
        )
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host name lookup finished.
    Resolved {
        /// Attempt the lookup was started for.
        handle: SessionHandle,
        /// IPv4 address or failure.
        result: Result<Ipv4Addr, ResolveError>,
    },
    /// TCP connect finished.
    ConnectComplete {
        /// Attempt the connect was started for.
        handle: SessionHandle,
        /// Success or failure.
        result: Result<(), ConnectError>,
    },
    /// Bytes arrived on the connection.
    Readable {
        /// Attempt owning the connection.
        handle: SessionHandle,
        /// Bytes from one read.
        bytes: Vec<u8>,
    },
    /// The connection was closed by the peer or failed while reading.
    Closed {
        /// Attempt owning the connection.
        handle: SessionHandle,
        /// What happened.
        reason: ReceiveError,
    },
    /// Writing a request failed.
    SendFailed {
        /// Attempt owning the connection.
        handle: SessionHandle,
        /// What happened.
        reason: SendError,
    },
    /// The user abandoned the current attempt.
    Cancelled,
}

impl SessionEvent {
    /// The attempt this event belongs to (`None` for [`SessionEvent::Cancelled`]).
    pub fn handle(&self) -> Option<SessionHandle> {
        match self {
            Self::Resolved { handle, .. }
            | Self::ConnectComplete { handle, .. }
            | Self::Readable { handle, .. }
            | Self::Closed { handle, .. }
            | Self::SendFailed { handle, .. } => Some(*handle),
            Self::Cancelled => None,
        }
    }
}

/// I/O the driver must perform on behalf of the session, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a lookup; report back with [`SessionEvent::Resolved`].
    Resolve {
        /// Tag for the result.
        handle: SessionHandle,
        /// Host to look up.
        host: String,
    },
    /// Abandon the outstanding lookup, if any.
    CancelResolve,
    /// Open a TCP connection; report back with [`SessionEvent::ConnectComplete`].
    Connect {
        /// Tag for the connection and all its events.
        handle: SessionHandle,
        /// Target address.
        addr: SocketAddrV4,
    },
    /// Write the whole packet in one go; report failures with
    /// [`SessionEvent::SendFailed`].
    Send {
        /// Attempt owning the connection.
        handle: SessionHandle,
        /// Encoded request.
        packet: Vec<u8>,
    },
    /// Drop the connection (and any connect in progress).
    Close,
}

/// User-facing results of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Progress text.
    Status(String),
    /// Server banner from an `HI` response.
    ServerInfo(String),
    /// Refusal text from a `NO` response.
    Rejected(String),
    /// Login accepted.
    Accepted(LaunchTicket),
    /// The session closed with an error.
    Failed(SessionError),
}

/// Output of one transition.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Step {
    /// I/O to perform, in order.
    pub commands: Vec<Command>,
    /// Things to tell the user, in order.
    pub notices: Vec<SessionNotice>,
}

impl Step {
    /// Whether the transition produced nothing at all.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notices.is_empty()
    }

    fn status(&mut self, text: String) {
        self.notices.push(SessionNotice::Status(text));
    }

    fn merge(&mut self, other: Step) {
        self.commands.extend(other.commands);
        self.notices.extend(other.notices);
    }
}

/// The login session state machine.
pub struct Session {
    state: SessionState,
    handle: SessionHandle,
    endpoint: Option<ServerEndpoint>,
    address: Option<ResolvedAddress>,
    receive: ReceiveBuffer,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ReceiveConfig::default())
    }
}

impl Session {
    /// Create an idle session.
    pub fn new(config: ReceiveConfig) -> Self {
        Self {
            state: SessionState::Idle,
            handle: SessionHandle(0),
            endpoint: None,
            address: None,
            receive: ReceiveBuffer::new(config),
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle of the current attempt.
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Whether `handle` identifies the current attempt.
    pub fn is_current(&self, handle: SessionHandle) -> bool {
        handle == self.handle
    }

    /// Server of the current attempt.
    pub fn endpoint(&self) -> Option<&ServerEndpoint> {
        self.endpoint.as_ref()
    }

    /// Address of the current attempt, once resolved.
    pub fn address(&self) -> Option<ResolvedAddress> {
        self.address
    }

    /// Bytes of a partially received packet.
    pub fn buffered_bytes(&self) -> usize {
        self.receive.bytes_received()
    }

    /// Begin a new attempt against `endpoint`, superseding any current one.
    pub fn start(&mut self, endpoint: ServerEndpoint) -> Step {
        let mut step = Step::default();
        self.supersede(&mut step);

        tracing::info!(
            "Session {:?}: retrieving server address for {}",
            self.handle,
            endpoint.host()
        );
        step.status(format!("Retrieving server address for {}", endpoint.host()));
        step.commands.push(Command::Resolve {
            handle: self.handle,
            host: endpoint.host().to_string(),
        });

        self.endpoint = Some(endpoint);
        self.state = SessionState::Resolving;
        step
    }

    /// Abandon the current attempt and return to idle.
    pub fn cancel(&mut self) -> Step {
        let mut step = Step::default();
        self.supersede(&mut step);
        self.endpoint = None;
        self.state = SessionState::Idle;
        step
    }

    /// Send a login request. Only acts in [`SessionState::Ready`]; anywhere
    /// else, including while a login is already in flight, it is a no-op.
    pub fn submit(&mut self, credentials: &Credentials) -> Step {
        let mut step = Step::default();
        if self.state != SessionState::Ready {
            tracing::debug!("Ignoring login submit while {}", self.state.name());
            return step;
        }

        tracing::info!("Session {:?}: logging in", self.handle);
        self.state = SessionState::LoggingIn;
        step.commands.push(Command::Send {
            handle: self.handle,
            packet: OutboundRequest::LoginRequest(credentials.clone()).encode(),
        });
        step.status("Logging in...".to_string());
        step
    }

    /// Feed one event into the state machine.
    pub fn handle_event(&mut self, event: SessionEvent) -> Step {
        match event {
            SessionEvent::Cancelled => self.cancel(),
            SessionEvent::Resolved { handle, result } if self.is_current(handle) => {
                self.on_resolved(result)
            }
            SessionEvent::ConnectComplete { handle, result } if self.is_current(handle) => {
                self.on_connect_complete(result)
            }
            SessionEvent::Readable { handle, bytes } if self.is_current(handle) => {
                self.on_readable(&bytes)
            }
            SessionEvent::Closed { handle, reason } if self.is_current(handle) => {
                self.fail(reason.into())
            }
            SessionEvent::SendFailed { handle, reason } if self.is_current(handle) => {
                self.fail(reason.into())
            }
            stale => {
                tracing::trace!(
                    "Dropping event for superseded session {:?} (current {:?})",
                    stale.handle(),
                    self.handle
                );
                Step::default()
            }
        }
    }

    // -- transitions --------------------------------------------------------

    /// Release everything owned by the current attempt and open a new generation.
    fn supersede(&mut self, step: &mut Step) {
        if self.state == SessionState::Resolving {
            step.commands.push(Command::CancelResolve);
        }
        if self.state.holds_connection() {
            step.commands.push(Command::Close);
        }
        self.handle = SessionHandle(self.handle.0 + 1);
        self.address = None;
        self.receive.clear();
    }

    fn on_resolved(&mut self, result: Result<Ipv4Addr, ResolveError>) -> Step {
        if self.state != SessionState::Resolving {
            tracing::warn!("Unexpected resolve result while {}", self.state.name());
            return Step::default();
        }
        let Some(port) = self.endpoint.as_ref().map(ServerEndpoint::port) else {
            return Step::default();
        };

        match result {
            Ok(ip) => {
                let address = ResolvedAddress { ip, port };
                tracing::info!("Session {:?}: connecting to {address}", self.handle);

                let mut step = Step::default();
                step.status(format!("Connecting to server {address}"));
                step.commands.push(Command::Connect {
                    handle: self.handle,
                    addr: address.socket_addr(),
                });
                self.address = Some(address);
                self.state = SessionState::Connecting;
                step
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn on_connect_complete(&mut self, result: Result<(), ConnectError>) -> Step {
        if self.state != SessionState::Connecting {
            tracing::warn!("Unexpected connect completion while {}", self.state.name());
            return Step::default();
        }

        match result {
            Ok(()) => {
                tracing::debug!("Session {:?}: connected, requesting server info", self.handle);
                self.receive.clear();
                self.state = SessionState::AwaitingInfoExchange;

                let mut step = Step::default();
                step.status("Retrieving server info...".to_string());
                step.commands.push(Command::Send {
                    handle: self.handle,
                    packet: OutboundRequest::ServerInfoRequest.encode(),
                });
                step
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn on_readable(&mut self, bytes: &[u8]) -> Step {
        let mut step = Step::default();
        if !self.state.accepts_bytes() {
            tracing::debug!(
                "Discarding {} bytes received while {}",
                bytes.len(),
                self.state.name()
            );
            return step;
        }

        self.receive.extend(bytes);
        while self.state.accepts_bytes() {
            let packet = match self.receive.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    step.merge(self.fail(e.into()));
                    break;
                }
            };

            match InboundResponse::decode(&packet) {
                Ok(response) => step.merge(self.dispatch(response)),
                Err(e) => step.merge(self.fail(e.into())),
            }
        }
        step
    }

    fn dispatch(&mut self, response: InboundResponse) -> Step {
        tracing::debug!(
            "Session {:?}: '{}' response while {}",
            self.handle,
            response.kind(),
            self.state.name()
        );

        let mut step = Step::default();
        let awaiting_info = self.state == SessionState::AwaitingInfoExchange;
        let logging_in = self.state == SessionState::LoggingIn;

        match response {
            InboundResponse::Info { message } => {
                self.state = SessionState::Ready;
                step.notices.push(SessionNotice::ServerInfo(text(&message)));
            }
            InboundResponse::Rejected { message } if awaiting_info => {
                let message = text(&message);
                tracing::info!("Session {:?}: refused by server: {message}", self.handle);
                self.receive.clear();
                self.state = SessionState::Terminal(Outcome::Rejected(message.clone()));
                step.commands.push(Command::Close);
                step.notices.push(SessionNotice::Rejected(message));
            }
            InboundResponse::Rejected { message } => {
                let message = text(&message);
                tracing::info!("Session {:?}: login rejected: {message}", self.handle);
                self.state = SessionState::Ready;
                step.notices.push(SessionNotice::Rejected(message));
            }
            InboundResponse::Accepted { token } if logging_in => {
                let Some(address) = self.address else {
                    return self.fail(self.unexpected("OK"));
                };
                tracing::info!("Session {:?}: login accepted", self.handle);
                let ticket = LaunchTicket { address, token };
                self.receive.clear();
                self.state = SessionState::Terminal(Outcome::Accepted(ticket.clone()));
                step.commands.push(Command::Close);
                step.notices.push(SessionNotice::Accepted(ticket));
            }
            InboundResponse::Accepted { .. } => return self.fail(self.unexpected("OK")),
        }
        step
    }

    fn unexpected(&self, kind: &'static str) -> SessionError {
        ProtocolError::UnexpectedKindForState {
            kind,
            state: self.state.name(),
        }
        .into()
    }

    /// Close the attempt with `error`. No-op once the session is no longer active.
    fn fail(&mut self, error: SessionError) -> Step {
        let mut step = Step::default();
        if !self.state.is_active() {
            tracing::debug!("Ignoring '{error}' while {}", self.state.name());
            return step;
        }

        tracing::warn!(
            "Session {:?} closed while {}: {error}",
            self.handle,
            self.state.name()
        );
        if self.state.holds_connection() {
            step.commands.push(Command::Close);
        }
        self.receive.clear();
        self.state = SessionState::Closed(error.clone());
        step.notices.push(SessionNotice::Failed(error));
        step
    }
}

/// Payload text for display.
fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::DEFAULT_PORT;
    use crate::packet::encode_response;

    const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn endpoint(s: &str) -> ServerEndpoint {
        s.parse().unwrap()
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "hunter2").unwrap()
    }

    /// Drive a fresh session to `Ready` and return it.
    fn ready_session() -> Session {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });
        session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: encode_response(b"HI", b"Welcome\0"),
        });
        assert_eq!(session.state(), &SessionState::Ready);
        session
    }

    fn logging_in_session() -> Session {
        let mut session = ready_session();
        session.submit(&creds());
        assert_eq!(session.state(), &SessionState::LoggingIn);
        session
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::default();
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.handle(), SessionHandle(0));
    }

    #[test]
    fn test_start_requests_resolution() {
        let mut session = Session::default();
        let step = session.start(endpoint("dso.test:7000"));

        assert_eq!(session.state(), &SessionState::Resolving);
        assert_eq!(session.handle(), SessionHandle(1));
        assert_eq!(
            step.commands,
            vec![Command::Resolve {
                handle: SessionHandle(1),
                host: "dso.test".into()
            }]
        );
        assert_eq!(
            step.notices,
            vec![SessionNotice::Status(
                "Retrieving server address for dso.test".into()
            )]
        );
    }

    #[test]
    fn test_resolved_connects_with_endpoint_port() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let step = session.handle_event(SessionEvent::Resolved {
            handle: session.handle(),
            result: Ok(SERVER_IP),
        });

        assert_eq!(session.state(), &SessionState::Connecting);
        assert_eq!(
            step.commands,
            vec![Command::Connect {
                handle: session.handle(),
                addr: SocketAddrV4::new(SERVER_IP, DEFAULT_PORT)
            }]
        );
        assert_eq!(
            session.address(),
            Some(ResolvedAddress {
                ip: SERVER_IP,
                port: DEFAULT_PORT
            })
        );
    }

    #[test]
    fn test_resolve_failure_closes_without_socket() {
        let mut session = Session::default();
        session.start(endpoint("nowhere.test"));
        let err = ResolveError::NotFound("nowhere.test".into());
        let step = session.handle_event(SessionEvent::Resolved {
            handle: session.handle(),
            result: Err(err.clone()),
        });

        assert_eq!(session.state(), &SessionState::Closed(err.clone().into()));
        assert!(step.commands.is_empty());
        assert_eq!(step.notices, vec![SessionNotice::Failed(err.into())]);
    }

    #[test]
    fn test_connect_sends_server_info_request() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        let step = session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });

        assert_eq!(session.state(), &SessionState::AwaitingInfoExchange);
        assert_eq!(
            step.commands,
            vec![Command::Send {
                handle: h,
                packet: vec![0x06, 0x00, b'L', b'A', b'H', b'I']
            }]
        );
    }

    #[test]
    fn test_connect_refused_closes() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        let step = session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Err(ConnectError::Refused),
        });

        assert_eq!(
            session.state(),
            &SessionState::Closed(ConnectError::Refused.into())
        );
        assert_eq!(step.commands, vec![Command::Close]);
    }

    #[test]
    fn test_info_literal_leads_to_ready() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });

        let packet = vec![14, 0, b'l', b'a', b'H', b'I', 4, 0, 0, 0, b'O', b'K', 0, 0];
        let step = session.handle_event(SessionEvent::Readable { handle: h, bytes: packet });

        assert_eq!(session.state(), &SessionState::Ready);
        assert_eq!(step.notices, vec![SessionNotice::ServerInfo("OK".into())]);
        assert!(step.commands.is_empty(), "connection stays open");
    }

    #[test]
    fn test_info_split_across_reads() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });

        let packet = encode_response(b"HI", b"Server up\0");
        for chunk in packet[..packet.len() - 1].chunks(3) {
            let step = session.handle_event(SessionEvent::Readable {
                handle: h,
                bytes: chunk.to_vec(),
            });
            assert!(step.is_empty());
            assert_eq!(session.state(), &SessionState::AwaitingInfoExchange);
        }
        assert_eq!(session.buffered_bytes(), packet.len() - 1);

        let step = session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: packet[packet.len() - 1..].to_vec(),
        });
        assert_eq!(session.state(), &SessionState::Ready);
        assert_eq!(step.notices, vec![SessionNotice::ServerInfo("Server up".into())]);
        assert_eq!(session.buffered_bytes(), 0);
    }

    #[test]
    fn test_rejected_before_login_is_terminal() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });
        let step = session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: encode_response(b"NO", b"Server full\0"),
        });

        assert_eq!(
            session.state(),
            &SessionState::Terminal(Outcome::Rejected("Server full".into()))
        );
        assert_eq!(step.commands, vec![Command::Close]);
    }

    #[test]
    fn test_accepted_before_login_is_protocol_error() {
        let mut session = Session::default();
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });
        let step = session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: encode_response(b"OK", b"tok\0"),
        });

        let expected: SessionError = ProtocolError::UnexpectedKindForState {
            kind: "OK",
            state: "awaiting server info",
        }
        .into();
        assert_eq!(session.state(), &SessionState::Closed(expected));
        assert_eq!(step.commands, vec![Command::Close]);
    }

    #[test]
    fn test_submit_sends_login_request() {
        let mut session = ready_session();
        let step = session.submit(&creds());

        assert_eq!(session.state(), &SessionState::LoggingIn);
        assert_eq!(
            step.commands,
            vec![Command::Send {
                handle: session.handle(),
                packet: OutboundRequest::LoginRequest(creds()).encode()
            }]
        );
        assert_eq!(step.notices, vec![SessionNotice::Status("Logging in...".into())]);
    }

    #[test]
    fn test_submit_while_logging_in_is_noop() {
        let mut session = logging_in_session();
        let step = session.submit(&creds());
        assert!(step.is_empty());
        assert_eq!(session.state(), &SessionState::LoggingIn);
    }

    #[test]
    fn test_submit_before_ready_is_noop() {
        let mut session = Session::default();
        assert!(session.submit(&creds()).is_empty());
        session.start(endpoint("dso.test"));
        assert!(session.submit(&creds()).is_empty());
        assert_eq!(session.state(), &SessionState::Resolving);
    }

    #[test]
    fn test_rejected_during_login_returns_to_ready() {
        let mut session = logging_in_session();
        let h = session.handle();
        let step = session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: encode_response(b"NO", b"Bad password\0"),
        });

        assert_eq!(session.state(), &SessionState::Ready);
        assert_eq!(step.notices, vec![SessionNotice::Rejected("Bad password".into())]);
        assert!(
            !step.commands.contains(&Command::Close),
            "rejection keeps the socket open"
        );

        // A second attempt goes out on the same connection.
        let retry = session.submit(&creds());
        assert!(matches!(retry.commands[..], [Command::Send { handle, .. }] if handle == h));
    }

    #[test]
    fn test_accepted_during_login_is_terminal_and_closes() {
        let mut session = logging_in_session();
        let step = session.handle_event(SessionEvent::Readable {
            handle: session.handle(),
            bytes: encode_response(b"OK", b"abc123\0"),
        });

        let ticket = LaunchTicket {
            address: ResolvedAddress {
                ip: SERVER_IP,
                port: DEFAULT_PORT,
            },
            token: b"abc123".to_vec(),
        };
        assert_eq!(ticket.token_text(), "abc123");
        assert_eq!(
            session.state(),
            &SessionState::Terminal(Outcome::Accepted(ticket.clone()))
        );
        assert_eq!(step.commands, vec![Command::Close]);
        assert_eq!(step.notices, vec![SessionNotice::Accepted(ticket)]);
    }

    #[test]
    fn test_peer_close_after_accept_is_ignored() {
        let mut session = logging_in_session();
        let h = session.handle();
        session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: encode_response(b"OK", b"abc123\0"),
        });
        let step = session.handle_event(SessionEvent::Closed {
            handle: h,
            reason: ReceiveError::PeerClosed,
        });
        assert!(step.is_empty());
        assert!(matches!(
            session.state(),
            SessionState::Terminal(Outcome::Accepted(_))
        ));
    }

    #[test]
    fn test_bad_signature_closes_with_error() {
        let mut session = ready_session();
        let mut packet = encode_response(b"HI", b"garbage\0");
        packet[2] = b'x';
        packet[3] = b'y';
        let step = session.handle_event(SessionEvent::Readable {
            handle: session.handle(),
            bytes: packet,
        });

        let expected: SessionError = ProtocolError::BadSignature(*b"xy").into();
        assert_eq!(session.state(), &SessionState::Closed(expected.clone()));
        assert_eq!(step.commands, vec![Command::Close]);
        assert_eq!(step.notices, vec![SessionNotice::Failed(expected)]);
    }

    #[test]
    fn test_oversized_declared_length_closes() {
        let mut session = Session::new(ReceiveConfig { max_packet_len: 32 });
        session.start(endpoint("dso.test"));
        let h = session.handle();
        session.handle_event(SessionEvent::Resolved {
            handle: h,
            result: Ok(SERVER_IP),
        });
        session.handle_event(SessionEvent::ConnectComplete {
            handle: h,
            result: Ok(()),
        });
        session.handle_event(SessionEvent::Readable {
            handle: h,
            bytes: 4000u16.to_le_bytes().to_vec(),
        });

        assert!(matches!(
            session.state(),
            SessionState::Closed(SessionError::Protocol(ProtocolError::OversizedPacket { .. }))
        ));
    }

    #[test]
    fn test_peer_closed_while_ready() {
        let mut session = ready_session();
        let step = session.handle_event(SessionEvent::Closed {
            handle: session.handle(),
            reason: ReceiveError::PeerClosed,
        });
        assert_eq!(
            session.state(),
            &SessionState::Closed(ReceiveError::PeerClosed.into())
        );
        assert_eq!(step.commands, vec![Command::Close]);
    }

    #[test]
    fn test_send_failure_closes() {
        let mut session = logging_in_session();
        session.handle_event(SessionEvent::SendFailed {
            handle: session.handle(),
            reason: SendError::ShortWrite,
        });
        assert_eq!(
            session.state(),
            &SessionState::Closed(SendError::ShortWrite.into())
        );
    }

    #[test]
    fn test_two_packets_in_one_read() {
        let mut session = logging_in_session();
        let bytes = [
            encode_response(b"NO", b"Try again\0"),
            encode_response(b"HI", b"Still here\0"),
        ]
        .concat();
        let step = session.handle_event(SessionEvent::Readable {
            handle: session.handle(),
            bytes,
        });
        assert_eq!(
            step.notices,
            vec![
                SessionNotice::Rejected("Try again".into()),
                SessionNotice::ServerInfo("Still here".into()),
            ]
        );
        assert_eq!(session.state(), &SessionState::Ready);
    }

    #[test]
    fn test_stale_resolution_is_dropped() {
        let mut session = Session::default();
        session.start(endpoint("server-a.test"));
        let handle_a = session.handle();

        let switch = session.start(endpoint("server-b.test:7000"));
        let handle_b = session.handle();
        assert_ne!(handle_a, handle_b);
        assert_eq!(switch.commands[0], Command::CancelResolve);

        let step = session.handle_event(SessionEvent::Resolved {
            handle: handle_a,
            result: Ok(Ipv4Addr::new(192, 0, 2, 1)),
        });

        assert!(step.is_empty());
        assert_eq!(session.state(), &SessionState::Resolving);
        assert_eq!(session.handle(), handle_b);
        assert_eq!(session.address(), None);
        assert_eq!(session.endpoint().map(ServerEndpoint::host), Some("server-b.test"));
    }

    #[test]
    fn test_stale_bytes_do_not_touch_new_buffer() {
        let mut session = ready_session();
        let old = session.handle();
        let step = session.start(endpoint("other.test"));
        assert!(step.commands.contains(&Command::Close));

        let packet = encode_response(b"OK", b"stale\0");
        assert!(
            session
                .handle_event(SessionEvent::Readable {
                    handle: old,
                    bytes: packet,
                })
                .is_empty()
        );
        assert!(
            session
                .handle_event(SessionEvent::Closed {
                    handle: old,
                    reason: ReceiveError::PeerClosed,
                })
                .is_empty()
        );
        assert_eq!(session.buffered_bytes(), 0);
        assert_eq!(session.state(), &SessionState::Resolving);
    }

    #[test]
    fn test_cancel_discards_partial_packet() {
        let mut session = ready_session();
        let packet = encode_response(b"HI", b"partial\0");
        session.handle_event(SessionEvent::Readable {
            handle: session.handle(),
            bytes: packet[..5].to_vec(),
        });
        assert_eq!(session.buffered_bytes(), 5);

        let step = session.handle_event(SessionEvent::Cancelled);
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.buffered_bytes(), 0);
        assert_eq!(step.commands, vec![Command::Close]);
        assert_eq!(session.endpoint(), None);
    }

    #[test]
    fn test_restart_after_failure() {
        let mut session = ready_session();
        session.handle_event(SessionEvent::Closed {
            handle: session.handle(),
            reason: ReceiveError::PeerClosed,
        });
        let step = session.start(endpoint("dso.test"));
        assert_eq!(session.state(), &SessionState::Resolving);
        assert!(!step.commands.contains(&Command::Close), "socket already released");
    }
}
