//! Error taxonomy for the login session.
//!
//! Every variant is recoverable at the session level: it drives the session
//! into its closed state with a reported reason. Reasons are kept as owned
//! strings so errors can be cloned into notifications and compared in tests.

/// Hostname resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The name resolved, but not to any IPv4 address.
    #[error("no IPv4 address found for '{0}'")]
    NotFound(String),
    /// The lookup itself failed.
    #[error("lookup failed: {0}")]
    TransportFailure(String),
}

/// TCP connection establishment failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The remote end actively refused the connection.
    #[error("connection refused")]
    Refused,
    /// Any other socket-level failure.
    #[error("connect failed: {0}")]
    TransportFailure(String),
    /// The optional caller-supplied connect deadline elapsed.
    #[error("connect timed out")]
    TimedOut,
}

impl From<std::io::Error> for ConnectError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => Self::Refused,
            _ => Self::TransportFailure(e.to_string()),
        }
    }
}

/// Failures while writing a request packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The socket accepted fewer bytes than the whole packet.
    #[error("short write")]
    ShortWrite,
    /// Any other socket-level failure.
    #[error("send failed: {0}")]
    TransportFailure(String),
}

impl From<std::io::Error> for SendError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WriteZero => Self::ShortWrite,
            _ => Self::TransportFailure(e.to_string()),
        }
    }
}

/// Failures while reading from an open connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// The peer closed the connection (a zero-byte read).
    #[error("peer closed the connection")]
    PeerClosed,
    /// Any other socket-level failure.
    #[error("receive failed: {0}")]
    TransportFailure(String),
}

impl From<std::io::Error> for ReceiveError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::PeerClosed,
            _ => Self::TransportFailure(e.to_string()),
        }
    }
}

/// Malformed or out-of-place packets from the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The envelope signature was not `la`.
    #[error("bad packet signature {0:02x?}")]
    BadSignature([u8; 2]),
    /// The two-byte kind code is not one of `HI`, `NO`, `OK`.
    #[error("unknown response kind {0:02x?}")]
    UnknownKind([u8; 2]),
    /// The declared packet length is above the configured maximum.
    #[error("declared packet length {declared} exceeds maximum {max}")]
    OversizedPacket {
        /// Length announced by the prefix.
        declared: usize,
        /// Configured ceiling.
        max: usize,
    },
    /// The declared lengths disagree with the bytes of the packet.
    #[error("packet length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        /// Length announced by the packet.
        declared: usize,
        /// Bytes actually available.
        actual: usize,
    },
    /// A well-formed response arrived in a state that cannot accept it.
    #[error("unexpected '{kind}' response while {state}")]
    UnexpectedKindForState {
        /// Response kind, e.g. `OK`.
        kind: &'static str,
        /// Session state name at the time.
        state: &'static str,
    },
}

/// Any reason a session ends up closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Address resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Connection establishment failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// Writing a request failed.
    #[error(transparent)]
    Send(#[from] SendError),
    /// Reading from the connection failed or the peer went away.
    #[error(transparent)]
    Receive(#[from] ReceiveError),
    /// The server sent something we cannot accept.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether picking a server again can reasonably succeed.
    ///
    /// Transport-level failures are transient from the user's point of view;
    /// a server that speaks the wrong protocol will keep doing so.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_refused_maps_to_refused() {
        let err = ConnectError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(err, ConnectError::Refused);
    }

    #[test]
    fn test_write_zero_maps_to_short_write() {
        let err = SendError::from(io::Error::from(io::ErrorKind::WriteZero));
        assert_eq!(err, SendError::ShortWrite);
    }

    #[test]
    fn test_reset_counts_as_peer_closed() {
        let err = ReceiveError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(err, ReceiveError::PeerClosed);
    }

    #[test]
    fn test_protocol_errors_are_not_retryable() {
        let proto: SessionError = ProtocolError::BadSignature(*b"xy").into();
        let closed: SessionError = ReceiveError::PeerClosed.into();
        assert!(!proto.is_retryable());
        assert!(closed.is_retryable());
    }

    #[test]
    fn test_transparent_display() {
        let err: SessionError = ResolveError::NotFound("nowhere".into()).into();
        assert_eq!(err.to_string(), "no IPv4 address found for 'nowhere'");
    }
}
