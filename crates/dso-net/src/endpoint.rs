//! Server endpoints as typed by the user and addresses as resolved.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// Port used when a server entry carries no `:port` suffix.
pub const DEFAULT_PORT: u16 = 14902;

/// Errors from parsing a `host[:port]` server entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// Nothing before the colon (or an empty entry).
    #[error("server entry has no host name")]
    EmptyHost,
    /// The port part is not a number in `1..=65535`.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// A server the user can pick: host name plus TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    host: String,
    port: u16,
}

impl ServerEndpoint {
    /// Build an endpoint from already-separated parts.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort(port.to_string()));
        }
        Ok(Self { host, port })
    }

    /// Host name or address literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointError;

    /// Parse `"host"` or `"host:port"`. A trailing colon with nothing after
    /// it selects [`DEFAULT_PORT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.split_once(':') {
            Some((host, port)) => (host.trim(), port.trim()),
            None => (s, ""),
        };

        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }

        let port = if port.is_empty() {
            DEFAULT_PORT
        } else {
            match port.parse::<u16>() {
                Ok(0) | Err(_) => return Err(EndpointError::InvalidPort(port.to_string())),
                Ok(p) => p,
            }
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An endpoint after resolution: the address the session connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    /// IPv4 address returned by the resolver.
    pub ip: Ipv4Addr,
    /// Port carried over from the [`ServerEndpoint`].
    pub port: u16,
}

impl ResolvedAddress {
    /// Socket address for `connect`.
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_only_uses_default_port() {
        let ep: ServerEndpoint = "dso.example.net".parse().unwrap();
        assert_eq!(ep.host(), "dso.example.net");
        assert_eq!(ep.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_host_and_port() {
        let ep: ServerEndpoint = "10.1.2.3:7000".parse().unwrap();
        assert_eq!(ep.host(), "10.1.2.3");
        assert_eq!(ep.port(), 7000);
    }

    #[test]
    fn test_trailing_colon_uses_default_port() {
        let ep: ServerEndpoint = "localhost:".parse().unwrap();
        assert_eq!(ep.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        for bad in ["host:abc", "host:12x", "host:-1", "host:65536", "host:0", "host:1:2"] {
            let result = bad.parse::<ServerEndpoint>();
            assert!(
                matches!(result, Err(EndpointError::InvalidPort(_))),
                "{bad} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn test_empty_host_rejected() {
        assert_eq!("".parse::<ServerEndpoint>(), Err(EndpointError::EmptyHost));
        assert_eq!(":14902".parse::<ServerEndpoint>(), Err(EndpointError::EmptyHost));
        assert_eq!(
            ServerEndpoint::new("  ", 1),
            Err(EndpointError::EmptyHost)
        );
    }

    #[test]
    fn test_whitespace_trimmed() {
        let ep: ServerEndpoint = "  example.org : 99 ".parse().unwrap();
        assert_eq!(ep.host(), "example.org");
        assert_eq!(ep.port(), 99);
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        let ep = ServerEndpoint::new("example.org", 1234).unwrap();
        assert_eq!(ep.to_string().parse::<ServerEndpoint>().unwrap(), ep);
    }

    #[test]
    fn test_resolved_address_display() {
        let addr = ResolvedAddress {
            ip: Ipv4Addr::new(192, 168, 0, 7),
            port: DEFAULT_PORT,
        };
        assert_eq!(addr.to_string(), "192.168.0.7:14902");
        assert_eq!(addr.socket_addr().port(), DEFAULT_PORT);
    }
}
