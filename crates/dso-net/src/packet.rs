//! Wire packets: the two client requests and the server response envelope.
//!
//! Every packet in both directions starts with its total length (prefix
//! included) as a `u16` little-endian value.
//!
//! ```text
//! client -> server
//!   server info: | 06 00 | L A H I |
//!   login:       | len:2 | L A U P | ulen:2 | 00 00 | user.. 00 | plen:2 | 00 00 | pass.. 00 |
//!
//! server -> client
//!   +---------+-------+--------+----------------+-------------------+
//!   | len:2LE | "la"  | kind:2 | payload_len:4LE| payload           |
//!   +---------+-------+--------+----------------+-------------------+
//!   kind: "HI" info, "NO" rejected, "OK" accepted (payload = token)
//! ```

use crate::credentials::Credentials;
use crate::error::ProtocolError;

/// Size of the total-length prefix.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Size of the inbound envelope before the payload.
pub const RESPONSE_HEADER_LEN: usize = 10;

/// Largest packet a 16-bit length prefix can describe.
pub const MAX_PACKET_LEN: usize = u16::MAX as usize;

const SERVER_INFO_TAG: &[u8; 4] = b"LAHI";
const LOGIN_TAG: &[u8; 4] = b"LAUP";
const RESPONSE_SIGNATURE: &[u8; 2] = b"la";

/// Read the total-length prefix, if enough bytes are present.
pub fn declared_len(buf: &[u8]) -> Option<usize> {
    match buf {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi]) as usize),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A request the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRequest {
    /// Ask the server for its banner; sent right after connecting.
    ServerInfoRequest,
    /// Authenticate.
    LoginRequest(Credentials),
}

impl OutboundRequest {
    /// Serialize into exactly one wire packet.
    ///
    /// Cannot fail: [`Credentials`] bounds both fields, so the total always
    /// fits the 16-bit prefix.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::ServerInfoRequest => {
                let mut out = Vec::with_capacity(6);
                out.extend_from_slice(&6u16.to_le_bytes());
                out.extend_from_slice(SERVER_INFO_TAG);
                out
            }
            Self::LoginRequest(creds) => {
                let total = LENGTH_PREFIX_LEN
                    + LOGIN_TAG.len()
                    + field_len(creds.username())
                    + field_len(creds.password());
                debug_assert!(total <= MAX_PACKET_LEN);

                let mut out = Vec::with_capacity(total);
                out.extend_from_slice(&(total as u16).to_le_bytes());
                out.extend_from_slice(LOGIN_TAG);
                put_field(&mut out, creds.username());
                put_field(&mut out, creds.password());
                out
            }
        }
    }
}

/// Encoded size of a string field: length word, reserved word, bytes, NUL.
fn field_len(value: &[u8]) -> usize {
    4 + value.len() + 1
}

fn put_field(out: &mut Vec<u8>, value: &[u8]) {
    let len = (value.len() + 1) as u16;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(value);
    out.push(0);
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundResponse {
    /// `HI`: server banner / status text.
    Info {
        /// Message bytes without the terminator.
        message: Vec<u8>,
    },
    /// `NO`: login (or connection) refused, with a reason.
    Rejected {
        /// Message bytes without the terminator.
        message: Vec<u8>,
    },
    /// `OK`: login accepted; the token is handed to the game.
    Accepted {
        /// Opaque token bytes without the terminator.
        token: Vec<u8>,
    },
}

impl InboundResponse {
    /// Two-letter kind code as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Info { .. } => "HI",
            Self::Rejected { .. } => "NO",
            Self::Accepted { .. } => "OK",
        }
    }

    /// Decode one complete packet.
    ///
    /// `packet` must hold exactly the bytes announced by its length prefix;
    /// reassembly from partial reads is the receive buffer's job.
    pub fn decode(packet: &[u8]) -> Result<Self, ProtocolError> {
        let declared = declared_len(packet).ok_or(ProtocolError::LengthMismatch {
            declared: 0,
            actual: packet.len(),
        })?;

        if declared != packet.len() || declared < RESPONSE_HEADER_LEN {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: packet.len(),
            });
        }

        let signature = [packet[2], packet[3]];
        if &signature != RESPONSE_SIGNATURE {
            return Err(ProtocolError::BadSignature(signature));
        }

        let kind = [packet[4], packet[5]];
        let payload_len =
            u32::from_le_bytes([packet[6], packet[7], packet[8], packet[9]]) as usize;
        let available = packet.len() - RESPONSE_HEADER_LEN;
        if payload_len > available {
            return Err(ProtocolError::LengthMismatch {
                declared: RESPONSE_HEADER_LEN.saturating_add(payload_len),
                actual: packet.len(),
            });
        }

        let payload = until_nul(&packet[RESPONSE_HEADER_LEN..RESPONSE_HEADER_LEN + payload_len]);

        match &kind {
            b"HI" => Ok(Self::Info { message: payload }),
            b"NO" => Ok(Self::Rejected { message: payload }),
            b"OK" => Ok(Self::Accepted { token: payload }),
            _ => Err(ProtocolError::UnknownKind(kind)),
        }
    }
}

/// Payload text ends at the first NUL, or at the end of the payload.
fn until_nul(bytes: &[u8]) -> Vec<u8> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].to_vec()
}

/// Encode a response envelope. The launcher never sends these; tests and
/// fake servers do.
///
/// # Panics
///
/// If the packet would not fit the 16-bit length prefix, i.e. the payload is
/// longer than `u16::MAX - 10` bytes.
pub fn encode_response(kind: &[u8; 2], payload: &[u8]) -> Vec<u8> {
    let total = RESPONSE_HEADER_LEN + payload.len();
    let prefix = u16::try_from(total).unwrap_or_else(|_| {
        panic!("response of {total} bytes exceeds the 16-bit length prefix")
    });
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&prefix.to_le_bytes());
    out.extend_from_slice(RESPONSE_SIGNATURE);
    out.extend_from_slice(kind);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
