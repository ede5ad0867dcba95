//! Reassembly of response packets from partial socket reads.
//!
//! TCP hands us arbitrary slices of the byte stream. The buffer accumulates
//! them until the 2-byte length prefix is known, then until that many bytes
//! are present, and only then releases the packet for decoding. Bytes that
//! already belong to the next packet stay buffered.

use crate::error::ProtocolError;
use crate::packet::{self, RESPONSE_HEADER_LEN};

/// Limits applied while reassembling.
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Largest declared packet length accepted. Default: 65535.
    pub max_packet_len: usize,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            max_packet_len: packet::MAX_PACKET_LEN,
        }
    }
}

/// Per-session accumulator for inbound bytes.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    buf: Vec<u8>,
    config: ReceiveConfig,
}

impl ReceiveBuffer {
    /// Create an empty buffer with the given limits.
    pub fn new(config: ReceiveConfig) -> Self {
        Self {
            buf: Vec::new(),
            config,
        }
    }

    /// Append bytes from one read.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Total length announced by the pending packet, once 2 bytes are in.
    pub fn declared_len(&self) -> Option<usize> {
        packet::declared_len(&self.buf)
    }

    /// Bytes received so far for the pending packet (capped at its length).
    pub fn bytes_received(&self) -> usize {
        match self.declared_len() {
            Some(declared) => self.buf.len().min(declared),
            None => self.buf.len(),
        }
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop everything, including any partial packet.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Take the next complete packet, if one is fully buffered.
    ///
    /// A declared length that can never form a valid response (shorter than
    /// the envelope header or above the configured maximum) is an error;
    /// the buffer should be discarded afterwards.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let Some(declared) = self.declared_len() else {
            return Ok(None);
        };

        if declared > self.config.max_packet_len {
            return Err(ProtocolError::OversizedPacket {
                declared,
                max: self.config.max_packet_len,
            });
        }
        if declared < RESPONSE_HEADER_LEN {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: self.buf.len(),
            });
        }

        if self.buf.len() < declared {
            return Ok(None);
        }

        let rest = self.buf.split_off(declared);
        let packet = std::mem::replace(&mut self.buf, rest);
        Ok(Some(packet))
    }
}
