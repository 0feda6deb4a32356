//! Spray-and-Wait wire protocol: header, payload, and protocol constants.

use serde::{Deserialize, Serialize};

use crate::identity::NodeAddr;

/// Current protocol version. Packets carrying any other version are foreign.
pub const PROTOCOL_VERSION: u8 = 1;

/// Two ASCII bytes identifying the protocol ("Spray and Wait").
pub const MAGIC: [u8; 2] = *b"SW";

/// Encoded header size: version(1) magic(2) num_copies(2) origin(2) destination(2) sequence_id(2).
pub const HEADER_LEN: usize = 11;

/// Fixed payload size carried by broadcast offers.
pub const PAYLOAD_LEN: usize = 10;

/// Header carried by every protocol packet. Encoding is bincode (see wire module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u8,
    pub magic: [u8; 2],
    /// Forwarding budget of this copy. On a broadcast offer a value of 1 means the holder
    /// is only looking for the destination; on a hand-off it is the budget to adopt.
    pub num_copies: u16,
    pub origin: NodeAddr,
    pub destination: NodeAddr,
    /// Assigned by the origin; kept for the whole life of the message.
    pub sequence_id: u16,
}

impl Header {
    /// Header for a freshly originated message.
    pub fn new(origin: NodeAddr, destination: NodeAddr, sequence_id: u16, num_copies: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            magic: MAGIC,
            num_copies,
            origin,
            destination,
            sequence_id,
        }
    }

    /// Version and magic both match. Nothing else is checked.
    pub fn is_spray_wait(&self) -> bool {
        self.version == PROTOCOL_VERSION && self.magic == MAGIC
    }

    pub fn key(&self) -> PacketKey {
        PacketKey {
            sequence_id: self.sequence_id,
            origin: self.origin,
            destination: self.destination,
        }
    }
}

/// Natural key of a message: unique among live queue entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketKey {
    pub sequence_id: u16,
    pub origin: NodeAddr,
    pub destination: NodeAddr,
}

/// Opaque application data. Always `PAYLOAD_LEN` bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    pub const fn new(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Payload(bytes)
    }

    /// Copy `data` into a zero-padded payload.
    pub fn from_slice(data: &[u8]) -> Result<Self, PayloadTooLong> {
        if data.len() > PAYLOAD_LEN {
            return Err(PayloadTooLong(data.len()));
        }
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Payload(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// Payload bytes up to the first zero pad byte.
    pub fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(PAYLOAD_LEN);
        &self.0[..end]
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload({:?})", String::from_utf8_lossy(self.trimmed()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("payload of {0} bytes exceeds {PAYLOAD_LEN}")]
pub struct PayloadTooLong(pub usize);
