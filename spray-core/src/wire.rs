//! Packet layout: bincode header (fixed `HEADER_LEN` bytes) followed by the payload when present.

use crate::protocol::{Header, Payload, HEADER_LEN, PAYLOAD_LEN};

/// A decoded protocol packet. Offers carry a payload; requests and hand-offs do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Option<Payload>,
}

/// Encode header and optional payload into one owned buffer.
pub fn encode_packet(header: &Header, payload: Option<&Payload>) -> Result<Vec<u8>, PacketEncodeError> {
    let mut out = Vec::with_capacity(HEADER_LEN + PAYLOAD_LEN);
    bincode::serialize_into(&mut out, header)?;
    if out.len() != HEADER_LEN {
        return Err(PacketEncodeError::HeaderSize(out.len()));
    }
    if let Some(p) = payload {
        out.extend_from_slice(p.as_bytes());
    }
    Ok(out)
}

/// Error encoding a packet (bincode failure or unexpected header size).
#[derive(Debug, thiserror::Error)]
pub enum PacketEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("encoded header is {0} bytes")]
    HeaderSize(usize),
}

/// Decode a packet. Only version and magic are validated; anything else is taken as-is.
/// Bytes after the header shorter than a full payload are treated as no payload.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, PacketDecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(PacketDecodeError::Truncated(bytes.len()));
    }
    let header: Header = bincode::deserialize(&bytes[..HEADER_LEN])?;
    if !header.is_spray_wait() {
        return Err(PacketDecodeError::Foreign);
    }
    let rest = &bytes[HEADER_LEN..];
    let payload = if rest.len() >= PAYLOAD_LEN {
        let mut buf = [0u8; PAYLOAD_LEN];
        buf.copy_from_slice(&rest[..PAYLOAD_LEN]);
        Some(Payload::new(buf))
    } else {
        None
    };
    Ok(Packet { header, payload })
}

/// Error decoding a packet. All variants are dropped silently by the state machine.
#[derive(Debug, thiserror::Error)]
pub enum PacketDecodeError {
    #[error("packet of {0} bytes is shorter than a header")]
    Truncated(usize),
    #[error("not a spray-and-wait packet")]
    Foreign,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
