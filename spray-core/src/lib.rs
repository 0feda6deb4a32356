//! Spray-and-Wait delay tolerant routing engine.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod config;
pub mod copies;
pub mod identity;
pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod wire;

pub use config::Config;
pub use identity::{AddrParseError, NodeAddr};
pub use protocol::{Header, PacketKey, Payload, PayloadTooLong, PROTOCOL_VERSION};
pub use queue::{EntryId, QueueFull};
pub use wire::{decode_packet, encode_packet, Packet, PacketDecodeError, PacketEncodeError};
pub use crate::core::{Action, Event, OriginateError, SprayWaitCore, Timer};

pub mod core;
