//! Node identity: fixed-width node addresses used as origin, destination and link peer.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Width of a node address in bytes.
pub const ADDR_LEN: usize = 2;

/// Node address (2 bytes, Rime-style). Opaque to the protocol; compared byte-for-byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddr([u8; ADDR_LEN]);

impl NodeAddr {
    pub const fn from_bytes(bytes: [u8; ADDR_LEN]) -> Self {
        NodeAddr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }

    /// Derive an address from a stable node name (first bytes of SHA-256).
    /// Different names may collide; the address space is only 16 bits.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"spraywait-node-v1");
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        let mut addr = [0u8; ADDR_LEN];
        addr.copy_from_slice(&digest[..ADDR_LEN]);
        NodeAddr(addr)
    }

    /// Pick a random address.
    pub fn random() -> Self {
        let mut addr = [0u8; ADDR_LEN];
        rand::thread_rng().fill_bytes(&mut addr);
        NodeAddr(addr)
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddr({})", self)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.0[0], self.0[1])
    }
}

impl FromStr for NodeAddr {
    type Err = AddrParseError;

    /// Parse the `Display` form: exactly four hex digits, e.g. `"0a1f"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != ADDR_LEN * 2 || !s.is_ascii() {
            return Err(AddrParseError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddrParseError::Digit(s.to_string()));
        }
        let mut addr = [0u8; ADDR_LEN];
        for (i, byte) in addr.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| AddrParseError::Digit(pair.to_string()))?;
        }
        Ok(NodeAddr(addr))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("expected 4 hex digits, got {0} characters")]
    Length(usize),
    #[error("invalid hex digits: {0}")]
    Digit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_then_parse() {
        let addr = NodeAddr::from_bytes([0x0a, 0xf1]);
        assert_eq!(addr.to_string(), "0af1");
        assert_eq!("0af1".parse::<NodeAddr>().unwrap(), addr);
        assert_eq!(" 0AF1 ".parse::<NodeAddr>().unwrap(), addr);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("abc".parse::<NodeAddr>(), Err(AddrParseError::Length(3)));
        assert!(matches!(
            "zz01".parse::<NodeAddr>(),
            Err(AddrParseError::Digit(_))
        ));
        assert!("ééé".parse::<NodeAddr>().is_err());
    }

    #[test]
    fn parse_rejects_signs() {
        for s in ["+0+1", "+001", "0+01", "-001"] {
            assert_eq!(
                s.parse::<NodeAddr>(),
                Err(AddrParseError::Digit(s.to_string())),
                "{s}"
            );
        }
    }

    #[test]
    fn name_derivation_is_stable() {
        assert_eq!(NodeAddr::from_name("relay-1"), NodeAddr::from_name("relay-1"));
        assert_ne!(NodeAddr::from_name("relay-1"), NodeAddr::from_name("relay-2"));
    }
}
