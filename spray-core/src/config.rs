//! Engine tunables. Defaults are the protocol constants.

use std::time::Duration;

/// Queue capacity (`MAX_QUEUE_PACKETS`).
pub const MAX_QUEUE_PACKETS: usize = 5;

/// Initial spray budget `L` given to an originated message.
pub const DTN_L_COPIES: u16 = 8;

/// Attempts the reliable link makes before reporting a timeout.
pub const DTN_MAX_TRANSMISSIONS: u8 = 3;

/// Quiet time after a full rotation (or while the queue is empty).
pub const DTN_QUEUE_DELAY: Duration = Duration::from_secs(3);

/// Gap between two broadcasts inside one rotation.
pub const DTN_PACKET_DELAY: Duration = Duration::from_secs(1);

/// Lifetime of a relayed copy that has not yet been handed any copies.
pub const DTN_TIMEOUT_UNCONFIRMED: Duration = Duration::from_secs(1);

/// Fixed lifetime of a copy holding a forwarding budget.
pub const DTN_MAX_LIFETIME: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub queue_capacity: usize,
    pub initial_copies: u16,
    pub max_transmissions: u8,
    pub queue_delay: Duration,
    pub packet_delay: Duration,
    pub timeout_unconfirmed: Duration,
    pub max_lifetime: Duration,
}

impl Config {
    /// Lifetime for an entry holding `num_copies`. Always the fixed ceiling.
    pub fn lifetime_for(&self, _num_copies: u16) -> Duration {
        self.max_lifetime
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: MAX_QUEUE_PACKETS,
            initial_copies: DTN_L_COPIES,
            max_transmissions: DTN_MAX_TRANSMISSIONS,
            queue_delay: DTN_QUEUE_DELAY,
            packet_delay: DTN_PACKET_DELAY,
            timeout_unconfirmed: DTN_TIMEOUT_UNCONFIRMED,
            max_lifetime: DTN_MAX_LIFETIME,
        }
    }
}
