//! Error types for radio drivers.

use crate::address::MacAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a radio driver.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RadioError {
    /// Channel outside the regulatory range
    #[error("Invalid channel: {0} (valid 1-13)")]
    InvalidChannel(u8),

    /// Radio used before a channel was configured
    #[error("Radio not configured")]
    NotConfigured,

    /// Hardware peer table has no free slot
    #[error("Radio peer table full (capacity {capacity})")]
    PeerTableFull {
        /// Maximum number of registered peers
        capacity: usize,
    },

    /// Unicast to an address never registered with the radio
    #[error("Peer not registered: {0}")]
    PeerNotRegistered(MacAddress),

    /// No link-layer acknowledgment from the destination
    #[error("Destination unreachable: {0}")]
    Unreachable(MacAddress),

    /// Text that is not a colon-separated 6-octet hardware address
    #[error("Invalid hardware address {input:?}: {reason}")]
    InvalidAddress {
        /// Text that failed to parse
        input: String,
        /// What was wrong with it
        reason: String,
    },

    /// Transmission failed in the driver
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Result type for radio operations.
pub type RadioResult<T> = Result<T, RadioError>;
