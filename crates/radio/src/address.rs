//! Hardware addresses

use crate::error::RadioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 6-byte radio hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Link-layer broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Raw bytes
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| RadioError::InvalidAddress {
            input: s.to_string(),
            reason,
        };
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| invalid("fewer than 6 octets".to_string()))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| invalid(format!("bad octet {part:?}: {e}")))?;
        }
        if parts.next().is_some() {
            return Err(invalid("more than 6 octets".to_string()));
        }
        Ok(Self(bytes))
    }
}
