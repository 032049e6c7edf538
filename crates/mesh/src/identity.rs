//! Node identities
//!
//! A node identity is a short ASCII name carried in a 12-byte NUL-padded
//! wire field, so at most 11 bytes are usable. It is distinct from the
//! radio hardware address and fixed for the lifetime of the process.

use crate::error::{MeshError, MeshResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of an identity field on the wire
pub const NODE_ID_SIZE: usize = 12;

/// Usable identity bytes (one byte is reserved for the terminating NUL)
pub const MAX_NODE_ID_LEN: usize = NODE_ID_SIZE - 1;

/// Fixed-capacity node identity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    bytes: [u8; NODE_ID_SIZE],
    len: u8,
}

impl NodeId {
    /// Wildcard target addressing every node in radio range
    pub const BROADCAST: NodeId = NodeId {
        bytes: [b'*', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        len: 1,
    };

    /// Build an identity, failing instead of truncating when it does not fit
    pub fn new(id: &str) -> MeshResult<Self> {
        Self::from_bytes(id.as_bytes())
    }

    fn from_bytes(raw: &[u8]) -> MeshResult<Self> {
        if raw.len() > MAX_NODE_ID_LEN {
            return Err(MeshError::IdentityTooLong {
                len: raw.len(),
                max: MAX_NODE_ID_LEN,
            });
        }
        if raw.is_empty() || raw.iter().any(|b| *b == 0 || !b.is_ascii()) {
            return Err(MeshError::InvalidIdentity(
                String::from_utf8_lossy(raw).into_owned(),
            ));
        }
        let mut bytes = [0u8; NODE_ID_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Parse a NUL-padded wire field; bytes after the first NUL are ignored
    pub fn from_wire(field: &[u8; NODE_ID_SIZE]) -> MeshResult<Self> {
        let end = field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NODE_ID_SIZE);
        Self::from_bytes(&field[..end])
    }

    /// NUL-padded wire representation
    pub fn to_wire(&self) -> [u8; NODE_ID_SIZE] {
        self.bytes
    }

    /// Identity as text
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// Whether this is the broadcast wildcard
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.as_str())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NodeId::new(&raw).map_err(serde::de::Error::custom)
    }
}
