//! Core types

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a node in the field network.
///
/// The discriminants are the values carried on the wire inside heartbeat
/// payloads, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum NodeType {
    /// Cellular gateway, relays mesh traffic upstream
    Gateway = 0,
    /// Climate and soil sensor node
    Ambient = 1,
    /// Perimeter security node (PIR, accelerometer, siren)
    Security = 2,
    /// Bench/debug node
    Test = 99,
}

impl NodeType {
    /// Wire value of this node type
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether nodes of this type relay traffic for others
    pub fn is_gateway(self) -> bool {
        self == NodeType::Gateway
    }
}

impl TryFrom<u8> for NodeType {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeType::Gateway),
            1 => Ok(NodeType::Ambient),
            2 => Ok(NodeType::Security),
            99 => Ok(NodeType::Test),
            other => Err(CoreError::UnknownNodeType(other)),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Gateway => "gateway",
            NodeType::Ambient => "ambient",
            NodeType::Security => "security",
            NodeType::Test => "test",
        };
        f.write_str(name)
    }
}
