//! Error types for FieldMesh mesh operations.
//!
//! Malformed-frame variants are produced by the codec and only ever logged
//! by the reception path; the rest reach the application synchronously.

use crate::codec::MessageKind;
use fieldmesh_radio::RadioError;
use thiserror::Error;

/// Errors that can occur in mesh operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// Payload larger than the wire buffer
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Frame length differs from the fixed message size
    #[error("Invalid frame length: {actual} bytes (expected {expected})")]
    FrameLength { expected: usize, actual: usize },

    /// CRC mismatch
    #[error("Checksum mismatch: received {received:#06x}, computed {computed:#06x}")]
    Checksum { received: u16, computed: u16 },

    /// Unknown message kind byte
    #[error("Unknown message kind: {0:#04x}")]
    UnknownKind(u8),

    /// Unknown priority byte
    #[error("Invalid priority: {0}")]
    InvalidPriority(u8),

    /// Hop counter above the ceiling
    #[error("Hop count {hops} exceeds ceiling {max}")]
    HopLimit { hops: u8, max: u8 },

    /// Identity does not fit the wire field
    #[error("Node identity too long: {len} bytes (max {max})")]
    IdentityTooLong { len: usize, max: usize },

    /// Identity contains bytes that cannot appear on the wire
    #[error("Invalid node identity: {0:?}")]
    InvalidIdentity(String),

    /// Typed payload does not match its layout
    #[error("Malformed {kind:?} payload: {actual} bytes (expected {expected})")]
    PayloadLayout {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    /// Typed payload field holds a value outside its enumeration
    #[error("Malformed {kind:?} payload: {field} = {value}")]
    PayloadField {
        kind: MessageKind,
        field: &'static str,
        value: u8,
    },

    /// Neither a direct peer nor a gateway is known
    #[error("No route found to destination: {destination}")]
    NoRoute { destination: String },

    /// Outbound queue is full of equal or higher priority traffic
    #[error("Outbound queue full (depth {depth})")]
    QueueFull { depth: usize },

    /// Radio driver error
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<fieldmesh_core::CoreError> for MeshError {
    fn from(err: fieldmesh_core::CoreError) -> Self {
        MeshError::Config(err.to_string())
    }
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
