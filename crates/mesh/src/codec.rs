//! Message Codec - fixed-layout wire frames with CRC-16 integrity
//!
//! Every frame is exactly [`FRAME_SIZE`] bytes, little-endian:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 12 | sender identity, NUL-padded |
//! | 12 | 12 | target identity, NUL-padded (`"*"` = broadcast) |
//! | 24 | 1 | message kind |
//! | 25 | 1 | priority (0 critical .. 3 low) |
//! | 26 | 4 | timestamp (seconds) |
//! | 30 | 2 | sequence |
//! | 32 | 1 | hop count |
//! | 33 | 1 | payload length |
//! | 34 | 200 | payload, zero-filled past its length |
//! | 234 | 2 | CRC-16 over bytes 0..234 |
//!
//! The checksum is CRC-16 with reflected polynomial 0xA001, initial value
//! 0xFFFF, bits processed LSB first. Nodes running older firmware compute
//! exactly this, so neither the algorithm nor the layout may change.

use crate::error::{MeshError, MeshResult};
use crate::identity::{NodeId, NODE_ID_SIZE};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};

/// Largest payload a frame can carry
pub const MAX_PAYLOAD: usize = 200;

/// Hop ceiling; frames above it are discarded
pub const MAX_HOPS: u8 = 5;

/// Size of every frame on the wire
pub const FRAME_SIZE: usize = 2 * NODE_ID_SIZE + 1 + 1 + 4 + 2 + 1 + 1 + MAX_PAYLOAD + 2;

const TARGET_OFFSET: usize = NODE_ID_SIZE;
const KIND_OFFSET: usize = 2 * NODE_ID_SIZE;
const PRIORITY_OFFSET: usize = KIND_OFFSET + 1;
const TIMESTAMP_OFFSET: usize = PRIORITY_OFFSET + 1;
const SEQUENCE_OFFSET: usize = TIMESTAMP_OFFSET + 4;
const HOP_OFFSET: usize = SEQUENCE_OFFSET + 2;
const LEN_OFFSET: usize = HOP_OFFSET + 1;
const PAYLOAD_OFFSET: usize = LEN_OFFSET + 1;
const CHECKSUM_OFFSET: usize = PAYLOAD_OFFSET + MAX_PAYLOAD;

/// Message kinds carried in the kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    /// Periodic liveness beacon
    Heartbeat = 0x01,
    /// Environmental telemetry
    SensorData = 0x02,
    /// Person detected
    AlarmPerson = 0x03,
    /// Large animal detected
    AlarmAnimal = 0x04,
    /// Enclosure tampering
    AlarmTamper = 0x05,
    /// Gateway command
    Command = 0x06,
    /// Acknowledgment of a tracked message
    Ack = 0x07,
    /// Remote configuration
    Config = 0x08,
    /// Firmware update chunk
    FirmwareUpdate = 0x09,
    /// Battery report
    BatteryStatus = 0x0A,
    /// Topology report
    Topology = 0x0B,
    /// Arm the security subsystem
    Arm = 0x0C,
    /// Disarm the security subsystem
    Disarm = 0x0D,
}

impl MessageKind {
    /// Wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Alarms raised by security nodes
    pub fn is_security_alarm(self) -> bool {
        matches!(
            self,
            MessageKind::AlarmPerson | MessageKind::AlarmAnimal | MessageKind::AlarmTamper
        )
    }

    /// Kinds that warrant acknowledgment when sent at critical or high priority.
    /// Telemetry and heartbeats tolerate loss.
    pub fn is_reliable(self) -> bool {
        self.is_security_alarm()
            || matches!(
                self,
                MessageKind::Command | MessageKind::Config | MessageKind::Arm | MessageKind::Disarm
            )
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = MeshError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let kind = match value {
            0x01 => MessageKind::Heartbeat,
            0x02 => MessageKind::SensorData,
            0x03 => MessageKind::AlarmPerson,
            0x04 => MessageKind::AlarmAnimal,
            0x05 => MessageKind::AlarmTamper,
            0x06 => MessageKind::Command,
            0x07 => MessageKind::Ack,
            0x08 => MessageKind::Config,
            0x09 => MessageKind::FirmwareUpdate,
            0x0A => MessageKind::BatteryStatus,
            0x0B => MessageKind::Topology,
            0x0C => MessageKind::Arm,
            0x0D => MessageKind::Disarm,
            other => return Err(MeshError::UnknownKind(other)),
        };
        Ok(kind)
    }
}

/// Latency tier. Lower values drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    /// Person intrusion, must land in under 2 s
    Critical = 0,
    /// Commands and animal alarms (< 5 s)
    High = 1,
    /// Status and heartbeats (< 30 s)
    Medium = 2,
    /// Ambient telemetry (< 60 s)
    Low = 3,
}

impl Priority {
    /// All priorities, most urgent first
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Wire value, also the outbound lane index
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether reliable kinds at this priority are acknowledgment-tracked
    pub fn requires_ack(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl TryFrom<u8> for Priority {
    type Error = MeshError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Critical),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(MeshError::InvalidPriority(other)),
        }
    }
}

/// A decoded or freshly encoded mesh frame.
///
/// Fields are read-only; the only mutations (timestamp, hop count) go
/// through methods that reseal the checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshMessage {
    sender: NodeId,
    target: NodeId,
    kind: MessageKind,
    priority: Priority,
    timestamp: u32,
    sequence: u16,
    hop_count: u8,
    payload: Vec<u8>,
    checksum: u16,
}

/// Build a sealed message. Fails if the payload exceeds [`MAX_PAYLOAD`]
/// or the hop count exceeds [`MAX_HOPS`]. The timestamp starts at zero;
/// see [`MeshMessage::stamped`].
pub fn encode(
    sender: NodeId,
    target: NodeId,
    kind: MessageKind,
    priority: Priority,
    sequence: u16,
    hop_count: u8,
    payload: &[u8],
) -> MeshResult<MeshMessage> {
    if payload.len() > MAX_PAYLOAD {
        return Err(MeshError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    if hop_count > MAX_HOPS {
        return Err(MeshError::HopLimit {
            hops: hop_count,
            max: MAX_HOPS,
        });
    }
    let mut message = MeshMessage {
        sender,
        target,
        kind,
        priority,
        timestamp: 0,
        sequence,
        hop_count,
        payload: payload.to_vec(),
        checksum: 0,
    };
    message.seal();
    Ok(message)
}

/// Validate and decode a received frame.
///
/// Rejects wrong lengths, checksum mismatches, unknown kinds or
/// priorities, oversize payload lengths and hop counts above the ceiling.
pub fn verify(raw: &[u8]) -> MeshResult<MeshMessage> {
    if raw.len() != FRAME_SIZE {
        return Err(MeshError::FrameLength {
            expected: FRAME_SIZE,
            actual: raw.len(),
        });
    }

    let received = u16::from_le_bytes([raw[CHECKSUM_OFFSET], raw[CHECKSUM_OFFSET + 1]]);
    let computed = crc16(&raw[..CHECKSUM_OFFSET]);
    if received != computed {
        return Err(MeshError::Checksum { received, computed });
    }

    let payload_len = raw[LEN_OFFSET] as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(MeshError::PayloadTooLarge {
            len: payload_len,
            max: MAX_PAYLOAD,
        });
    }
    let hop_count = raw[HOP_OFFSET];
    if hop_count > MAX_HOPS {
        return Err(MeshError::HopLimit {
            hops: hop_count,
            max: MAX_HOPS,
        });
    }

    Ok(MeshMessage {
        sender: NodeId::from_wire(&id_field(raw, 0))?,
        target: NodeId::from_wire(&id_field(raw, TARGET_OFFSET))?,
        kind: MessageKind::try_from(raw[KIND_OFFSET])?,
        priority: Priority::try_from(raw[PRIORITY_OFFSET])?,
        timestamp: u32::from_le_bytes([
            raw[TIMESTAMP_OFFSET],
            raw[TIMESTAMP_OFFSET + 1],
            raw[TIMESTAMP_OFFSET + 2],
            raw[TIMESTAMP_OFFSET + 3],
        ]),
        sequence: u16::from_le_bytes([raw[SEQUENCE_OFFSET], raw[SEQUENCE_OFFSET + 1]]),
        hop_count,
        payload: raw[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload_len].to_vec(),
        checksum: received,
    })
}

fn id_field(raw: &[u8], offset: usize) -> [u8; NODE_ID_SIZE] {
    let mut field = [0u8; NODE_ID_SIZE];
    field.copy_from_slice(&raw[offset..offset + NODE_ID_SIZE]);
    field
}

/// CRC-16, reflected polynomial 0xA001, init 0xFFFF, LSB first
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

impl MeshMessage {
    /// Originating node
    pub fn sender(&self) -> &NodeId {
        &self.sender
    }

    /// Destination node or [`NodeId::BROADCAST`]
    pub fn target(&self) -> &NodeId {
        &self.target
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Seconds since boot (or Unix time once synchronized)
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Per-sender sequence number
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn hop_count(&self) -> u8 {
        self.hop_count
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Transmitted (or last sealed) CRC
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.is_broadcast()
    }

    /// Whether delivery of this message is acknowledgment-tracked
    pub fn requires_ack(&self) -> bool {
        self.priority.requires_ack() && self.kind.is_reliable()
    }

    /// Interpret the payload according to the message kind
    pub fn decode_payload(&self) -> MeshResult<Payload> {
        Payload::decode(self.kind, &self.payload)
    }

    /// Set the timestamp and reseal
    pub fn stamped(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self.seal();
        self
    }

    /// Set the hop count and reseal
    pub fn set_hop_count(&mut self, hop_count: u8) -> MeshResult<()> {
        if hop_count > MAX_HOPS {
            return Err(MeshError::HopLimit {
                hops: hop_count,
                max: MAX_HOPS,
            });
        }
        self.hop_count = hop_count;
        self.seal();
        Ok(())
    }

    /// Serialize to the fixed wire layout
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut frame = self.header_and_payload();
        frame[CHECKSUM_OFFSET..].copy_from_slice(&self.checksum.to_le_bytes());
        frame
    }

    fn header_and_payload(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[..NODE_ID_SIZE].copy_from_slice(&self.sender.to_wire());
        frame[TARGET_OFFSET..KIND_OFFSET].copy_from_slice(&self.target.to_wire());
        frame[KIND_OFFSET] = self.kind.as_u8();
        frame[PRIORITY_OFFSET] = self.priority.as_u8();
        frame[TIMESTAMP_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&self.timestamp.to_le_bytes());
        frame[SEQUENCE_OFFSET..HOP_OFFSET].copy_from_slice(&self.sequence.to_le_bytes());
        frame[HOP_OFFSET] = self.hop_count;
        frame[LEN_OFFSET] = self.payload.len() as u8;
        frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + self.payload.len()].copy_from_slice(&self.payload);
        frame
    }

    fn seal(&mut self) {
        let frame = self.header_and_payload();
        self.checksum = crc16(&frame[..CHECKSUM_OFFSET]);
    }
}
