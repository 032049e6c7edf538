//! FieldMesh Mesh - radio mesh layer for battery-powered field sensors
//!
//! Carries telemetry and alarms between sensor nodes and a cellular
//! gateway over a short-range broadcast radio.
//!
//! # Core Components
//!
//! - **Message Codec**: fixed 236-byte frame sealed with CRC-16
//! - **Peer Registry**: neighbor discovery, gateway election by signal, staleness eviction
//! - **Gateway-Relay Routing**: direct, via nearest gateway, or broadcast, under a hop ceiling
//! - **Delivery Scheduler**: four priority lanes, acknowledgment tracking, bounded retry
//! - **Reception Dispatcher**: bounded hand-off from the radio callback, local delivery or relay
//!
//! # Design Principles
//!
//! 1. **Alarms first**: critical traffic always drains before telemetry
//! 2. **Fail locally**: every failure is confined to one message
//! 3. **No shared state with the radio callback**: frames cross a bounded channel
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use fieldmesh_core::NodeType;
//! use fieldmesh_mesh::{MeshNode, MessageKind, Priority};
//! use fieldmesh_radio::{Ether, MacAddress};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ether = Ether::new();
//! let radio = ether.radio(MacAddress::new([0x24, 0x6F, 0x28, 0, 0, 1]));
//! let mut mesh = MeshNode::begin("AMB-01", NodeType::Ambient, 1, radio)?;
//!
//! mesh.on_message(|message, source| {
//!     println!("{:?} from {} via {}", message.kind(), message.sender(), source);
//! });
//! mesh.broadcast(MessageKind::Topology, &[], Priority::Low)?;
//! mesh.update();
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod node;
pub mod payload;
pub mod peer;
pub mod routing;
pub mod scheduler;

// Re-export main types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use codec::{crc16, encode, verify, MeshMessage, MessageKind, Priority, FRAME_SIZE, MAX_HOPS, MAX_PAYLOAD};
pub use dispatcher::{inbound_channel, Action, Dispatch, Dispatcher, DropReason, InboundFrame, RxHandle};
pub use error::{MeshError, MeshResult};
pub use identity::NodeId;
pub use node::{LocalHealth, MeshNode, MeshStatus};
pub use payload::{
    BatteryStatus, CommandCode, HealthStatus, Heartbeat, IntrusionClass, Payload, SensorDataAmbient,
    SensorDataSecurity,
};
pub use peer::{Peer, PeerRegistry, UpsertOutcome};
pub use routing::{RelayDecision, RelayDrop, Route, RouteKind, Router};
pub use scheduler::{DeliveryMode, DeliveryReport, FailureReason, Scheduler, SchedulerConfig};
