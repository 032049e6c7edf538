//! FieldMesh Radio - link-layer abstraction for the field mesh
//!
//! The mesh layer never talks to radio hardware directly. It drives a
//! [`Radio`] implementation that can address single peers by hardware
//! address, broadcast, and hand received frames to a registered sink.
//!
//! [`sim::Ether`] provides an in-memory medium with explicit links and
//! per-link signal strength, used by tests and the field simulator.

#![warn(missing_docs)]

pub mod address;
pub mod error;
pub mod radio;
pub mod sim;

pub use address::MacAddress;
pub use error::{RadioError, RadioResult};
pub use radio::{FrameSink, Radio, RadioConfig, RxFrame, RADIO_PEER_CAPACITY};
pub use sim::{Ether, SimRadio};
