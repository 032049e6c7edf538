//! Radio driver contract

use crate::address::MacAddress;
use crate::error::{RadioError, RadioResult};
use serde::{Deserialize, Serialize};

/// Registered-peer slots available in a typical short-range radio
pub const RADIO_PEER_CAPACITY: usize = 20;

/// Radio configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Channel
    pub channel: u8,
}

impl RadioConfig {
    /// Create a new radio configuration, rejecting channels outside 1-13
    pub fn new(channel: u8) -> RadioResult<Self> {
        if !(1..=13).contains(&channel) {
            return Err(RadioError::InvalidChannel(channel));
        }
        tracing::info!(channel = %channel, "Configuring radio");
        Ok(Self { channel })
    }
}

/// A frame handed up by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    /// Hardware address of the transmitting station
    pub source: MacAddress,
    /// Received signal strength (dBm)
    pub rssi: i8,
    /// Raw frame bytes
    pub data: Vec<u8>,
}

/// Receive callback registered with a driver.
///
/// Drivers may invoke it from an interrupt-like context concurrently with
/// the owner's main loop, so it must be cheap and must not block.
pub type FrameSink = Box<dyn Fn(RxFrame) + Send + Sync>;

/// Link-layer radio used by the mesh
pub trait Radio {
    /// Own hardware address
    fn address(&self) -> MacAddress;

    /// Apply channel configuration
    fn configure(&mut self, config: &RadioConfig) -> RadioResult<()>;

    /// Register a peer for unicast; registering twice is not an error
    fn add_peer(&mut self, peer: MacAddress) -> RadioResult<()>;

    /// Release a peer registration; releasing an unknown peer is not an error
    fn remove_peer(&mut self, peer: MacAddress) -> RadioResult<()>;

    /// Transmit a frame to a registered peer or to [`MacAddress::BROADCAST`]
    fn send(&mut self, destination: MacAddress, frame: &[u8]) -> RadioResult<()>;

    /// Install the receive callback, replacing any previous one
    fn set_receiver(&mut self, sink: FrameSink);

    /// Registered-peer slots, broadcast included
    fn peer_capacity(&self) -> usize {
        RADIO_PEER_CAPACITY
    }
}
