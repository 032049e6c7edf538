//! In-memory radio medium
//!
//! Stations only hear each other over explicitly connected links, which
//! makes multi-hop topologies (leaf - gateway - leaf) easy to build.
//! Received frames are pushed into each station's sink synchronously from
//! the sender's `send` call, mimicking a driver callback.

use crate::address::MacAddress;
use crate::error::{RadioError, RadioResult};
use crate::radio::{FrameSink, Radio, RadioConfig, RxFrame, RADIO_PEER_CAPACITY};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SharedSink = Arc<dyn Fn(RxFrame) + Send + Sync>;

#[derive(Default)]
struct Station {
    channel: Option<u8>,
    sink: Option<SharedSink>,
    fail_sends: bool,
    attempts: u64,
}

#[derive(Default)]
struct EtherState {
    stations: HashMap<MacAddress, Station>,
    /// Undirected links keyed by (lower, higher) address with their RSSI
    links: HashMap<(MacAddress, MacAddress), i8>,
}

fn link_key(a: MacAddress, b: MacAddress) -> (MacAddress, MacAddress) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Shared simulated medium
#[derive(Clone, Default)]
pub struct Ether {
    state: Arc<Mutex<EtherState>>,
}

impl Ether {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, EtherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a station and return its radio
    pub fn radio(&self, address: MacAddress) -> SimRadio {
        self.state().stations.entry(address).or_default();
        SimRadio {
            address,
            ether: self.clone(),
            peers: HashSet::new(),
            peer_capacity: RADIO_PEER_CAPACITY,
        }
    }

    /// Connect two stations with the given signal strength in both directions
    pub fn connect(&self, a: MacAddress, b: MacAddress, rssi: i8) {
        self.state().links.insert(link_key(a, b), rssi);
    }

    /// Break the link between two stations
    pub fn disconnect(&self, a: MacAddress, b: MacAddress) {
        self.state().links.remove(&link_key(a, b));
    }

    /// Make every transmission from `address` fail (or succeed again)
    pub fn set_send_failure(&self, address: MacAddress, fail: bool) {
        if let Some(station) = self.state().stations.get_mut(&address) {
            station.fail_sends = fail;
        }
    }

    /// Number of transmissions attempted by `address`, failed ones included
    pub fn transmit_attempts(&self, address: MacAddress) -> u64 {
        self.state()
            .stations
            .get(&address)
            .map(|s| s.attempts)
            .unwrap_or(0)
    }

    /// Inject a raw frame into a station as if it had been received
    pub fn inject(&self, destination: MacAddress, frame: RxFrame) {
        let sink = self
            .state()
            .stations
            .get(&destination)
            .and_then(|s| s.sink.clone());
        if let Some(sink) = sink {
            sink(frame);
        }
    }

    fn transmit(&self, source: MacAddress, destination: MacAddress, frame: &[u8]) -> RadioResult<()> {
        // Collect receivers under the lock, call them after releasing it.
        let deliveries: Vec<(SharedSink, i8)> = {
            let mut state = self.state();
            let station = state
                .stations
                .get_mut(&source)
                .ok_or(RadioError::NotConfigured)?;
            station.attempts += 1;
            let channel = station.channel.ok_or(RadioError::NotConfigured)?;
            if station.fail_sends {
                return Err(RadioError::SendFailed("injected failure".to_string()));
            }

            let state = &*state;
            let hears = |other: &MacAddress| -> Option<(SharedSink, i8)> {
                let rssi = *state.links.get(&link_key(source, *other))?;
                let station = state.stations.get(other)?;
                if station.channel != Some(channel) {
                    return None;
                }
                station.sink.clone().map(|sink| (sink, rssi))
            };

            if destination.is_broadcast() {
                state
                    .stations
                    .keys()
                    .filter(|addr| **addr != source)
                    .filter_map(hears)
                    .collect()
            } else {
                match hears(&destination) {
                    Some(delivery) => vec![delivery],
                    None => return Err(RadioError::Unreachable(destination)),
                }
            }
        };

        for (sink, rssi) in deliveries {
            sink(RxFrame {
                source,
                rssi,
                data: frame.to_vec(),
            });
        }
        Ok(())
    }
}

/// Station radio on an [`Ether`]
pub struct SimRadio {
    address: MacAddress,
    ether: Ether,
    peers: HashSet<MacAddress>,
    peer_capacity: usize,
}

impl SimRadio {
    /// Limit the number of registered peers
    pub fn with_peer_capacity(mut self, capacity: usize) -> Self {
        self.peer_capacity = capacity;
        self
    }

    /// Whether `peer` is currently registered
    pub fn has_peer(&self, peer: MacAddress) -> bool {
        self.peers.contains(&peer)
    }

    /// Number of registered peers, broadcast included
    pub fn registered_peers(&self) -> usize {
        self.peers.len()
    }
}

impl Radio for SimRadio {
    fn address(&self) -> MacAddress {
        self.address
    }

    fn configure(&mut self, config: &RadioConfig) -> RadioResult<()> {
        if !(1..=13).contains(&config.channel) {
            return Err(RadioError::InvalidChannel(config.channel));
        }
        if let Some(station) = self.ether.state().stations.get_mut(&self.address) {
            station.channel = Some(config.channel);
        }
        Ok(())
    }

    fn add_peer(&mut self, peer: MacAddress) -> RadioResult<()> {
        if self.peers.contains(&peer) {
            return Ok(());
        }
        if self.peers.len() >= self.peer_capacity {
            return Err(RadioError::PeerTableFull {
                capacity: self.peer_capacity,
            });
        }
        self.peers.insert(peer);
        Ok(())
    }

    fn remove_peer(&mut self, peer: MacAddress) -> RadioResult<()> {
        self.peers.remove(&peer);
        Ok(())
    }

    fn send(&mut self, destination: MacAddress, frame: &[u8]) -> RadioResult<()> {
        if !self.peers.contains(&destination) {
            return Err(RadioError::PeerNotRegistered(destination));
        }
        self.ether.transmit(self.address, destination, frame)
    }

    fn set_receiver(&mut self, sink: FrameSink) {
        if let Some(station) = self.ether.state().stations.get_mut(&self.address) {
            station.sink = Some(Arc::from(sink));
        }
    }

    fn peer_capacity(&self) -> usize {
        self.peer_capacity
    }
}
