//! Peer Registry - neighbor discovery and staleness eviction
//!
//! Tracks every node heard directly over the radio, keyed by hardware
//! address. Entries are created on first reception, refreshed on every
//! later one, and evicted once silent for longer than the peer timeout.
//! The registry owns all peer state; callers get short-lived borrows.

use crate::identity::NodeId;
use fieldmesh_core::NodeType;
use fieldmesh_radio::MacAddress;
use serde::{Deserialize, Serialize};

/// A directly reachable neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Radio hardware address
    pub address: MacAddress,
    /// Logical identity
    pub node_id: NodeId,
    /// Role, known once a heartbeat has been received
    pub node_type: Option<NodeType>,
    /// Last observed signal strength (dBm)
    pub rssi: i8,
    /// Last reception time (milliseconds)
    pub last_seen_ms: u64,
    /// Whether this peer relays toward the backend
    pub is_gateway: bool,
    /// Hops to a gateway through this peer, when known
    pub hop_to_gateway: Option<u8>,
}

/// Result of recording a reception
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First reception from this address
    Inserted {
        /// Peer dropped to make room, whose radio registration must be released
        displaced: Option<Peer>,
    },
    /// Known peer refreshed
    Updated {
        /// Gateway flag changed with this reception
        role_changed: bool,
    },
}

/// Neighbor table with capacity limit
#[derive(Debug)]
pub struct PeerRegistry {
    /// Insertion-ordered peers
    peers: Vec<Peer>,
    /// Maximum peers to track
    max_peers: usize,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: Vec::with_capacity(max_peers),
            max_peers: max_peers.max(1),
        }
    }

    /// Record a reception from `address`.
    ///
    /// `node_type` is only known for heartbeats; when present it replaces
    /// the stored role and identity, so a reconfigured node is picked up at
    /// its next heartbeat. Other frames may have been relayed by the
    /// station at `address` on behalf of someone else, so they only refresh
    /// liveness and signal of a known entry.
    pub fn upsert(
        &mut self,
        address: MacAddress,
        node_id: NodeId,
        node_type: Option<NodeType>,
        rssi: i8,
        now_ms: u64,
    ) -> UpsertOutcome {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.address == address) {
            peer.rssi = rssi;
            peer.last_seen_ms = now_ms;
            let mut role_changed = false;
            if let Some(node_type) = node_type {
                role_changed = peer.is_gateway != node_type.is_gateway();
                peer.node_id = node_id;
                apply_role(peer, node_type);
            }
            return UpsertOutcome::Updated { role_changed };
        }

        let displaced = if self.peers.len() >= self.max_peers {
            self.displace()
        } else {
            None
        };

        let mut peer = Peer {
            address,
            node_id,
            node_type: None,
            rssi,
            last_seen_ms: now_ms,
            is_gateway: false,
            hop_to_gateway: None,
        };
        if let Some(node_type) = node_type {
            apply_role(&mut peer, node_type);
        }
        tracing::info!(
            node_id = %peer.node_id,
            address = %peer.address,
            rssi = peer.rssi,
            is_gateway = peer.is_gateway,
            "New mesh peer"
        );
        self.peers.push(peer);

        UpsertOutcome::Inserted { displaced }
    }

    /// Refresh liveness and signal of a known peer without touching its
    /// identity. Returns whether the address was known.
    pub fn touch(&mut self, address: &MacAddress, rssi: i8, now_ms: u64) -> bool {
        match self.peers.iter_mut().find(|p| p.address == *address) {
            Some(peer) => {
                peer.rssi = rssi;
                peer.last_seen_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Drop the least recently seen peer, non-gateways first
    fn displace(&mut self) -> Option<Peer> {
        let index = self
            .peers
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| (p.is_gateway, p.last_seen_ms))
            .map(|(i, _)| i)?;
        let peer = self.peers.remove(index);
        tracing::debug!(node_id = %peer.node_id, "Peer table full, displacing peer");
        Some(peer)
    }

    /// Look up a peer by hardware address
    pub fn find_by_address(&self, address: &MacAddress) -> Option<&Peer> {
        self.peers.iter().find(|p| p.address == *address)
    }

    /// Look up a peer by identity
    pub fn find_by_identity(&self, node_id: &NodeId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.node_id == *node_id)
    }

    /// Remove a peer
    pub fn remove(&mut self, address: &MacAddress) -> Option<Peer> {
        let index = self.peers.iter().position(|p| p.address == *address)?;
        Some(self.peers.remove(index))
    }

    /// Remove peers silent for longer than `timeout_ms` and return them so
    /// their radio registrations can be released.
    pub fn evict_stale(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<Peer> {
        let (stale, fresh): (Vec<Peer>, Vec<Peer>) = self
            .peers
            .drain(..)
            .partition(|p| now_ms.saturating_sub(p.last_seen_ms) > timeout_ms);
        self.peers = fresh;
        for peer in &stale {
            tracing::info!(node_id = %peer.node_id, address = %peer.address, "Peer timeout");
        }
        stale
    }

    /// Gateway with the strongest signal. Ties go to the earliest seen.
    pub fn nearest_gateway(&self) -> Option<&Peer> {
        self.peers
            .iter()
            .filter(|p| p.is_gateway)
            .fold(None, |best: Option<&Peer>, p| match best {
                Some(b) if b.rssi >= p.rssi => Some(b),
                _ => Some(p),
            })
    }

    /// Signal strength of the peer with this identity
    pub fn peer_signal(&self, node_id: &NodeId) -> Option<i8> {
        self.find_by_identity(node_id).map(|p| p.rssi)
    }

    /// Number of tracked peers
    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Capacity limit
    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// All tracked peers in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }
}

fn apply_role(peer: &mut Peer, node_type: NodeType) {
    peer.node_type = Some(node_type);
    peer.is_gateway = node_type.is_gateway();
    peer.hop_to_gateway = if peer.is_gateway { Some(1) } else { None };
}
