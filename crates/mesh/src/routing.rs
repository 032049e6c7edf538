//! Gateway-Relay Routing - next-hop resolution over the peer registry
//!
//! Leaf nodes only know their direct neighbors. Anything else goes to the
//! strongest gateway in range, which re-resolves and forwards it. The hop
//! counter bounds how far a frame can travel before it is dropped.

use crate::codec::{MeshMessage, MAX_HOPS};
use crate::error::{MeshError, MeshResult};
use crate::identity::NodeId;
use crate::peer::PeerRegistry;
use fieldmesh_radio::MacAddress;
use serde::{Deserialize, Serialize};

/// How a destination was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    /// Radio broadcast to every neighbor
    Broadcast,
    /// Target is a direct neighbor
    Direct,
    /// Handed to the nearest gateway for store-and-forward
    GatewayRelay,
}

/// Resolved next hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Radio address to transmit to
    pub address: MacAddress,
    /// Hops added by taking this route
    pub hop_delta: u8,
    /// Resolution path
    pub kind: RouteKind,
}

/// Why a relay request was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayDrop {
    /// Hop ceiling reached
    HopLimit,
    /// No direct peer or gateway for the target
    NoRoute,
    /// Next hop is the neighbor the frame came from
    Loopback,
}

/// Outcome of a relay request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecision {
    /// Retransmit the resealed message over `route`
    Forward {
        message: MeshMessage,
        route: Route,
    },
    /// Drop silently
    Drop(RelayDrop),
}

/// Next-hop resolver
#[derive(Debug, Clone)]
pub struct Router {
    /// Hop ceiling
    max_hops: u8,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(MAX_HOPS)
    }
}

impl Router {
    /// Create a router; the ceiling never exceeds the wire limit
    pub fn new(max_hops: u8) -> Self {
        Self {
            max_hops: max_hops.min(MAX_HOPS),
        }
    }

    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }

    /// Resolve `target` to a next-hop radio address.
    ///
    /// Broadcast wins over everything, then a direct neighbor, then the
    /// nearest gateway with one extra hop.
    pub fn resolve(&self, peers: &PeerRegistry, target: &NodeId) -> MeshResult<Route> {
        if target.is_broadcast() {
            return Ok(Route {
                address: MacAddress::BROADCAST,
                hop_delta: 0,
                kind: RouteKind::Broadcast,
            });
        }

        if let Some(peer) = peers.find_by_identity(target) {
            return Ok(Route {
                address: peer.address,
                hop_delta: 0,
                kind: RouteKind::Direct,
            });
        }

        if let Some(gateway) = peers.nearest_gateway() {
            tracing::trace!(
                target = %target,
                gateway = %gateway.node_id,
                "Routing via gateway"
            );
            return Ok(Route {
                address: gateway.address,
                hop_delta: 1,
                kind: RouteKind::GatewayRelay,
            });
        }

        Err(MeshError::NoRoute {
            destination: target.to_string(),
        })
    }

    /// Decide whether to forward a frame addressed to someone else.
    ///
    /// Every forwarded frame leaves with a hop count strictly below the
    /// ceiling, so a frame arriving at `max_hops - 1` is dropped. The
    /// returned message carries the new hop count with a resealed
    /// checksum.
    pub fn relay(
        &self,
        peers: &PeerRegistry,
        mut message: MeshMessage,
        source: MacAddress,
    ) -> RelayDecision {
        let incremented = message.hop_count().saturating_add(1);
        if incremented >= self.max_hops {
            return RelayDecision::Drop(RelayDrop::HopLimit);
        }

        let route = match self.resolve(peers, message.target()) {
            Ok(route) => route,
            Err(_) => return RelayDecision::Drop(RelayDrop::NoRoute),
        };

        let hops = incremented + route.hop_delta;
        if hops >= self.max_hops {
            return RelayDecision::Drop(RelayDrop::HopLimit);
        }
        if route.address == source {
            return RelayDecision::Drop(RelayDrop::Loopback);
        }
        if message.set_hop_count(hops).is_err() {
            return RelayDecision::Drop(RelayDrop::HopLimit);
        }

        RelayDecision::Forward { message, route }
    }

    /// Re-resolve the next hop of a queued message before (re)transmission.
    ///
    /// `base_hops` is the message's hop count without any route delta.
    /// Relayed messages (`relayed_from` set) keep the relay rules: the
    /// result stays below the ceiling and never points back at the station
    /// the frame came from. Returns `None` when no acceptable route exists.
    pub fn reroute(
        &self,
        peers: &PeerRegistry,
        target: &NodeId,
        base_hops: u8,
        relayed_from: Option<MacAddress>,
    ) -> Option<Route> {
        let route = self.resolve(peers, target).ok()?;
        let hops = base_hops.saturating_add(route.hop_delta);
        match relayed_from {
            Some(source) if hops >= self.max_hops || route.address == source => None,
            None if hops > self.max_hops => None,
            _ => Some(route),
        }
    }
}
