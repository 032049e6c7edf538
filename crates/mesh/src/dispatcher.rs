//! Reception Dispatcher - frame validation, peer bookkeeping, local delivery or relay
//!
//! Reception is split in two halves. [`RxHandle`] runs in the radio
//! driver's receive context: it verifies the frame and hands it to a
//! bounded channel, nothing more. [`Dispatcher`] runs on the node's
//! control loop, drains that channel and decides what each frame means.
//! Only the loop side touches the peer registry or the outbound queue.

use crate::codec::{verify, MeshMessage, MessageKind};
use crate::identity::NodeId;
use crate::payload::Payload;
use crate::peer::{PeerRegistry, UpsertOutcome};
use crate::routing::{RelayDecision, RelayDrop, Route, Router};
use fieldmesh_radio::{MacAddress, RxFrame};
use std::collections::VecDeque;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Bound on remembered (sender, sequence) pairs
const DEDUP_CAPACITY: usize = 64;

/// A verified frame waiting for the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Hardware address the frame arrived from
    pub source: MacAddress,
    /// Signal strength of the reception (dBm)
    pub rssi: i8,
    pub message: MeshMessage,
}

/// Receive-side entry point handed to the radio driver
#[derive(Debug, Clone)]
pub struct RxHandle {
    tx: mpsc::Sender<InboundFrame>,
}

impl RxHandle {
    /// Verify a raw frame and queue it for the control loop.
    ///
    /// Never blocks. Malformed frames and frames arriving while the channel
    /// is full are dropped; returns whether the frame was queued.
    pub fn on_frame(&self, frame: RxFrame) -> bool {
        let message = match verify(&frame.data) {
            Ok(message) => message,
            Err(err) => {
                tracing::trace!(source = %frame.source, error = %err, "Dropping malformed frame");
                return false;
            }
        };

        let inbound = InboundFrame {
            source: frame.source,
            rssi: frame.rssi,
            message,
        };
        match self.tx.try_send(inbound) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::trace!(
                    source = %dropped.source,
                    sequence = dropped.message.sequence(),
                    "Inbound channel full, dropping frame"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Create the bounded hand-off between receive context and control loop
pub fn inbound_channel(capacity: usize) -> (RxHandle, mpsc::Receiver<InboundFrame>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RxHandle { tx }, rx)
}

/// Why an inbound frame was not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Addressed elsewhere and this node does not relay
    NotForUs,
    /// Relay hop ceiling reached
    HopLimit,
    /// Relay target unreachable
    NoRoute,
    /// Relay would bounce back to the sender's station
    Loopback,
    /// Our own frame relayed back to us
    OwnEcho,
    /// Acknowledgment not addressed to this node
    StrayAck,
    /// Acknowledgment without a sequence number
    MalformedAck,
}

impl From<RelayDrop> for DropReason {
    fn from(drop: RelayDrop) -> Self {
        match drop {
            RelayDrop::HopLimit => DropReason::HopLimit,
            RelayDrop::NoRoute => DropReason::NoRoute,
            RelayDrop::Loopback => DropReason::Loopback,
        }
    }
}

/// What the control loop must do with a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Hand to the application, acknowledging first if requested
    Deliver {
        frame: InboundFrame,
        acknowledge: bool,
    },
    /// Retransmission of something already delivered; acknowledge again only
    Duplicate {
        frame: InboundFrame,
        acknowledge: bool,
    },
    /// Acknowledgment for one of our tracked messages
    Acknowledged { sequence: u16, from: NodeId },
    /// Forward the resealed message over `route`
    Relay { message: MeshMessage, route: Route },
    /// Ignore
    Drop(DropReason),
}

/// Result of dispatching one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Registry change caused by the frame, if any
    pub peer: Option<UpsertOutcome>,
    pub action: Action,
}

/// Control-loop side of reception
#[derive(Debug)]
pub struct Dispatcher {
    local_id: NodeId,
    relay_capable: bool,
    router: Router,
    dedup_window_ms: u64,
    /// Recently delivered tracked messages: (sender, sequence, seen at)
    recent: VecDeque<(NodeId, u16, u64)>,
}

impl Dispatcher {
    pub fn new(local_id: NodeId, relay_capable: bool, router: Router, dedup_window_ms: u64) -> Self {
        Self {
            local_id,
            relay_capable,
            router,
            dedup_window_ms,
            recent: VecDeque::with_capacity(DEDUP_CAPACITY),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Record the frame in the registry and decide what to do with it
    pub fn dispatch(&mut self, frame: InboundFrame, peers: &mut PeerRegistry, now_ms: u64) -> Dispatch {
        let message = &frame.message;

        if *message.sender() == self.local_id {
            peers.touch(&frame.source, frame.rssi, now_ms);
            return Dispatch {
                peer: None,
                action: Action::Drop(DropReason::OwnEcho),
            };
        }

        let node_type = match message.kind() {
            MessageKind::Heartbeat => match message.decode_payload() {
                Ok(Payload::Heartbeat(heartbeat)) => Some(heartbeat.node_type),
                _ => None,
            },
            _ => None,
        };
        let peer = Some(peers.upsert(
            frame.source,
            *message.sender(),
            node_type,
            frame.rssi,
            now_ms,
        ));

        let for_us = message.is_broadcast() || *message.target() == self.local_id;
        let action = if for_us {
            self.local(frame, now_ms)
        } else if self.relay_capable {
            let source = frame.source;
            match self.router.relay(peers, frame.message, source) {
                RelayDecision::Forward { message, route } => {
                    tracing::debug!(
                        sender = %message.sender(),
                        target = %message.target(),
                        hops = message.hop_count(),
                        next_hop = %route.address,
                        "Relaying"
                    );
                    Action::Relay { message, route }
                }
                RelayDecision::Drop(reason) => {
                    tracing::trace!(source = %source, ?reason, "Relay dropped");
                    Action::Drop(reason.into())
                }
            }
        } else {
            Action::Drop(DropReason::NotForUs)
        };

        Dispatch { peer, action }
    }

    fn local(&mut self, frame: InboundFrame, now_ms: u64) -> Action {
        let message = &frame.message;

        if message.kind() == MessageKind::Ack {
            if message.is_broadcast() {
                return Action::Drop(DropReason::StrayAck);
            }
            return match message.decode_payload() {
                Ok(Payload::Ack { sequence }) => Action::Acknowledged {
                    sequence,
                    from: *message.sender(),
                },
                _ => Action::Drop(DropReason::MalformedAck),
            };
        }

        let acknowledge = message.requires_ack();
        if acknowledge && self.seen_recently(message.sender(), message.sequence(), now_ms) {
            tracing::debug!(
                sender = %message.sender(),
                sequence = message.sequence(),
                "Duplicate, re-acknowledging"
            );
            return Action::Duplicate { frame, acknowledge };
        }

        Action::Deliver { frame, acknowledge }
    }

    /// Whether (sender, sequence) was delivered within the window; records it if not
    fn seen_recently(&mut self, sender: &NodeId, sequence: u16, now_ms: u64) -> bool {
        let window = self.dedup_window_ms;
        self.recent
            .retain(|(_, _, seen)| now_ms.saturating_sub(*seen) <= window);

        if self
            .recent
            .iter()
            .any(|(s, seq, _)| s == sender && *seq == sequence)
        {
            return true;
        }

        if self.recent.len() >= DEDUP_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back((*sender, sequence, now_ms));
        false
    }
}
