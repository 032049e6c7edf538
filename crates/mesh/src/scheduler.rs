//! Delivery Scheduler - priority lanes, acknowledgment tracking, bounded retry
//!
//! Outbound messages wait in one FIFO lane per priority. Each service pass
//! first expires overdue acknowledgments, then drains every ready message,
//! most urgent lane first. The next hop is resolved again on every dequeue,
//! so retries follow peer evictions and gateway changes. Tracked messages move to the pending index after
//! a successful transmission and stay there until acknowledged or out of
//! attempts. Every message, tracked or not, gets at most `max_attempts`
//! transmissions.

use crate::codec::{MeshMessage, MessageKind, Priority};
use crate::error::{MeshError, MeshResult};
use crate::identity::NodeId;
use crate::routing::Route;
use fieldmesh_core::MeshSettings;
use fieldmesh_radio::{MacAddress, Radio, RadioError};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

const LANES: usize = Priority::ALL.len();

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Queued messages allowed across all lanes
    pub queue_depth: usize,
    /// Transmissions allowed per message
    pub max_attempts: u8,
    /// Back-off after a failed transmission (milliseconds)
    pub retry_delay_ms: u64,
    /// Acknowledgment deadline after a transmission (milliseconds)
    pub ack_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&MeshSettings::default())
    }
}

impl From<&MeshSettings> for SchedulerConfig {
    fn from(settings: &MeshSettings) -> Self {
        Self {
            queue_depth: settings.queue_depth,
            max_attempts: settings.max_attempts(),
            retry_delay_ms: settings.retry_delay_ms,
            ack_timeout_ms: settings.ack_timeout_ms,
        }
    }
}

/// Whether a message waits for an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryMode {
    /// Acknowledgment-tracked with resubmission on timeout
    Tracked,
    /// Done once the radio accepts it
    FireAndForget,
}

impl DeliveryMode {
    /// Mode for a locally originated message
    pub fn for_message(message: &MeshMessage) -> Self {
        if message.requires_ack() {
            DeliveryMode::Tracked
        } else {
            DeliveryMode::FireAndForget
        }
    }
}

/// A message awaiting transmission
#[derive(Debug, Clone)]
pub struct Outbound {
    pub message: MeshMessage,
    /// Resolved next hop
    pub destination: MacAddress,
    /// Hop count without the current route's delta
    pub base_hops: u8,
    /// Station a relayed message arrived from
    pub relayed_from: Option<MacAddress>,
    /// Transmissions so far
    pub attempts: u8,
    /// Earliest transmission time (milliseconds)
    pub not_before_ms: u64,
    pub mode: DeliveryMode,
}

impl Outbound {
    fn new(message: MeshMessage, route: Route, relayed_from: Option<MacAddress>, now_ms: u64) -> Self {
        let mode = match relayed_from {
            Some(_) => DeliveryMode::FireAndForget,
            None => DeliveryMode::for_message(&message),
        };
        Self {
            base_hops: message.hop_count().saturating_sub(route.hop_delta),
            destination: route.address,
            message,
            relayed_from,
            attempts: 0,
            not_before_ms: now_ms,
            mode,
        }
    }

    /// Switch to a freshly resolved route, resealing the hop count
    fn apply_route(&mut self, route: Route) {
        let hops = self.base_hops.saturating_add(route.hop_delta);
        if route.address == self.destination && hops == self.message.hop_count() {
            return;
        }
        match self.message.set_hop_count(hops) {
            Ok(()) => {
                tracing::debug!(
                    sequence = self.message.sequence(),
                    from = %self.destination,
                    to = %route.address,
                    "Rerouted"
                );
                self.destination = route.address;
            }
            Err(err) => tracing::debug!(
                sequence = self.message.sequence(),
                error = %err,
                "Keeping previous route"
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingAck {
    outbound: Outbound,
    deadline_ms: u64,
}

/// Why a tracked message was given up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// Last transmission attempt rejected by the radio
    Transmission(RadioError),
    /// No acknowledgment after the final attempt
    AckTimeout,
    /// Evicted from a full queue by a more urgent message
    Displaced,
}

/// Final outcome of a tracked message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeliveryReport {
    /// Acknowledged by the target
    Delivered {
        sequence: u16,
        target: NodeId,
        kind: MessageKind,
        attempts: u8,
    },
    /// Permanently failed
    Failed {
        sequence: u16,
        target: NodeId,
        kind: MessageKind,
        attempts: u8,
        reason: FailureReason,
    },
}

impl DeliveryReport {
    fn failed(outbound: &Outbound, reason: FailureReason) -> Self {
        DeliveryReport::Failed {
            sequence: outbound.message.sequence(),
            target: *outbound.message.target(),
            kind: outbound.message.kind(),
            attempts: outbound.attempts,
            reason,
        }
    }

    /// Sequence number of the reported message
    pub fn sequence(&self) -> u16 {
        match self {
            DeliveryReport::Delivered { sequence, .. } | DeliveryReport::Failed { sequence, .. } => {
                *sequence
            }
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryReport::Delivered { .. })
    }
}

/// Priority-ordered outbound queue with acknowledgment tracking
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    lanes: [VecDeque<Outbound>; LANES],
    pending: BTreeMap<u16, PendingAck>,
    /// Reports produced outside `service` (displacement), handed out on the next pass
    reports: Vec<DeliveryReport>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            lanes: Default::default(),
            pending: BTreeMap::new(),
            reports: Vec::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue a locally originated message for its first transmission.
    ///
    /// When the queue is full, the newest message of the lowest priority
    /// strictly below this one's is evicted to make room; with nothing to
    /// evict the message is rejected.
    pub fn enqueue(&mut self, message: MeshMessage, route: Route, now_ms: u64) -> MeshResult<()> {
        self.push(Outbound::new(message, route, None, now_ms))
    }

    /// Queue a frame forwarded on behalf of the station at `source`.
    /// Relays are never acknowledgment-tracked.
    pub fn enqueue_relay(
        &mut self,
        message: MeshMessage,
        route: Route,
        source: MacAddress,
        now_ms: u64,
    ) -> MeshResult<()> {
        self.push(Outbound::new(message, route, Some(source), now_ms))
    }

    /// Queue an acknowledgment or other message that is never tracked
    pub fn enqueue_untracked(&mut self, message: MeshMessage, route: Route, now_ms: u64) -> MeshResult<()> {
        let mut outbound = Outbound::new(message, route, None, now_ms);
        outbound.mode = DeliveryMode::FireAndForget;
        self.push(outbound)
    }

    fn push(&mut self, outbound: Outbound) -> MeshResult<()> {
        if self.queued_len() >= self.config.queue_depth {
            let incoming = outbound.message.priority().as_u8() as usize;
            let victim = self.lanes[incoming + 1..]
                .iter_mut()
                .rev()
                .find(|lane| !lane.is_empty())
                .and_then(VecDeque::pop_back);
            match victim {
                Some(victim) => {
                    tracing::debug!(
                        sequence = victim.message.sequence(),
                        priority = ?victim.message.priority(),
                        "Queue full, displacing lower-priority message"
                    );
                    if victim.mode == DeliveryMode::Tracked {
                        self.reports
                            .push(DeliveryReport::failed(&victim, FailureReason::Displaced));
                    }
                }
                None => {
                    return Err(MeshError::QueueFull {
                        depth: self.config.queue_depth,
                    })
                }
            }
        }

        tracing::trace!(
            sequence = outbound.message.sequence(),
            priority = ?outbound.message.priority(),
            destination = %outbound.destination,
            "Queued message"
        );
        let lane = outbound.message.priority().as_u8() as usize;
        self.lanes[lane].push_back(outbound);
        Ok(())
    }

    /// Service pass that keeps every queued message on its enqueue-time route
    pub fn service<R: Radio + ?Sized>(&mut self, radio: &mut R, now_ms: u64) -> Vec<DeliveryReport> {
        self.service_rerouting(radio, now_ms, |_| None)
    }

    /// Expire overdue acknowledgments, then transmit every ready message.
    ///
    /// `reroute` is asked for a fresh next hop before each transmission;
    /// `None` keeps the previous one. Returns the final outcome of each
    /// tracked message that failed during this pass (or was displaced
    /// since the last one).
    pub fn service_rerouting<R, F>(
        &mut self,
        radio: &mut R,
        now_ms: u64,
        mut reroute: F,
    ) -> Vec<DeliveryReport>
    where
        R: Radio + ?Sized,
        F: FnMut(&Outbound) -> Option<Route>,
    {
        let mut reports = std::mem::take(&mut self.reports);
        self.expire_acks(now_ms, &mut reports);

        while let Some((lane, index)) = self.next_ready(now_ms) {
            let Some(mut outbound) = self.lanes[lane].remove(index) else {
                break;
            };
            if let Some(route) = reroute(&outbound) {
                outbound.apply_route(route);
            }
            outbound.attempts += 1;
            let frame = outbound.message.to_bytes();

            match radio.send(outbound.destination, &frame) {
                Ok(()) => {
                    tracing::trace!(
                        sequence = outbound.message.sequence(),
                        attempt = outbound.attempts,
                        destination = %outbound.destination,
                        "Transmitted"
                    );
                    if outbound.mode == DeliveryMode::Tracked {
                        let sequence = outbound.message.sequence();
                        let deadline_ms = now_ms + self.config.ack_timeout_ms;
                        self.pending.insert(
                            sequence,
                            PendingAck {
                                outbound,
                                deadline_ms,
                            },
                        );
                    }
                }
                Err(err) if outbound.attempts < self.config.max_attempts => {
                    tracing::debug!(
                        sequence = outbound.message.sequence(),
                        attempt = outbound.attempts,
                        error = %err,
                        "Transmission failed, retrying"
                    );
                    outbound.not_before_ms = now_ms + self.config.retry_delay_ms;
                    self.lanes[lane].insert(index, outbound);
                }
                Err(err) => {
                    tracing::warn!(
                        sequence = outbound.message.sequence(),
                        attempts = outbound.attempts,
                        error = %err,
                        "Delivery failed"
                    );
                    if outbound.mode == DeliveryMode::Tracked {
                        reports.push(DeliveryReport::failed(
                            &outbound,
                            FailureReason::Transmission(err),
                        ));
                    }
                }
            }
        }

        reports
    }

    fn expire_acks(&mut self, now_ms: u64, reports: &mut Vec<DeliveryReport>) {
        let overdue: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline_ms <= now_ms)
            .map(|(seq, _)| *seq)
            .collect();

        for sequence in overdue {
            let Some(PendingAck { mut outbound, .. }) = self.pending.remove(&sequence) else {
                continue;
            };
            if outbound.attempts < self.config.max_attempts {
                tracing::debug!(
                    sequence,
                    attempt = outbound.attempts,
                    "Acknowledgment timeout, resubmitting"
                );
                outbound.not_before_ms = now_ms;
                let lane = outbound.message.priority().as_u8() as usize;
                self.lanes[lane].push_front(outbound);
            } else {
                tracing::warn!(
                    sequence,
                    attempts = outbound.attempts,
                    target = %outbound.message.target(),
                    "Delivery failed: no acknowledgment"
                );
                reports.push(DeliveryReport::failed(&outbound, FailureReason::AckTimeout));
            }
        }
    }

    /// First ready entry of the most urgent lane that has one
    fn next_ready(&self, now_ms: u64) -> Option<(usize, usize)> {
        self.lanes.iter().enumerate().find_map(|(lane, queue)| {
            queue
                .iter()
                .position(|o| o.not_before_ms <= now_ms)
                .map(|index| (lane, index))
        })
    }

    /// Complete a tracked message.
    ///
    /// `from` must be the original target unless the message was a
    /// broadcast, in which case any acknowledging node completes it. A
    /// message resubmitted after a timeout but not yet retransmitted is
    /// completed as well.
    pub fn acknowledge(&mut self, sequence: u16, from: &NodeId) -> Option<DeliveryReport> {
        let matches = |o: &Outbound| {
            o.mode == DeliveryMode::Tracked
                && o.message.sequence() == sequence
                && (o.message.is_broadcast() || o.message.target() == from)
        };

        let outbound = if self.pending.get(&sequence).is_some_and(|p| matches(&p.outbound)) {
            self.pending.remove(&sequence).map(|p| p.outbound)
        } else {
            self.lanes.iter_mut().find_map(|lane| {
                let index = lane.iter().position(|o| matches(o))?;
                lane.remove(index)
            })
        }?;

        tracing::debug!(sequence, from = %from, attempts = outbound.attempts, "Delivery confirmed");
        Some(DeliveryReport::Delivered {
            sequence,
            target: *outbound.message.target(),
            kind: outbound.message.kind(),
            attempts: outbound.attempts,
        })
    }

    /// Drop queued and pending messages matching `predicate`; returns how many
    pub fn purge<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&MeshMessage) -> bool,
    {
        let before = self.queued_len() + self.pending_len();
        for lane in &mut self.lanes {
            lane.retain(|o| !predicate(&o.message));
        }
        self.pending.retain(|_, p| !predicate(&p.outbound.message));
        before - (self.queued_len() + self.pending_len())
    }

    /// Cancel every queued and pending security alarm
    pub fn purge_security_alarms(&mut self) -> usize {
        let purged = self.purge(|m| m.kind().is_security_alarm());
        if purged > 0 {
            tracing::info!(purged, "Purged security alarms");
        }
        purged
    }

    /// Messages awaiting transmission
    pub fn queued_len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    /// Messages in a single priority lane
    pub fn queued_for(&self, priority: Priority) -> usize {
        self.lanes[priority.as_u8() as usize].len()
    }

    /// Transmitted messages awaiting acknowledgment
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queued_len() == 0 && self.pending.is_empty()
    }
}
