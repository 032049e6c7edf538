//! Mesh Node - the per-node mesh context
//!
//! Owns the radio, the peer registry, the delivery scheduler and the
//! reception dispatcher. The radio's receive callback only holds an
//! [`RxHandle`]; everything else happens inside [`MeshNode::update`],
//! which the application calls from its control loop at least as often
//! as the retry delay.

use crate::clock::{Clock, MonotonicClock};
use crate::codec::{encode, MeshMessage, MessageKind, Priority, MAX_PAYLOAD};
use crate::dispatcher::{inbound_channel, Action, Dispatch, Dispatcher, InboundFrame, RxHandle};
use crate::error::{MeshError, MeshResult};
use crate::identity::NodeId;
use crate::payload::{
    BatteryStatus, CommandCode, HealthStatus, Heartbeat, IntrusionClass, Payload,
    SensorDataAmbient, SensorDataSecurity,
};
use crate::peer::{Peer, PeerRegistry, UpsertOutcome};
use crate::routing::Router;
use crate::scheduler::{DeliveryReport, Scheduler, SchedulerConfig};
use fieldmesh_core::{Config, MeshSettings, NodeType};
use fieldmesh_radio::{MacAddress, Radio, RadioConfig};
use serde::Serialize;
use tokio::sync::mpsc;

/// Application delivery callback: decoded message and the station it came from
pub type MessageCallback = Box<dyn FnMut(&MeshMessage, MacAddress) + Send>;

/// Final outcome of each tracked send
pub type DeliveryCallback = Box<dyn FnMut(&DeliveryReport) + Send>;

/// Local health advertised in heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalHealth {
    pub status: HealthStatus,
    pub battery_pct: u8,
    pub free_heap_kb: u16,
}

impl Default for LocalHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Ok,
            battery_pct: 100,
            free_heap_kb: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
struct Counters {
    frames_received: u64,
    messages_delivered: u64,
    duplicates: u64,
    frames_relayed: u64,
    frames_dropped: u64,
    acks_sent: u64,
    deliveries_confirmed: u64,
    deliveries_failed: u64,
}

/// Snapshot of node state
#[derive(Debug, Clone, Serialize)]
pub struct MeshStatus {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub address: MacAddress,
    pub channel: u8,
    pub peer_count: usize,
    pub connected_to_gateway: bool,
    pub nearest_gateway: Option<NodeId>,
    pub queued: usize,
    pub pending_acks: usize,
    pub frames_received: u64,
    pub messages_delivered: u64,
    pub duplicates: u64,
    pub frames_relayed: u64,
    pub frames_dropped: u64,
    pub acks_sent: u64,
    pub deliveries_confirmed: u64,
    pub deliveries_failed: u64,
}

/// A mesh participant bound to one radio
pub struct MeshNode<R: Radio, C: Clock = MonotonicClock> {
    node_id: NodeId,
    node_type: NodeType,
    settings: MeshSettings,
    radio: R,
    clock: C,
    peers: PeerRegistry,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    rx_handle: RxHandle,
    inbound: mpsc::Receiver<InboundFrame>,
    sequence: u16,
    on_message: Option<MessageCallback>,
    on_delivery: Option<DeliveryCallback>,
    next_heartbeat_ms: u64,
    next_eviction_ms: u64,
    health: LocalHealth,
    counters: Counters,
}

impl<R: Radio> MeshNode<R, MonotonicClock> {
    /// One-time setup with default tuning on `channel`
    pub fn begin(node_id: &str, node_type: NodeType, channel: u8, radio: R) -> MeshResult<Self> {
        let settings = MeshSettings {
            channel,
            ..MeshSettings::default()
        };
        Self::with_settings(node_id, node_type, settings, radio, MonotonicClock::new())
    }

    /// Setup from a loaded configuration file
    pub fn from_config(config: &Config, radio: R) -> MeshResult<Self> {
        config.validate()?;
        Self::with_settings(
            &config.node.node_id,
            config.node.node_type,
            config.mesh.clone(),
            radio,
            MonotonicClock::new(),
        )
    }
}

impl<R: Radio, C: Clock> MeshNode<R, C> {
    /// Bind identity, configure the radio and install the receive hand-off
    pub fn with_settings(
        node_id: &str,
        node_type: NodeType,
        settings: MeshSettings,
        mut radio: R,
        clock: C,
    ) -> MeshResult<Self> {
        settings.validate()?;
        let node_id = NodeId::new(node_id)?;
        if node_id.is_broadcast() {
            return Err(MeshError::InvalidIdentity(node_id.to_string()));
        }

        radio.configure(&RadioConfig::new(settings.channel)?)?;
        radio.add_peer(MacAddress::BROADCAST)?;

        let (rx_handle, inbound) = inbound_channel(settings.inbound_capacity);
        let sink = rx_handle.clone();
        radio.set_receiver(Box::new(move |frame| {
            sink.on_frame(frame);
        }));

        // One radio slot is taken by the broadcast registration
        let max_peers = settings
            .max_peers
            .min(radio.peer_capacity().saturating_sub(1))
            .max(1);
        let router = Router::new(settings.max_hops);
        let dispatcher = Dispatcher::new(
            node_id,
            node_type.is_gateway(),
            router,
            settings.dedup_window_ms,
        );

        tracing::info!(
            node_id = %node_id,
            node_type = %node_type,
            address = %radio.address(),
            channel = settings.channel,
            "Mesh initialized"
        );

        Ok(Self {
            node_id,
            node_type,
            peers: PeerRegistry::new(max_peers),
            scheduler: Scheduler::new(SchedulerConfig::from(&settings)),
            next_eviction_ms: clock.now_ms() + settings.eviction_interval_ms,
            settings,
            radio,
            clock,
            dispatcher,
            rx_handle,
            inbound,
            sequence: 0,
            on_message: None,
            on_delivery: None,
            next_heartbeat_ms: 0,
            health: LocalHealth::default(),
            counters: Counters::default(),
        })
    }

    /// Handle for feeding frames from a driver that delivers them elsewhere
    pub fn rx_handle(&self) -> RxHandle {
        self.rx_handle.clone()
    }

    /// Register the delivery callback, replacing any previous one
    pub fn on_message<F>(&mut self, callback: F)
    where
        F: FnMut(&MeshMessage, MacAddress) + Send + 'static,
    {
        self.on_message = Some(Box::new(callback));
    }

    /// Register the callback receiving tracked-send outcomes
    pub fn on_delivery_report<F>(&mut self, callback: F)
    where
        F: FnMut(&DeliveryReport) + Send + 'static,
    {
        self.on_delivery = Some(Box::new(callback));
    }

    /// Queue a message for `target` (`"*"` broadcasts).
    ///
    /// Succeeds once the message is queued; end-to-end outcome of tracked
    /// messages arrives through the delivery report callback. Returns the
    /// sequence number assigned.
    pub fn send(
        &mut self,
        target: &str,
        kind: MessageKind,
        payload: &[u8],
        priority: Priority,
    ) -> MeshResult<u16> {
        let target = NodeId::new(target)?;
        self.send_to(target, kind, payload, priority)
    }

    /// Queue a message for every node in radio range
    pub fn broadcast(&mut self, kind: MessageKind, payload: &[u8], priority: Priority) -> MeshResult<u16> {
        self.send_to(NodeId::BROADCAST, kind, payload, priority)
    }

    /// Queue a message for an already parsed identity
    pub fn send_to(
        &mut self,
        target: NodeId,
        kind: MessageKind,
        payload: &[u8],
        priority: Priority,
    ) -> MeshResult<u16> {
        if payload.len() > MAX_PAYLOAD {
            return Err(MeshError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let route = self.dispatcher.router().resolve(&self.peers, &target)?;
        let now = self.clock.now_ms();
        let sequence = self.next_sequence();
        let message = encode(
            self.node_id,
            target,
            kind,
            priority,
            sequence,
            route.hop_delta,
            payload,
        )?
        .stamped(wire_timestamp(now));

        self.scheduler.enqueue(message, route, now)?;
        tracing::debug!(
            target = %target,
            kind = ?kind,
            priority = ?priority,
            sequence,
            route = ?route.kind,
            "Message queued"
        );
        Ok(sequence)
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Drive the node: drain received frames, emit a heartbeat and evict
    /// stale peers when due, then transmit whatever is ready.
    pub fn update(&mut self) {
        let now = self.clock.now_ms();

        while let Ok(frame) = self.inbound.try_recv() {
            self.handle_inbound(frame, now);
        }

        if now >= self.next_heartbeat_ms {
            self.next_heartbeat_ms = now + self.settings.heartbeat_interval_ms;
            if let Err(err) = self.send_heartbeat() {
                tracing::warn!(error = %err, "Heartbeat not queued");
            }
        }

        if now >= self.next_eviction_ms {
            self.next_eviction_ms = now + self.settings.eviction_interval_ms;
            self.evict_stale_peers(now);
        }

        let router = self.dispatcher.router();
        let peers = &self.peers;
        let reports = self.scheduler.service_rerouting(&mut self.radio, now, |outbound| {
            router.reroute(
                peers,
                outbound.message.target(),
                outbound.base_hops,
                outbound.relayed_from,
            )
        });
        for report in reports {
            self.report(report);
        }
    }

    fn handle_inbound(&mut self, frame: InboundFrame, now: u64) {
        self.counters.frames_received += 1;
        let source = frame.source;
        let Dispatch { peer, action } = self.dispatcher.dispatch(frame, &mut self.peers, now);

        if let Some(UpsertOutcome::Inserted { displaced }) = peer {
            if let Some(old) = displaced {
                self.release_radio_peer(old.address);
            }
            if let Err(err) = self.radio.add_peer(source) {
                tracing::warn!(address = %source, error = %err, "Radio peer registration failed");
            }
        }

        match action {
            Action::Deliver { frame, acknowledge } => {
                if acknowledge {
                    self.send_ack(&frame.message, now);
                }
                self.counters.messages_delivered += 1;
                if let Some(callback) = self.on_message.as_mut() {
                    callback(&frame.message, frame.source);
                }
                if matches!(frame.message.kind(), MessageKind::Disarm | MessageKind::Config) {
                    self.scheduler.purge_security_alarms();
                }
            }
            Action::Duplicate { frame, acknowledge } => {
                self.counters.duplicates += 1;
                if acknowledge {
                    self.send_ack(&frame.message, now);
                }
            }
            Action::Acknowledged { sequence, from } => {
                match self.scheduler.acknowledge(sequence, &from) {
                    Some(report) => self.report(report),
                    None => tracing::trace!(sequence, from = %from, "Unmatched acknowledgment"),
                }
            }
            Action::Relay { message, route } => {
                let sequence = message.sequence();
                match self.scheduler.enqueue_relay(message, route, source, now) {
                    Ok(()) => self.counters.frames_relayed += 1,
                    Err(err) => {
                        self.counters.frames_dropped += 1;
                        tracing::debug!(sequence, error = %err, "Relay not queued");
                    }
                }
            }
            Action::Drop(reason) => {
                self.counters.frames_dropped += 1;
                tracing::trace!(source = %source, ?reason, "Frame dropped");
            }
        }
    }

    fn send_ack(&mut self, original: &MeshMessage, now: u64) {
        let target = *original.sender();
        let route = match self.dispatcher.router().resolve(&self.peers, &target) {
            Ok(route) => route,
            Err(err) => {
                tracing::debug!(target = %target, error = %err, "Cannot acknowledge");
                return;
            }
        };

        let sequence = self.next_sequence();
        let payload = Payload::Ack {
            sequence: original.sequence(),
        }
        .encode();
        let ack = match encode(
            self.node_id,
            target,
            MessageKind::Ack,
            original.priority(),
            sequence,
            route.hop_delta,
            &payload,
        ) {
            Ok(ack) => ack.stamped(wire_timestamp(now)),
            Err(err) => {
                tracing::debug!(error = %err, "Cannot build acknowledgment");
                return;
            }
        };

        match self.scheduler.enqueue_untracked(ack, route, now) {
            Ok(()) => self.counters.acks_sent += 1,
            Err(err) => tracing::debug!(target = %target, error = %err, "Acknowledgment not queued"),
        }
    }

    fn evict_stale_peers(&mut self, now: u64) {
        let stale = self.peers.evict_stale(now, self.settings.peer_timeout_ms());
        for peer in stale {
            self.release_radio_peer(peer.address);
        }
    }

    fn release_radio_peer(&mut self, address: MacAddress) {
        if let Err(err) = self.radio.remove_peer(address) {
            tracing::warn!(address = %address, error = %err, "Radio peer release failed");
        }
    }

    fn report(&mut self, report: DeliveryReport) {
        if report.is_delivered() {
            self.counters.deliveries_confirmed += 1;
        } else {
            self.counters.deliveries_failed += 1;
        }
        if let Some(callback) = self.on_delivery.as_mut() {
            callback(&report);
        }
    }

    /// Cancel queued and pending security alarms; returns how many
    pub fn purge_security_alarms(&mut self) -> usize {
        self.scheduler.purge_security_alarms()
    }

    /// Strongest gateway in range
    pub fn nearest_gateway(&self) -> Option<&Peer> {
        self.peers.nearest_gateway()
    }

    pub fn is_connected_to_gateway(&self) -> bool {
        self.peers.nearest_gateway().is_some()
    }

    pub fn active_peer_count(&self) -> usize {
        self.peers.count()
    }

    /// Last signal strength heard from `node_id`
    pub fn peer_signal(&self, node_id: &str) -> Option<i8> {
        let node_id = NodeId::new(node_id).ok()?;
        self.peers.peer_signal(&node_id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn own_address(&self) -> MacAddress {
        self.radio.address()
    }

    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Health advertised in the next heartbeat
    pub fn set_local_health(&mut self, health: LocalHealth) {
        self.health = health;
    }

    pub fn status(&self) -> MeshStatus {
        let c = self.counters;
        MeshStatus {
            node_id: self.node_id,
            node_type: self.node_type,
            address: self.radio.address(),
            channel: self.settings.channel,
            peer_count: self.peers.count(),
            connected_to_gateway: self.is_connected_to_gateway(),
            nearest_gateway: self.peers.nearest_gateway().map(|p| p.node_id),
            queued: self.scheduler.queued_len(),
            pending_acks: self.scheduler.pending_len(),
            frames_received: c.frames_received,
            messages_delivered: c.messages_delivered,
            duplicates: c.duplicates,
            frames_relayed: c.frames_relayed,
            frames_dropped: c.frames_dropped,
            acks_sent: c.acks_sent,
            deliveries_confirmed: c.deliveries_confirmed,
            deliveries_failed: c.deliveries_failed,
        }
    }

    /// Nearest gateway's identity, or broadcast when none is known
    fn gateway_or_broadcast(&self) -> NodeId {
        self.peers
            .nearest_gateway()
            .map(|p| p.node_id)
            .unwrap_or(NodeId::BROADCAST)
    }

    /// Broadcast a heartbeat built from local state
    pub fn send_heartbeat(&mut self) -> MeshResult<u16> {
        let heartbeat = Heartbeat {
            node_type: self.node_type,
            status: self.health.status,
            uptime_sec: wire_timestamp(self.clock.now_ms()),
            free_heap_kb: self.health.free_heap_kb,
            rssi: self.peers.nearest_gateway().map_or(0, |p| p.rssi),
            battery_pct: self.health.battery_pct,
            mesh_neighbors: u8::try_from(self.peers.count()).unwrap_or(u8::MAX),
        };
        self.broadcast(
            MessageKind::Heartbeat,
            &Payload::Heartbeat(heartbeat).encode(),
            Priority::Medium,
        )
    }

    /// Telemetry to the nearest gateway
    pub fn send_sensor_data(&mut self, data: &SensorDataAmbient) -> MeshResult<u16> {
        let target = self.gateway_or_broadcast();
        self.send_to(
            target,
            MessageKind::SensorData,
            &Payload::Ambient(*data).encode(),
            Priority::Low,
        )
    }

    /// Report a classified intrusion.
    ///
    /// Persons raise a critical broadcast alarm, large animals a high
    /// priority alarm to the nearest gateway; anything else is sent as
    /// routine security telemetry.
    pub fn send_security_alarm(
        &mut self,
        class: IntrusionClass,
        data: &SensorDataSecurity,
    ) -> MeshResult<u16> {
        let payload = Payload::Security(*data).encode();
        match class {
            IntrusionClass::Person => {
                self.broadcast(MessageKind::AlarmPerson, &payload, Priority::Critical)
            }
            IntrusionClass::AnimalLarge => {
                let target = self.gateway_or_broadcast();
                self.send_to(target, MessageKind::AlarmAnimal, &payload, Priority::High)
            }
            _ => {
                let target = self.gateway_or_broadcast();
                self.send_to(target, MessageKind::SensorData, &payload, Priority::Low)
            }
        }
    }

    /// Enclosure tamper alarm to the nearest gateway
    pub fn send_tamper_alarm(&mut self, data: &SensorDataSecurity) -> MeshResult<u16> {
        let target = self.gateway_or_broadcast();
        self.send_to(
            target,
            MessageKind::AlarmTamper,
            &Payload::Security(*data).encode(),
            Priority::High,
        )
    }

    /// Power report to the nearest gateway
    pub fn send_battery_status(&mut self, status: &BatteryStatus) -> MeshResult<u16> {
        let target = self.gateway_or_broadcast();
        self.send_to(
            target,
            MessageKind::BatteryStatus,
            &Payload::Battery(*status).encode(),
            Priority::Medium,
        )
    }

    /// Command a node, usually from the gateway
    pub fn send_command(&mut self, target: &str, command: CommandCode) -> MeshResult<u16> {
        self.send(
            target,
            MessageKind::Command,
            &Payload::Command(command).encode(),
            Priority::High,
        )
    }

    /// Arm every security node in range
    pub fn arm(&mut self) -> MeshResult<u16> {
        self.broadcast(MessageKind::Arm, &[], Priority::High)
    }

    /// Disarm every security node in range, cancelling this node's own
    /// queued and pending security alarms first
    pub fn disarm(&mut self) -> MeshResult<u16> {
        self.scheduler.purge_security_alarms();
        self.broadcast(MessageKind::Disarm, &[], Priority::High)
    }
}

/// Boot-relative seconds
fn wire_timestamp(now_ms: u64) -> u32 {
    u32::try_from(now_ms / 1000).unwrap_or(u32::MAX)
}
