//! Test utilities for multi-node mesh scenarios

use fieldmesh_core::{MeshSettings, NodeType};
use fieldmesh_mesh::{DeliveryReport, ManualClock, MeshMessage, MeshNode, MessageKind};
use fieldmesh_radio::{Ether, MacAddress, SimRadio};
use std::sync::{Arc, Mutex};

/// Node type used throughout the scenarios
pub type TestNode = MeshNode<SimRadio, ManualClock>;

/// Hardware address for station `last`
pub fn mac(last: u8) -> MacAddress {
    MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, last])
}

/// Install a test subscriber once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A radio medium and a clock shared by every node on it
pub struct TestField {
    pub ether: Ether,
    pub clock: ManualClock,
}

impl TestField {
    pub fn new() -> Self {
        init_tracing();
        Self {
            ether: Ether::new(),
            clock: ManualClock::new(0),
        }
    }

    /// Node with default tuning
    pub fn node(&self, last: u8, name: &str, node_type: NodeType) -> TestNode {
        self.node_with(last, name, node_type, MeshSettings::default())
    }

    /// Node with custom tuning
    pub fn node_with(
        &self,
        last: u8,
        name: &str,
        node_type: NodeType,
        settings: MeshSettings,
    ) -> TestNode {
        MeshNode::with_settings(
            name,
            node_type,
            settings,
            self.ether.radio(mac(last)),
            self.clock.clone(),
        )
        .unwrap()
    }

    /// Symmetric radio link between two stations
    pub fn link(&self, a: u8, b: u8, rssi: i8) {
        self.ether.connect(mac(a), mac(b), rssi);
    }

    pub fn unlink(&self, a: u8, b: u8) {
        self.ether.disconnect(mac(a), mac(b));
    }

    pub fn advance(&self, ms: u64) {
        self.clock.advance(ms);
    }

    pub fn transmissions(&self, last: u8) -> u64 {
        self.ether.transmit_attempts(mac(last))
    }
}

impl Default for TestField {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `rounds` control-loop iterations on every node, in order
pub fn pump(nodes: &mut [&mut TestNode], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes.iter_mut() {
            node.update();
        }
    }
}

/// Messages handed to a node's application callback
#[derive(Clone, Default)]
pub struct Inbox(Arc<Mutex<Vec<(MeshMessage, MacAddress)>>>);

impl Inbox {
    pub fn attach(node: &mut TestNode) -> Self {
        let inbox = Self::default();
        let sink = inbox.0.clone();
        node.on_message(move |message, source| {
            sink.lock().unwrap().push((message.clone(), source));
        });
        inbox
    }

    pub fn messages(&self) -> Vec<(MeshMessage, MacAddress)> {
        self.0.lock().unwrap().clone()
    }

    /// Delivered kinds in order, heartbeats excluded
    pub fn kinds(&self) -> Vec<MessageKind> {
        self.messages()
            .into_iter()
            .map(|(m, _)| m.kind())
            .filter(|k| *k != MessageKind::Heartbeat)
            .collect()
    }

    pub fn of_kind(&self, kind: MessageKind) -> Vec<(MeshMessage, MacAddress)> {
        self.messages()
            .into_iter()
            .filter(|(m, _)| m.kind() == kind)
            .collect()
    }
}

/// Delivery reports raised by a node
#[derive(Clone, Default)]
pub struct Reports(Arc<Mutex<Vec<DeliveryReport>>>);

impl Reports {
    pub fn attach(node: &mut TestNode) -> Self {
        let reports = Self::default();
        let sink = reports.0.clone();
        node.on_delivery_report(move |report| {
            sink.lock().unwrap().push(report.clone());
        });
        reports
    }

    pub fn all(&self) -> Vec<DeliveryReport> {
        self.0.lock().unwrap().clone()
    }
}
