//! Peer discovery, gateway election and staleness eviction

use crate::test_utils::{mac, pump, TestField};
use fieldmesh_core::{MeshSettings, NodeType};
use fieldmesh_mesh::NodeId;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

#[test]
fn test_nearest_gateway_is_strongest_gateway() {
    let field = TestField::new();
    let mut leaf = field.node(1, "AMB-01", NodeType::Ambient);
    let mut gw_a = field.node(2, "GW-A", NodeType::Gateway);
    let mut gw_b = field.node(3, "GW-B", NodeType::Gateway);
    let mut near_leaf = field.node(4, "AMB-02", NodeType::Ambient);
    field.link(1, 2, -70);
    field.link(1, 3, -40);
    field.link(1, 4, -20);

    pump(&mut [&mut gw_a, &mut gw_b, &mut near_leaf, &mut leaf], 1);

    assert_eq!(leaf.active_peer_count(), 3);
    assert_eq!(leaf.nearest_gateway().unwrap().node_id, id("GW-B"));
    assert_eq!(leaf.peer_signal("AMB-02"), Some(-20));
    assert_eq!(leaf.status().nearest_gateway, Some(id("GW-B")));

    let status = serde_json::to_value(leaf.status()).unwrap();
    assert_eq!(status["peer_count"], 3);
    assert_eq!(status["connected_to_gateway"], true);
}

#[test]
fn test_peer_evicted_after_two_heartbeat_intervals() {
    let field = TestField::new();
    let settings = MeshSettings {
        heartbeat_interval_ms: 1_000,
        eviction_interval_ms: 500,
        ..MeshSettings::default()
    };
    let mut leaf = field.node_with(1, "AMB-01", NodeType::Ambient, settings.clone());
    let mut gw = field.node_with(2, "GW-001", NodeType::Gateway, settings);
    field.link(1, 2, -60);
    pump(&mut [&mut gw, &mut leaf], 1);
    assert!(leaf.is_connected_to_gateway());
    assert!(leaf.radio().has_peer(mac(2)));

    field.unlink(1, 2);
    for _ in 0..4 {
        field.advance(500);
        pump(&mut [&mut gw, &mut leaf], 1);
    }
    // Silent for exactly two intervals: retained
    assert!(leaf.is_connected_to_gateway());

    field.advance(500);
    pump(&mut [&mut gw, &mut leaf], 1);

    assert_eq!(leaf.active_peer_count(), 0);
    assert!(!leaf.is_connected_to_gateway());
    assert!(!leaf.radio().has_peer(mac(2)));
}

#[test]
fn test_heartbeat_refreshes_gateway_role() {
    let field = TestField::new();
    let mut leaf = field.node(1, "AMB-01", NodeType::Ambient);
    let mut other = field.node(2, "NODE-X", NodeType::Ambient);
    field.link(1, 2, -60);
    pump(&mut [&mut other, &mut leaf], 1);
    assert!(!leaf.is_connected_to_gateway());

    // Same station rebooted as a gateway
    drop(other);
    let mut reconfigured = field.node(2, "NODE-X", NodeType::Gateway);
    pump(&mut [&mut reconfigured, &mut leaf], 1);

    assert_eq!(leaf.active_peer_count(), 1);
    assert_eq!(leaf.nearest_gateway().unwrap().node_id, id("NODE-X"));
}

#[test]
fn test_full_registry_releases_radio_registration() {
    let field = TestField::new();
    let settings = MeshSettings {
        max_peers: 2,
        ..MeshSettings::default()
    };
    let mut hub = field.node_with(1, "AMB-01", NodeType::Ambient, settings);
    let mut first = field.node(2, "SEC-01", NodeType::Security);
    let mut second = field.node(3, "SEC-02", NodeType::Security);
    let mut third = field.node(4, "SEC-03", NodeType::Security);
    for last in 2..=4 {
        field.link(1, last, -60);
    }

    for neighbor in [&mut first, &mut second, &mut third] {
        neighbor.update();
        hub.update();
        field.advance(10);
    }

    assert_eq!(hub.active_peer_count(), 2);
    assert!(hub.peer_signal("SEC-01").is_none());
    assert!(!hub.radio().has_peer(mac(2)));
    assert!(hub.radio().has_peer(mac(3)));
    assert!(hub.radio().has_peer(mac(4)));
    // Broadcast registration plus the two tracked peers
    assert_eq!(hub.radio().registered_peers(), 3);
}

#[test]
fn test_registry_bounded_by_radio_peer_table() {
    let field = TestField::new();
    let radio = field.ether.radio(mac(1)).with_peer_capacity(3);
    let mut hub = fieldmesh_mesh::MeshNode::with_settings(
        "AMB-01",
        NodeType::Ambient,
        MeshSettings::default(),
        radio,
        field.clock.clone(),
    )
    .unwrap();
    let mut neighbors: Vec<_> = (2..=5)
        .map(|last| {
            field.link(1, last, -60);
            field.node(last, &format!("SEC-0{last}"), NodeType::Security)
        })
        .collect();

    for neighbor in neighbors.iter_mut() {
        neighbor.update();
        hub.update();
        field.advance(10);
    }

    assert_eq!(hub.active_peer_count(), 2);
    assert_eq!(hub.radio().registered_peers(), 3);
}
