//! Gateway relay between leaves that cannot hear each other

use crate::test_utils::{mac, pump, Inbox, Reports, TestField, TestNode};
use fieldmesh_core::NodeType;
use fieldmesh_mesh::{encode, DeliveryReport, MessageKind, NodeId, Priority, MAX_HOPS};
use fieldmesh_radio::RxFrame;

const AMB: u8 = 1;
const GW: u8 = 2;
const SEC: u8 = 3;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

/// AMB-01 <-> GW-001 <-> SEC-01, leaves out of range of each other
fn line(field: &TestField) -> (TestNode, TestNode, TestNode) {
    let amb = field.node(AMB, "AMB-01", NodeType::Ambient);
    let gw = field.node(GW, "GW-001", NodeType::Gateway);
    let sec = field.node(SEC, "SEC-01", NodeType::Security);
    field.link(AMB, GW, -55);
    field.link(GW, SEC, -65);
    (amb, gw, sec)
}

#[test]
fn test_leaf_reaches_out_of_range_leaf_via_gateway() {
    let field = TestField::new();
    let (mut amb, mut gw, mut sec) = line(&field);
    let sec_inbox = Inbox::attach(&mut sec);
    pump(&mut [&mut amb, &mut gw, &mut sec], 2);

    assert!(amb.is_connected_to_gateway());
    assert!(amb.peer_signal("SEC-01").is_none());

    amb.send("SEC-01", MessageKind::SensorData, &[7; 17], Priority::Low)
        .unwrap();
    pump(&mut [&mut amb, &mut gw, &mut sec], 1);

    let delivered = sec_inbox.of_kind(MessageKind::SensorData);
    assert_eq!(delivered.len(), 1);
    let (message, source) = &delivered[0];
    assert_eq!(message.sender(), &id("AMB-01"));
    assert_eq!(*source, mac(GW));
    // One hop for the leaf's gateway hand-off, one for the relay
    assert_eq!(message.hop_count(), 2);
    assert_eq!(message.payload(), &[7; 17]);
    assert_eq!(gw.status().frames_relayed, 1);
}

#[test]
fn test_tracked_alarm_acknowledged_across_relay() {
    let field = TestField::new();
    let (mut amb, mut gw, mut sec) = line(&field);
    let reports = Reports::attach(&mut amb);
    let sec_inbox = Inbox::attach(&mut sec);
    pump(&mut [&mut amb, &mut gw, &mut sec], 2);

    let sequence = amb
        .send("SEC-01", MessageKind::AlarmAnimal, &[], Priority::High)
        .unwrap();
    pump(&mut [&mut amb, &mut gw, &mut sec], 3);

    assert_eq!(sec_inbox.of_kind(MessageKind::AlarmAnimal).len(), 1);
    assert_eq!(
        reports.all(),
        vec![DeliveryReport::Delivered {
            sequence,
            target: id("SEC-01"),
            kind: MessageKind::AlarmAnimal,
            attempts: 1,
        }]
    );
    assert_eq!(amb.status().pending_acks, 0);
    // The security node's view of the gateway is not renamed by relayed traffic
    assert_eq!(sec.nearest_gateway().unwrap().node_id, id("GW-001"));
}

#[test]
fn test_hop_ceiling_message_dropped_at_gateway() {
    let field = TestField::new();
    let (mut amb, mut gw, mut sec) = line(&field);
    let sec_inbox = Inbox::attach(&mut sec);
    pump(&mut [&mut amb, &mut gw, &mut sec], 2);
    let gw_transmissions = field.transmissions(GW);

    let worn_out = encode(
        id("AMB-01"),
        id("SEC-01"),
        MessageKind::SensorData,
        Priority::Low,
        900,
        MAX_HOPS,
        &[],
    )
    .unwrap();
    field.ether.inject(
        mac(GW),
        RxFrame {
            source: mac(AMB),
            rssi: -55,
            data: worn_out.to_bytes().to_vec(),
        },
    );
    pump(&mut [&mut gw, &mut sec], 1);

    assert!(sec_inbox.of_kind(MessageKind::SensorData).is_empty());
    assert_eq!(field.transmissions(GW), gw_transmissions);
    assert_eq!(gw.status().frames_relayed, 0);
    assert_eq!(gw.status().frames_dropped, 1);
}

fn inject_from_amb(field: &TestField, sequence: u16, hops: u8) {
    let frame = encode(
        id("AMB-01"),
        id("SEC-01"),
        MessageKind::SensorData,
        Priority::Low,
        sequence,
        hops,
        &[],
    )
    .unwrap();
    field.ether.inject(
        mac(GW),
        RxFrame {
            source: mac(AMB),
            rssi: -55,
            data: frame.to_bytes().to_vec(),
        },
    );
}

#[test]
fn test_frame_reaching_ceiling_on_increment_is_dropped() {
    let field = TestField::new();
    let (mut amb, mut gw, mut sec) = line(&field);
    let sec_inbox = Inbox::attach(&mut sec);
    pump(&mut [&mut amb, &mut gw, &mut sec], 2);
    let gw_transmissions = field.transmissions(GW);

    inject_from_amb(&field, 901, MAX_HOPS - 1);
    pump(&mut [&mut gw, &mut sec], 1);

    assert!(sec_inbox.of_kind(MessageKind::SensorData).is_empty());
    assert_eq!(field.transmissions(GW), gw_transmissions);
    assert_eq!(gw.status().frames_dropped, 1);

    inject_from_amb(&field, 902, MAX_HOPS - 2);
    pump(&mut [&mut gw, &mut sec], 1);

    let delivered = sec_inbox.of_kind(MessageKind::SensorData);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0.sequence(), 902);
    assert_eq!(delivered[0].0.hop_count(), MAX_HOPS - 1);
}

/// AMB-01 <-> GW-001 <-> GW-002 <-> SEC-01
#[test]
fn test_relay_across_two_gateways() {
    const GW2: u8 = 4;
    let field = TestField::new();
    let mut amb = field.node(AMB, "AMB-01", NodeType::Ambient);
    let mut gw = field.node(GW, "GW-001", NodeType::Gateway);
    let mut gw2 = field.node(GW2, "GW-002", NodeType::Gateway);
    let mut sec = field.node(SEC, "SEC-01", NodeType::Security);
    field.link(AMB, GW, -55);
    field.link(GW, GW2, -60);
    field.link(GW2, SEC, -65);
    let sec_inbox = Inbox::attach(&mut sec);
    let reports = Reports::attach(&mut amb);
    pump(&mut [&mut amb, &mut gw, &mut gw2, &mut sec], 2);

    assert_eq!(gw.nearest_gateway().unwrap().node_id, id("GW-002"));
    assert!(gw.peer_signal("SEC-01").is_none());

    amb.send("SEC-01", MessageKind::SensorData, &[3; 17], Priority::Low)
        .unwrap();
    pump(&mut [&mut amb, &mut gw, &mut gw2, &mut sec], 1);

    let delivered = sec_inbox.of_kind(MessageKind::SensorData);
    assert_eq!(delivered.len(), 1);
    let (message, source) = &delivered[0];
    assert_eq!(*source, mac(GW2));
    // Leaf hand-off 1, first gateway relay +1 plus gateway delta 1, second relay +1
    assert_eq!(message.hop_count(), 4);
    assert_eq!(gw.status().frames_relayed, 1);
    assert_eq!(gw2.status().frames_relayed, 1);

    // The acknowledgment travels the same chain back
    let sequence = amb
        .send("SEC-01", MessageKind::AlarmAnimal, &[], Priority::High)
        .unwrap();
    pump(&mut [&mut amb, &mut gw, &mut gw2, &mut sec], 4);
    assert_eq!(sec_inbox.of_kind(MessageKind::AlarmAnimal).len(), 1);
    assert!(reports
        .all()
        .iter()
        .any(|r| r.sequence() == sequence && r.is_delivered()));
}

#[test]
fn test_corrupted_frame_silently_discarded() {
    let field = TestField::new();
    let (mut amb, mut gw, mut sec) = line(&field);
    let gw_inbox = Inbox::attach(&mut gw);
    pump(&mut [&mut amb, &mut gw, &mut sec], 2);
    let received = gw.status().frames_received;

    let mut data = encode(
        id("AMB-01"),
        id("GW-001"),
        MessageKind::SensorData,
        Priority::Low,
        902,
        0,
        &[1, 2, 3],
    )
    .unwrap()
    .to_bytes()
    .to_vec();
    data[35] ^= 0x80;
    field.ether.inject(
        mac(GW),
        RxFrame {
            source: mac(AMB),
            rssi: -55,
            data,
        },
    );
    gw.update();

    assert_eq!(gw.status().frames_received, received);
    assert!(gw_inbox.of_kind(MessageKind::SensorData).is_empty());
}

#[test]
fn test_leaf_does_not_relay() {
    let field = TestField::new();
    let mut amb = field.node(AMB, "AMB-01", NodeType::Ambient);
    let mut sec = field.node(SEC, "SEC-01", NodeType::Security);
    field.link(AMB, SEC, -50);
    pump(&mut [&mut amb, &mut sec], 2);
    let amb_transmissions = field.transmissions(AMB);

    let elsewhere = encode(
        id("SEC-01"),
        id("GW-001"),
        MessageKind::SensorData,
        Priority::Low,
        5,
        0,
        &[],
    )
    .unwrap();
    field.ether.inject(
        mac(AMB),
        RxFrame {
            source: mac(SEC),
            rssi: -50,
            data: elsewhere.to_bytes().to_vec(),
        },
    );
    amb.update();

    assert_eq!(field.transmissions(AMB), amb_transmissions);
    assert_eq!(amb.status().frames_dropped, 1);
}
