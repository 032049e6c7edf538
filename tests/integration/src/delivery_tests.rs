//! Acknowledged delivery, retry bounds, priority order and purges

use crate::test_utils::{mac, pump, Inbox, Reports, TestField, TestNode};
use fieldmesh_core::{Config, NodeType};
use fieldmesh_mesh::{
    CommandCode, DeliveryReport, FailureReason, IntrusionClass, MeshNode, MessageKind, NodeId,
    Payload, Priority, SensorDataSecurity,
};

const GW: u8 = 1;
const SEC: u8 = 2;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

/// GW-001 <-> SEC-01, discovered
fn pair(field: &TestField) -> (TestNode, TestNode) {
    let mut gw = field.node(GW, "GW-001", NodeType::Gateway);
    let mut sec = field.node(SEC, "SEC-01", NodeType::Security);
    field.link(GW, SEC, -58);
    pump(&mut [&mut gw, &mut sec], 2);
    (gw, sec)
}

fn person_snapshot() -> SensorDataSecurity {
    SensorDataSecurity {
        pir_main: true,
        pir_backup: true,
        motion_detected: true,
        classification: IntrusionClass::Person,
        distance_cm: 420.0,
        accel_x: 0.0,
        accel_y: 0.0,
        accel_z: 1.0,
        tamper_detected: false,
    }
}

#[test]
fn test_ack_completes_delivery() {
    let field = TestField::new();
    let (mut gw, mut sec) = pair(&field);
    let reports = Reports::attach(&mut gw);
    let sec_inbox = Inbox::attach(&mut sec);

    let sequence = gw.send_command("SEC-01", CommandCode::TestSiren).unwrap();
    gw.update();
    sec.update();
    gw.update();

    let commands = sec_inbox.of_kind(MessageKind::Command);
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].0.decode_payload().unwrap(),
        Payload::Command(CommandCode::TestSiren)
    );
    assert_eq!(
        reports.all(),
        vec![DeliveryReport::Delivered {
            sequence,
            target: id("SEC-01"),
            kind: MessageKind::Command,
            attempts: 1,
        }]
    );
    assert_eq!(gw.status().pending_acks, 0);
    assert_eq!(sec.status().acks_sent, 1);
}

#[test]
fn test_always_failing_radio_attempts_exactly_four_times() {
    let field = TestField::new();
    let (mut gw, _sec) = pair(&field);
    let reports = Reports::attach(&mut gw);
    let before = field.transmissions(GW);

    field.ether.set_send_failure(mac(GW), true);
    let sequence = gw.send_command("SEC-01", CommandCode::StopAlarm).unwrap();
    for _ in 0..10 {
        gw.update();
        field.advance(100);
    }

    assert_eq!(field.transmissions(GW) - before, 4);
    let all = reports.all();
    assert_eq!(all.len(), 1);
    match &all[0] {
        DeliveryReport::Failed {
            sequence: failed,
            attempts,
            reason: FailureReason::Transmission(_),
            ..
        } => {
            assert_eq!(*failed, sequence);
            assert_eq!(*attempts, 4);
        }
        other => panic!("Expected transmission failure, got {other:?}"),
    }
    assert_eq!(gw.status().deliveries_failed, 1);
}

#[test]
fn test_unacknowledged_command_resubmitted_then_failed() {
    let field = TestField::new();
    let (mut gw, _silent) = pair(&field);
    let reports = Reports::attach(&mut gw);
    let before = field.transmissions(GW);

    // The target never runs its loop, so no acknowledgment comes back
    gw.send_command("SEC-01", CommandCode::TestLight).unwrap();
    for _ in 0..6 {
        gw.update();
        field.advance(1_000);
    }

    assert_eq!(field.transmissions(GW) - before, 4);
    assert!(matches!(
        reports.all().as_slice(),
        [DeliveryReport::Failed {
            reason: FailureReason::AckTimeout,
            attempts: 4,
            ..
        }]
    ));
}

#[test]
fn test_critical_sent_before_queued_medium() {
    let field = TestField::new();
    let (mut gw, mut sec) = pair(&field);
    let gw_inbox = Inbox::attach(&mut gw);

    sec.broadcast(MessageKind::Topology, &[1], Priority::Medium)
        .unwrap();
    sec.broadcast(MessageKind::Topology, &[2], Priority::Medium)
        .unwrap();
    sec.send_security_alarm(IntrusionClass::Person, &person_snapshot())
        .unwrap();
    pump(&mut [&mut sec, &mut gw], 1);

    assert_eq!(
        gw_inbox.kinds(),
        vec![
            MessageKind::AlarmPerson,
            MessageKind::Topology,
            MessageKind::Topology
        ]
    );
    let topology: Vec<Vec<u8>> = gw_inbox
        .of_kind(MessageKind::Topology)
        .into_iter()
        .map(|(m, _)| m.payload().to_vec())
        .collect();
    assert_eq!(topology, vec![vec![1], vec![2]]);
}

#[test]
fn test_disarm_purges_queued_security_alarms() {
    let field = TestField::new();
    let (mut gw, mut sec) = pair(&field);
    let gw_inbox = Inbox::attach(&mut gw);
    let gw_reports = Reports::attach(&mut gw);

    sec.send_security_alarm(IntrusionClass::Person, &person_snapshot())
        .unwrap();
    assert_eq!(sec.status().queued, 1);

    let disarm = gw.disarm().unwrap();
    gw.update();
    sec.update();
    gw.update();

    assert!(gw_inbox.of_kind(MessageKind::AlarmPerson).is_empty());
    assert_eq!(sec.status().queued, 0);
    assert_eq!(sec.status().pending_acks, 0);
    assert!(gw_reports
        .all()
        .iter()
        .any(|r| r.is_delivered() && r.sequence() == disarm));
}

#[test]
fn test_duplicate_retransmission_not_redelivered() {
    let field = TestField::new();
    let (mut gw, mut sec) = pair(&field);
    let reports = Reports::attach(&mut gw);
    let sec_inbox = Inbox::attach(&mut sec);

    gw.send_command("SEC-01", CommandCode::TestSiren).unwrap();
    gw.update();

    // First acknowledgment is lost
    field.ether.set_send_failure(mac(SEC), true);
    sec.update();
    field.ether.set_send_failure(mac(SEC), false);

    field.advance(1_000);
    gw.update();
    sec.update();
    gw.update();

    assert_eq!(sec_inbox.of_kind(MessageKind::Command).len(), 1);
    assert_eq!(sec.status().duplicates, 1);
    assert!(matches!(
        reports.all().as_slice(),
        [DeliveryReport::Delivered { attempts: 2, .. }]
    ));
}

#[test]
fn test_node_from_config_file_contents() {
    let field = TestField::new();
    let config = Config::from_toml_str(
        r#"
        [node]
        node_id = "GW-042"
        node_type = "gateway"

        [mesh]
        channel = 11
        queue_depth = 4
        "#,
    )
    .unwrap();

    let node = MeshNode::from_config(&config, field.ether.radio(mac(9))).unwrap();
    assert_eq!(node.node_id(), &id("GW-042"));
    assert_eq!(node.node_type(), NodeType::Gateway);
    assert_eq!(node.settings().queue_depth, 4);
    assert_eq!(node.status().channel, 11);
}

#[test]
fn test_own_disarm_cancels_queued_alarms() {
    let field = TestField::new();
    let (mut gw, mut sec) = pair(&field);
    let gw_inbox = Inbox::attach(&mut gw);

    sec.send_security_alarm(IntrusionClass::Person, &person_snapshot())
        .unwrap();
    sec.send_tamper_alarm(&person_snapshot()).unwrap();
    assert_eq!(sec.status().queued, 2);

    sec.disarm().unwrap();
    assert_eq!(sec.status().queued, 1);
    sec.update();
    gw.update();

    assert_eq!(gw_inbox.kinds(), vec![MessageKind::Disarm]);
}

/// A retry goes to the gateway that took over, not the one that vanished
#[test]
fn test_retry_rerouted_to_new_gateway() {
    const GW_B: u8 = 3;
    const AMB: u8 = 4;
    let field = TestField::new();
    let mut amb = field.node(AMB, "AMB-01", NodeType::Ambient);
    let mut gw_a = field.node(GW, "GW-A", NodeType::Gateway);
    let mut sec = field.node(SEC, "SEC-01", NodeType::Security);
    field.link(AMB, GW, -55);
    field.link(GW, SEC, -60);
    let reports = Reports::attach(&mut amb);
    let sec_inbox = Inbox::attach(&mut sec);
    pump(&mut [&mut amb, &mut gw_a, &mut sec], 2);
    assert_eq!(amb.nearest_gateway().unwrap().node_id, id("GW-A"));

    // GW-A drops out of range, GW-B comes up next to both leaves
    let mut gw_b = field.node(GW_B, "GW-B", NodeType::Gateway);
    field.unlink(AMB, GW);
    field.link(AMB, GW_B, -30);
    field.link(GW_B, SEC, -45);

    let sequence = amb
        .send("SEC-01", MessageKind::AlarmAnimal, &[], Priority::High)
        .unwrap();
    amb.update();
    assert_eq!(amb.status().queued, 1);

    sec.send_heartbeat().unwrap();
    sec.update();
    gw_b.update();

    field.advance(100);
    amb.update();
    assert_eq!(amb.nearest_gateway().unwrap().node_id, id("GW-B"));
    gw_b.update();
    sec.update();
    gw_b.update();
    amb.update();

    assert_eq!(sec_inbox.of_kind(MessageKind::AlarmAnimal).len(), 1);
    assert_eq!(
        reports.all(),
        vec![DeliveryReport::Delivered {
            sequence,
            target: id("SEC-01"),
            kind: MessageKind::AlarmAnimal,
            attempts: 2,
        }]
    );
}
