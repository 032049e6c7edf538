//! Simulated field: the configured node plus one ambient and one security
//! sensor, wired leaf - gateway - leaf so that sensor-to-sensor traffic
//! has to be relayed.

use anyhow::Context;
use fieldmesh_core::{Config, NodeType};
use fieldmesh_mesh::{
    BatteryStatus, CommandCode, DeliveryReport, IntrusionClass, MeshNode, MeshStatus, Payload,
    SensorDataAmbient, SensorDataSecurity,
};
use fieldmesh_radio::{Ether, MacAddress, SimRadio};
use rand::Rng;
use std::time::Duration;

const HOME: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
const AMBIENT: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);
const SECURITY: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x03]);

const AMBIENT_ID: &str = "AMB-SIM";
const SECURITY_ID: &str = "SEC-SIM";

const TELEMETRY_EVERY: Duration = Duration::from_secs(2);
const PATROL_EVERY: Duration = Duration::from_secs(5);
const COMMAND_EVERY: Duration = Duration::from_secs(7);
const BATTERY_EVERY: Duration = Duration::from_secs(11);

pub struct Field {
    home: MeshNode<SimRadio>,
    ambient: MeshNode<SimRadio>,
    security: MeshNode<SimRadio>,
    next_telemetry: Duration,
    next_patrol: Duration,
    next_command: Duration,
    next_battery: Duration,
}

impl Field {
    pub fn build(config: &Config) -> anyhow::Result<Self> {
        let ether = Ether::new();
        let mesh = &config.mesh;

        let mut home = MeshNode::from_config(config, ether.radio(HOME))
            .context("starting configured node")?;
        let mut ambient = MeshNode::begin(AMBIENT_ID, NodeType::Ambient, mesh.channel, ether.radio(AMBIENT))
            .context("starting ambient sensor")?;
        let mut security =
            MeshNode::begin(SECURITY_ID, NodeType::Security, mesh.channel, ether.radio(SECURITY))
                .context("starting security sensor")?;

        if !config.node.node_type.is_gateway() {
            tracing::warn!(
                node_type = %config.node.node_type,
                "Configured node does not relay; sensors will not reach each other"
            );
        }

        ether.connect(HOME, AMBIENT, -52);
        ether.connect(HOME, SECURITY, -67);

        home.on_message(|message, source| match message.decode_payload() {
            Ok(payload) => uplink(message.sender().as_str(), &payload, source),
            Err(err) => tracing::warn!(sender = %message.sender(), error = %err, "Undecodable payload"),
        });
        home.on_delivery_report(log_report);

        security.on_message(|message, _| {
            if let Ok(Payload::Command(code)) = message.decode_payload() {
                tracing::info!(node_id = SECURITY_ID, ?code, "Executing command");
            }
        });
        security.on_delivery_report(log_report);
        ambient.on_delivery_report(log_report);

        Ok(Self {
            home,
            ambient,
            security,
            next_telemetry: TELEMETRY_EVERY,
            next_patrol: PATROL_EVERY,
            next_command: COMMAND_EVERY,
            next_battery: BATTERY_EVERY,
        })
    }

    /// One control-loop iteration for every node, plus scripted traffic
    pub fn tick(&mut self, elapsed: Duration) {
        let mut rng = rand::thread_rng();

        if elapsed >= self.next_telemetry {
            self.next_telemetry += TELEMETRY_EVERY;
            let reading = SensorDataAmbient {
                temperature: rng.gen_range(12.0..28.0),
                humidity: rng.gen_range(35.0..90.0),
                pressure: rng.gen_range(1005.0..1025.0),
                light_lux: rng.gen_range(0..60_000),
                soil_moisture: rng.gen_range(900..3_500),
                soil_percent: rng.gen_range(10..80),
            };
            if let Err(err) = self.ambient.send_sensor_data(&reading) {
                tracing::warn!(node_id = AMBIENT_ID, error = %err, "Telemetry not sent");
            }
        }

        if elapsed >= self.next_patrol {
            self.next_patrol += PATROL_EVERY;
            let class = match rng.gen_range(0..10) {
                0 => IntrusionClass::Person,
                1..=2 => IntrusionClass::AnimalLarge,
                3..=5 => IntrusionClass::AnimalSmall,
                _ => IntrusionClass::None,
            };
            let snapshot = SensorDataSecurity {
                pir_main: class != IntrusionClass::None,
                pir_backup: class == IntrusionClass::Person,
                motion_detected: class != IntrusionClass::None,
                classification: class,
                distance_cm: rng.gen_range(50.0..800.0),
                accel_x: 0.0,
                accel_y: 0.0,
                accel_z: 1.0,
                tamper_detected: false,
            };
            if let Err(err) = self.security.send_security_alarm(class, &snapshot) {
                tracing::warn!(node_id = SECURITY_ID, error = %err, "Alarm not sent");
            }
        }

        if elapsed >= self.next_command {
            self.next_command += COMMAND_EVERY;
            if let Err(err) = self.home.send_command(SECURITY_ID, CommandCode::TestLight) {
                tracing::warn!(error = %err, "Command not sent");
            }
        }

        if elapsed >= self.next_battery {
            self.next_battery += BATTERY_EVERY;
            let status = BatteryStatus {
                voltage_mv: rng.gen_range(3_500..4_200),
                percentage: rng.gen_range(40..100),
                charging: rng.gen_bool(0.5),
                solar_mv: rng.gen_range(0..6_000),
                current_ma: rng.gen_range(-120..250),
            };
            if let Err(err) = self.security.send_battery_status(&status) {
                tracing::warn!(node_id = SECURITY_ID, error = %err, "Battery status not sent");
            }
        }

        self.home.update();
        self.ambient.update();
        self.security.update();
    }

    pub fn statuses(&self) -> Vec<MeshStatus> {
        vec![
            self.home.status(),
            self.ambient.status(),
            self.security.status(),
        ]
    }
}

/// Stand-in for the cellular bridge: republish as a JSON log line
fn uplink(sender: &str, payload: &Payload, source: MacAddress) {
    match serde_json::to_string(payload) {
        Ok(json) => tracing::info!(sender, via = %source, payload = %json, "Uplink"),
        Err(err) => tracing::warn!(sender, error = %err, "Uplink serialization failed"),
    }
}

fn log_report(report: &DeliveryReport) {
    match report {
        DeliveryReport::Delivered {
            sequence,
            target,
            attempts,
            ..
        } => tracing::info!(sequence, target = %target, attempts, "Delivered"),
        DeliveryReport::Failed {
            sequence,
            target,
            reason,
            ..
        } => tracing::warn!(sequence, target = %target, ?reason, "Delivery failed"),
    }
}
