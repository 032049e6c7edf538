//! Typed payloads
//!
//! Each message kind has a packed little-endian payload layout shared
//! with the sensor firmware. Decoding checks the exact length before
//! reading any field and returns a tagged [`Payload`].

use crate::codec::MessageKind;
use crate::error::{MeshError, MeshResult};
use fieldmesh_core::NodeType;
use serde::{Deserialize, Serialize};

/// Self-reported node health in a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum HealthStatus {
    /// Operating normally
    Ok = 0,
    /// Degraded
    Warning = 1,
    /// Faulted
    Error = 2,
}

impl From<u8> for HealthStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => HealthStatus::Ok,
            1 => HealthStatus::Warning,
            _ => HealthStatus::Error,
        }
    }
}

/// Heartbeat payload (11 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Role of the sender; peers infer gateway status from it
    pub node_type: NodeType,
    /// Self-reported health
    pub status: HealthStatus,
    /// Seconds since boot
    pub uptime_sec: u32,
    /// Free heap (KiB)
    pub free_heap_kb: u16,
    /// Signal strength the sender sees (dBm)
    pub rssi: i8,
    /// Battery charge (%)
    pub battery_pct: u8,
    /// Number of mesh neighbors
    pub mesh_neighbors: u8,
}

impl Heartbeat {
    /// Encoded size
    pub const SIZE: usize = 11;
}

/// Climate and soil readings (17 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorDataAmbient {
    /// Air temperature (°C)
    pub temperature: f32,
    /// Relative humidity (%)
    pub humidity: f32,
    /// Barometric pressure (hPa)
    pub pressure: f32,
    /// Illuminance (lux)
    pub light_lux: u16,
    /// Raw soil moisture ADC reading (0-4095)
    pub soil_moisture: u16,
    /// Soil moisture (%)
    pub soil_percent: u8,
}

impl SensorDataAmbient {
    /// Encoded size
    pub const SIZE: usize = 17;
}

/// Outcome of the person/animal discrimination heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IntrusionClass {
    /// No movement
    None = 0,
    /// Person, critical alarm
    Person = 1,
    /// Large animal, warning
    AnimalLarge = 2,
    /// Small animal, ignored
    AnimalSmall = 3,
    /// Could not classify
    Unknown = 4,
}

impl From<u8> for IntrusionClass {
    fn from(value: u8) -> Self {
        match value {
            0 => IntrusionClass::None,
            1 => IntrusionClass::Person,
            2 => IntrusionClass::AnimalLarge,
            3 => IntrusionClass::AnimalSmall,
            _ => IntrusionClass::Unknown,
        }
    }
}

/// Perimeter sensor snapshot attached to alarms (21 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorDataSecurity {
    /// Main PIR triggered
    pub pir_main: bool,
    /// Backup PIR triggered
    pub pir_backup: bool,
    /// Motion confirmed by both sensors
    pub motion_detected: bool,
    /// Classification of the intrusion
    pub classification: IntrusionClass,
    /// Estimated distance (cm)
    pub distance_cm: f32,
    /// Acceleration X (g)
    pub accel_x: f32,
    /// Acceleration Y (g)
    pub accel_y: f32,
    /// Acceleration Z (g)
    pub accel_z: f32,
    /// Enclosure tamper detected
    pub tamper_detected: bool,
}

impl SensorDataSecurity {
    /// Encoded size
    pub const SIZE: usize = 21;
}

/// Power subsystem report (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Battery voltage (mV)
    pub voltage_mv: u16,
    /// Charge (%)
    pub percentage: u8,
    /// Currently charging
    pub charging: bool,
    /// Solar panel voltage (mV)
    pub solar_mv: u16,
    /// Current (mA), positive while charging
    pub current_ma: i16,
}

impl BatteryStatus {
    /// Encoded size
    pub const SIZE: usize = 8;
}

/// Command codes understood by security nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCode {
    /// Pulse the siren
    TestSiren,
    /// Pulse the flood light
    TestLight,
    /// Silence an active alarm
    StopAlarm,
    /// Code not known to this firmware
    Other(u8),
}

impl CommandCode {
    /// Wire value
    pub fn as_u8(self) -> u8 {
        match self {
            CommandCode::TestSiren => 0x01,
            CommandCode::TestLight => 0x02,
            CommandCode::StopAlarm => 0x03,
            CommandCode::Other(code) => code,
        }
    }
}

impl From<u8> for CommandCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => CommandCode::TestSiren,
            0x02 => CommandCode::TestLight,
            0x03 => CommandCode::StopAlarm,
            other => CommandCode::Other(other),
        }
    }
}

/// Decoded payload, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Liveness beacon
    Heartbeat(Heartbeat),
    /// Climate/soil telemetry
    Ambient(SensorDataAmbient),
    /// Perimeter snapshot (alarms, or routine security telemetry)
    Security(SensorDataSecurity),
    /// Power report
    Battery(BatteryStatus),
    /// Gateway command
    Command(CommandCode),
    /// Acknowledgment of the given sequence number
    Ack {
        /// Sequence number being acknowledged
        sequence: u16,
    },
    /// Kinds without a payload (arm, disarm)
    Empty,
    /// Opaque payload (config, firmware update, topology)
    Raw(Vec<u8>),
}

impl Payload {
    /// Decode `bytes` according to `kind`
    pub fn decode(kind: MessageKind, bytes: &[u8]) -> MeshResult<Payload> {
        let payload = match kind {
            MessageKind::Heartbeat => {
                let mut r = Reader::exact(kind, bytes, Heartbeat::SIZE)?;
                let raw_type = r.u8();
                let node_type = NodeType::try_from(raw_type).map_err(|_| MeshError::PayloadField {
                    kind,
                    field: "node_type",
                    value: raw_type,
                })?;
                Payload::Heartbeat(Heartbeat {
                    node_type,
                    status: HealthStatus::from(r.u8()),
                    uptime_sec: r.u32(),
                    free_heap_kb: r.u16(),
                    rssi: r.i8(),
                    battery_pct: r.u8(),
                    mesh_neighbors: r.u8(),
                })
            }
            // Security nodes report non-alarm detections as sensor data too.
            MessageKind::SensorData if bytes.len() == SensorDataSecurity::SIZE => {
                Payload::Security(decode_security(kind, bytes)?)
            }
            MessageKind::SensorData => {
                let mut r = Reader::exact(kind, bytes, SensorDataAmbient::SIZE)?;
                Payload::Ambient(SensorDataAmbient {
                    temperature: r.f32(),
                    humidity: r.f32(),
                    pressure: r.f32(),
                    light_lux: r.u16(),
                    soil_moisture: r.u16(),
                    soil_percent: r.u8(),
                })
            }
            MessageKind::AlarmPerson | MessageKind::AlarmAnimal | MessageKind::AlarmTamper => {
                Payload::Security(decode_security(kind, bytes)?)
            }
            MessageKind::BatteryStatus => {
                let mut r = Reader::exact(kind, bytes, BatteryStatus::SIZE)?;
                Payload::Battery(BatteryStatus {
                    voltage_mv: r.u16(),
                    percentage: r.u8(),
                    charging: r.u8() != 0,
                    solar_mv: r.u16(),
                    current_ma: r.i16(),
                })
            }
            MessageKind::Command => match bytes.first() {
                Some(code) => Payload::Command(CommandCode::from(*code)),
                None => {
                    return Err(MeshError::PayloadLayout {
                        kind,
                        expected: 1,
                        actual: 0,
                    })
                }
            },
            MessageKind::Ack => {
                let mut r = Reader::exact(kind, bytes, 2)?;
                Payload::Ack { sequence: r.u16() }
            }
            MessageKind::Arm | MessageKind::Disarm => Payload::Empty,
            MessageKind::Config | MessageKind::FirmwareUpdate | MessageKind::Topology => {
                Payload::Raw(bytes.to_vec())
            }
        };
        Ok(payload)
    }

    /// Encode to the wire layout
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Vec::new();
        match self {
            Payload::Heartbeat(hb) => {
                w.push(hb.node_type.as_u8());
                w.push(hb.status as u8);
                w.extend_from_slice(&hb.uptime_sec.to_le_bytes());
                w.extend_from_slice(&hb.free_heap_kb.to_le_bytes());
                w.extend_from_slice(&hb.rssi.to_le_bytes());
                w.push(hb.battery_pct);
                w.push(hb.mesh_neighbors);
            }
            Payload::Ambient(data) => {
                w.extend_from_slice(&data.temperature.to_le_bytes());
                w.extend_from_slice(&data.humidity.to_le_bytes());
                w.extend_from_slice(&data.pressure.to_le_bytes());
                w.extend_from_slice(&data.light_lux.to_le_bytes());
                w.extend_from_slice(&data.soil_moisture.to_le_bytes());
                w.push(data.soil_percent);
            }
            Payload::Security(data) => {
                w.push(u8::from(data.pir_main));
                w.push(u8::from(data.pir_backup));
                w.push(u8::from(data.motion_detected));
                w.push(data.classification as u8);
                w.extend_from_slice(&data.distance_cm.to_le_bytes());
                w.extend_from_slice(&data.accel_x.to_le_bytes());
                w.extend_from_slice(&data.accel_y.to_le_bytes());
                w.extend_from_slice(&data.accel_z.to_le_bytes());
                w.push(u8::from(data.tamper_detected));
            }
            Payload::Battery(status) => {
                w.extend_from_slice(&status.voltage_mv.to_le_bytes());
                w.push(status.percentage);
                w.push(u8::from(status.charging));
                w.extend_from_slice(&status.solar_mv.to_le_bytes());
                w.extend_from_slice(&status.current_ma.to_le_bytes());
            }
            Payload::Command(code) => w.push(code.as_u8()),
            Payload::Ack { sequence } => w.extend_from_slice(&sequence.to_le_bytes()),
            Payload::Empty => {}
            Payload::Raw(bytes) => w.extend_from_slice(bytes),
        }
        w
    }
}

fn decode_security(kind: MessageKind, bytes: &[u8]) -> MeshResult<SensorDataSecurity> {
    let mut r = Reader::exact(kind, bytes, SensorDataSecurity::SIZE)?;
    Ok(SensorDataSecurity {
        pir_main: r.u8() != 0,
        pir_backup: r.u8() != 0,
        motion_detected: r.u8() != 0,
        classification: IntrusionClass::from(r.u8()),
        distance_cm: r.f32(),
        accel_x: r.f32(),
        accel_y: r.f32(),
        accel_z: r.f32(),
        tamper_detected: r.u8() != 0,
    })
}

/// Little-endian reader over a slice whose length was checked up front
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn exact(kind: MessageKind, bytes: &'a [u8], expected: usize) -> MeshResult<Self> {
        if bytes.len() != expected {
            return Err(MeshError::PayloadLayout {
                kind,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}
