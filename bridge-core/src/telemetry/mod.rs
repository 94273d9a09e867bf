//! Sensor-stream telemetry decoding.
//!
//! The vacuum reports sensor values as a flat sequence of `(packet id, data)`
//! groups. Every id the bridge may encounter is listed in [`FIELD_TABLE`]
//! together with its data width, signedness, and whether the value is kept.
//! [`decode`] walks a payload against that table and yields a fresh
//! [`RawTelemetrySnapshot`]; it never touches any long-lived state, so a
//! malformed payload cannot corrupt what the bridge already knows.

use core::fmt;

use crate::protocol::{ChargingSources, ChargingState, OperatingMode, PacketId};

pub mod encode;
pub mod frame;

pub use encode::{EncodeError, encode_payload};
pub use frame::{FrameError, MAX_FRAME_PAYLOAD, STREAM_HEADER, StreamFramer, encode_frame};

/// Whether a field's data bytes are interpreted as two's complement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signedness {
    Signed,
    Unsigned,
    /// Opaque data that is consumed but never interpreted.
    Opaque,
}

/// What the decoder does with a field once its bytes are consumed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeRule {
    Store,
    Skip,
}

/// Static description of one packet id inside a stream payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    pub packet: PacketId,
    pub name: &'static str,
    /// Number of data bytes following the id byte.
    pub width: usize,
    pub signedness: Signedness,
    pub rule: DecodeRule,
}

impl FieldSpec {
    pub const fn new(
        packet: PacketId,
        name: &'static str,
        width: usize,
        signedness: Signedness,
        rule: DecodeRule,
    ) -> Self {
        Self {
            packet,
            name,
            width,
            signedness,
            rule,
        }
    }
}

/// Every packet id the decoder understands.
pub const FIELD_TABLE: [FieldSpec; 17] = [
    FieldSpec::new(
        PacketId::Sensors7To26,
        "sensors 7-26",
        26,
        Signedness::Opaque,
        DecodeRule::Skip,
    ),
    FieldSpec::new(
        PacketId::Sensors7To16,
        "sensors 7-16",
        10,
        Signedness::Opaque,
        DecodeRule::Skip,
    ),
    FieldSpec::new(
        PacketId::BumpsAndWheelDrops,
        "bumps and wheel drops",
        1,
        Signedness::Unsigned,
        DecodeRule::Skip,
    ),
    FieldSpec::new(
        PacketId::VirtualWall,
        "virtual wall",
        1,
        Signedness::Unsigned,
        DecodeRule::Skip,
    ),
    FieldSpec::new(
        PacketId::Distance,
        "distance",
        2,
        Signedness::Signed,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::ChargingState,
        "charging state",
        1,
        Signedness::Unsigned,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::Voltage,
        "voltage",
        2,
        Signedness::Unsigned,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::Current,
        "current",
        2,
        Signedness::Signed,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::BatteryTemperature,
        "battery temperature",
        1,
        Signedness::Signed,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::BatteryCharge,
        "battery charge",
        2,
        Signedness::Signed,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::BatteryCapacity,
        "battery capacity",
        2,
        Signedness::Unsigned,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::ChargingSourcesAvailable,
        "charging sources available",
        1,
        Signedness::Unsigned,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::OiMode,
        "oi mode",
        1,
        Signedness::Unsigned,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::LeftEncoderCounts,
        "left encoder counts",
        2,
        Signedness::Signed,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::RightEncoderCounts,
        "right encoder counts",
        2,
        Signedness::Signed,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::Stasis,
        "stasis",
        1,
        Signedness::Unsigned,
        DecodeRule::Store,
    ),
    FieldSpec::new(
        PacketId::Unknown128,
        "unknown marker",
        1,
        Signedness::Opaque,
        DecodeRule::Skip,
    ),
];

/// Looks up the table entry for a raw packet id.
#[must_use]
pub fn field_spec(id: u8) -> Option<&'static FieldSpec> {
    let packet = PacketId::from_byte(id)?;
    FIELD_TABLE.iter().find(|spec| spec.packet == packet)
}

/// Bit set recording which stored fields a payload actually carried.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMask(u16);

impl FieldMask {
    pub const EMPTY: Self = Self(0);

    const fn bit(packet: PacketId) -> u16 {
        match packet {
            PacketId::Distance => 1 << 0,
            PacketId::ChargingState => 1 << 1,
            PacketId::Voltage => 1 << 2,
            PacketId::Current => 1 << 3,
            PacketId::BatteryTemperature => 1 << 4,
            PacketId::BatteryCharge => 1 << 5,
            PacketId::BatteryCapacity => 1 << 6,
            PacketId::ChargingSourcesAvailable => 1 << 7,
            PacketId::OiMode => 1 << 8,
            PacketId::LeftEncoderCounts => 1 << 9,
            PacketId::RightEncoderCounts => 1 << 10,
            PacketId::Stasis => 1 << 11,
            _ => 0,
        }
    }

    pub fn insert(&mut self, packet: PacketId) {
        self.0 |= Self::bit(packet);
    }

    #[must_use]
    pub const fn contains(self, packet: PacketId) -> bool {
        let bit = Self::bit(packet);
        bit != 0 && self.0 & bit == bit
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }
}

/// Typed view of one decoded stream payload.
///
/// Fields the payload did not carry stay at zero; [`RawTelemetrySnapshot::present`]
/// distinguishes "reported zero" from "absent".
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RawTelemetrySnapshot {
    /// Millimetres travelled since the previous report.
    pub distance: i16,
    pub charging_state: ChargingState,
    /// Battery voltage in millivolts.
    pub voltage: u16,
    /// Battery current in milliamps; negative while discharging.
    pub current: i16,
    /// Battery temperature in degrees Celsius.
    pub temperature: i8,
    /// Remaining charge in milliamp-hours. The vacuum documents this as
    /// unsigned but the bridge keeps it signed.
    pub charge: i16,
    /// Estimated capacity in milliamp-hours.
    pub capacity: u16,
    pub charging_sources: ChargingSources,
    pub mode: OperatingMode,
    pub left_encoder: i16,
    pub right_encoder: i16,
    pub stasis: u8,
    pub present: FieldMask,
}

impl RawTelemetrySnapshot {
    /// Snapshot with every field zeroed and nothing marked present.
    pub const EMPTY: Self = Self {
        distance: 0,
        charging_state: ChargingState::NotCharging,
        voltage: 0,
        current: 0,
        temperature: 0,
        charge: 0,
        capacity: 0,
        charging_sources: ChargingSources(0),
        mode: OperatingMode::Off,
        left_encoder: 0,
        right_encoder: 0,
        stasis: 0,
        present: FieldMask::EMPTY,
    };

    fn store(&mut self, packet: PacketId, data: &[u8]) {
        let byte = data.first().copied().unwrap_or_default();
        let pair = match data {
            [high, low, ..] => [*high, *low],
            _ => [0, byte],
        };
        let unsigned = u16::from_be_bytes(pair);
        let signed = i16::from_be_bytes(pair);
        match packet {
            PacketId::Distance => self.distance = signed,
            PacketId::ChargingState => self.charging_state = ChargingState::from_raw(byte),
            PacketId::Voltage => self.voltage = unsigned,
            PacketId::Current => self.current = signed,
            PacketId::BatteryTemperature => self.temperature = i8::from_be_bytes([byte]),
            PacketId::BatteryCharge => self.charge = signed,
            PacketId::BatteryCapacity => self.capacity = unsigned,
            PacketId::ChargingSourcesAvailable => self.charging_sources = ChargingSources(byte),
            PacketId::OiMode => self.mode = OperatingMode::from_raw(byte),
            PacketId::LeftEncoderCounts => self.left_encoder = signed,
            PacketId::RightEncoderCounts => self.right_encoder = signed,
            PacketId::Stasis => self.stasis = byte,
            _ => return,
        }
        self.present.insert(packet);
    }
}

/// Reasons a stream payload is discarded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The payload named a packet id with no table entry.
    UnknownPacket { id: u8, offset: usize },
    /// A field's declared width runs past the end of the payload.
    Truncated {
        id: u8,
        offset: usize,
        needed: usize,
        available: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownPacket { id, offset } => {
                write!(f, "unknown packet id {id} at offset {offset}")
            }
            DecodeError::Truncated {
                id,
                offset,
                needed,
                available,
            } => write!(
                f,
                "packet {id} at offset {offset} needs {needed} bytes, {available} left"
            ),
        }
    }
}

/// Decodes one stream payload.
///
/// Returns `Ok(None)` for an empty buffer ("nothing received this cycle").
///
/// # Errors
///
/// Returns [`DecodeError::UnknownPacket`] when an id is missing from
/// [`FIELD_TABLE`] and [`DecodeError::Truncated`] when a field's data would
/// extend past the end of `payload`.
pub fn decode(payload: &[u8]) -> Result<Option<RawTelemetrySnapshot>, DecodeError> {
    if payload.is_empty() {
        return Ok(None);
    }

    let mut snapshot = RawTelemetrySnapshot::default();
    let mut offset = 0;
    while offset < payload.len() {
        let id = payload[offset];
        let spec = field_spec(id).ok_or(DecodeError::UnknownPacket { id, offset })?;

        let start = offset + 1;
        let available = payload.len() - start;
        if spec.width > available {
            return Err(DecodeError::Truncated {
                id,
                offset,
                needed: spec.width,
                available,
            });
        }

        let data = &payload[start..start + spec.width];
        if spec.rule == DecodeRule::Store {
            snapshot.store(spec.packet, data);
        }
        offset = start + spec.width;
    }

    Ok(Some(snapshot))
}
