//! Inverse of [`super::decode`], used by simulators and tests to produce the
//! byte stream a vacuum would send.

use core::fmt;

use heapless::Vec;

use super::{RawTelemetrySnapshot, field_spec};
use crate::protocol::PacketId;

/// Reasons a snapshot cannot be encoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncodeError {
    /// The requested fields do not fit in the output buffer.
    Overflow { capacity: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Overflow { capacity } => {
                write!(f, "encoded payload exceeds {capacity} bytes")
            }
        }
    }
}

fn field_bytes(snapshot: &RawTelemetrySnapshot, packet: PacketId) -> [u8; 2] {
    match packet {
        PacketId::Distance => snapshot.distance.to_be_bytes(),
        PacketId::ChargingState => [snapshot.charging_state.to_raw(), 0],
        PacketId::Voltage => snapshot.voltage.to_be_bytes(),
        PacketId::Current => snapshot.current.to_be_bytes(),
        PacketId::BatteryTemperature => [snapshot.temperature.to_be_bytes()[0], 0],
        PacketId::BatteryCharge => snapshot.charge.to_be_bytes(),
        PacketId::BatteryCapacity => snapshot.capacity.to_be_bytes(),
        PacketId::ChargingSourcesAvailable => [snapshot.charging_sources.0, 0],
        PacketId::OiMode => [snapshot.mode.to_raw(), 0],
        PacketId::LeftEncoderCounts => snapshot.left_encoder.to_be_bytes(),
        PacketId::RightEncoderCounts => snapshot.right_encoder.to_be_bytes(),
        PacketId::Stasis => [snapshot.stasis, 0],
        _ => [0, 0],
    }
}

/// Emits `fields` from `snapshot` as `(id, data)` groups in the given order.
///
/// Skipped fields are written with zeroed data so the payload stays
/// decodable.
///
/// # Errors
///
/// Returns [`EncodeError::Overflow`] when the payload exceeds `N` bytes.
pub fn encode_payload<const N: usize>(
    snapshot: &RawTelemetrySnapshot,
    fields: &[PacketId],
) -> Result<Vec<u8, N>, EncodeError> {
    let overflow = EncodeError::Overflow { capacity: N };
    let mut payload = Vec::new();

    for packet in fields {
        let width = field_spec(packet.byte()).map_or(0, |spec| spec.width);
        payload.push(packet.byte()).map_err(|_| overflow)?;

        let bytes = field_bytes(snapshot, *packet);
        for index in 0..width {
            let byte = bytes.get(index).copied().unwrap_or_default();
            payload.push(byte).map_err(|_| overflow)?;
        }
    }

    Ok(payload)
}
