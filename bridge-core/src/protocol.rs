//! Open Interface (OI) vocabulary shared by the decoder, wake controller, and
//! dispatcher.
//!
//! Opcodes are single bytes written verbatim to the vacuum's serial port. The
//! packet identifiers describe the sensor fields the bridge subscribes to over
//! the streaming telemetry interface.

use core::fmt;

/// Single-byte commands understood by the vacuum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    Reset,
    Start,
    Baud,
    /// Legacy "control" opcode; the vacuum treats it as a drop to passive mode.
    Passive,
    Safe,
    Full,
    Power,
    Spot,
    Clean,
    Max,
    Song,
    Play,
    Sensors,
    Dock,
    Stream,
    PauseResumeStream,
    Stop,
}

impl Opcode {
    /// Returns the wire value for the opcode.
    #[must_use]
    pub const fn byte(self) -> u8 {
        match self {
            Opcode::Reset => 7,
            Opcode::Start => 128,
            Opcode::Baud => 129,
            Opcode::Passive => 130,
            Opcode::Safe => 131,
            Opcode::Full => 132,
            Opcode::Power => 133,
            Opcode::Spot => 134,
            Opcode::Clean => 135,
            Opcode::Max => 136,
            Opcode::Song => 140,
            Opcode::Play => 141,
            Opcode::Sensors => 142,
            Opcode::Dock => 143,
            Opcode::Stream => 148,
            Opcode::PauseResumeStream => 150,
            Opcode::Stop => 173,
        }
    }

    /// Maps a wire value back to a known opcode.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            7 => Some(Opcode::Reset),
            128 => Some(Opcode::Start),
            129 => Some(Opcode::Baud),
            130 => Some(Opcode::Passive),
            131 => Some(Opcode::Safe),
            132 => Some(Opcode::Full),
            133 => Some(Opcode::Power),
            134 => Some(Opcode::Spot),
            135 => Some(Opcode::Clean),
            136 => Some(Opcode::Max),
            140 => Some(Opcode::Song),
            141 => Some(Opcode::Play),
            142 => Some(Opcode::Sensors),
            143 => Some(Opcode::Dock),
            148 => Some(Opcode::Stream),
            150 => Some(Opcode::PauseResumeStream),
            173 => Some(Opcode::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Opcode::Reset => "reset",
            Opcode::Start => "start",
            Opcode::Baud => "baud",
            Opcode::Passive => "passive",
            Opcode::Safe => "safe",
            Opcode::Full => "full",
            Opcode::Power => "power",
            Opcode::Spot => "spot",
            Opcode::Clean => "clean",
            Opcode::Max => "max",
            Opcode::Song => "song",
            Opcode::Play => "play",
            Opcode::Sensors => "sensors",
            Opcode::Dock => "dock",
            Opcode::Stream => "stream",
            Opcode::PauseResumeStream => "pause-resume-stream",
            Opcode::Stop => "stop",
        };
        write!(f, "{label}({})", self.byte())
    }
}

/// Sensor packet identifiers recognised inside a telemetry stream frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacketId {
    /// Legacy bulk group covering sensors 7 through 26.
    Sensors7To26,
    /// Legacy bulk group covering sensors 7 through 16.
    Sensors7To16,
    BumpsAndWheelDrops,
    VirtualWall,
    Distance,
    ChargingState,
    Voltage,
    Current,
    BatteryTemperature,
    BatteryCharge,
    BatteryCapacity,
    ChargingSourcesAvailable,
    OiMode,
    LeftEncoderCounts,
    RightEncoderCounts,
    Stasis,
    /// Undocumented marker observed in streams; carries one byte.
    Unknown128,
}

impl PacketId {
    #[must_use]
    pub const fn byte(self) -> u8 {
        match self {
            PacketId::Sensors7To26 => 0,
            PacketId::Sensors7To16 => 1,
            PacketId::BumpsAndWheelDrops => 7,
            PacketId::VirtualWall => 13,
            PacketId::Distance => 19,
            PacketId::ChargingState => 21,
            PacketId::Voltage => 22,
            PacketId::Current => 23,
            PacketId::BatteryTemperature => 24,
            PacketId::BatteryCharge => 25,
            PacketId::BatteryCapacity => 26,
            PacketId::ChargingSourcesAvailable => 34,
            PacketId::OiMode => 35,
            PacketId::LeftEncoderCounts => 43,
            PacketId::RightEncoderCounts => 44,
            PacketId::Stasis => 58,
            PacketId::Unknown128 => 128,
        }
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PacketId::Sensors7To26),
            1 => Some(PacketId::Sensors7To16),
            7 => Some(PacketId::BumpsAndWheelDrops),
            13 => Some(PacketId::VirtualWall),
            19 => Some(PacketId::Distance),
            21 => Some(PacketId::ChargingState),
            22 => Some(PacketId::Voltage),
            23 => Some(PacketId::Current),
            24 => Some(PacketId::BatteryTemperature),
            25 => Some(PacketId::BatteryCharge),
            26 => Some(PacketId::BatteryCapacity),
            34 => Some(PacketId::ChargingSourcesAvailable),
            35 => Some(PacketId::OiMode),
            43 => Some(PacketId::LeftEncoderCounts),
            44 => Some(PacketId::RightEncoderCounts),
            58 => Some(PacketId::Stasis),
            128 => Some(PacketId::Unknown128),
            _ => None,
        }
    }
}

/// Fields requested when subscribing to the sensor stream, in request order.
pub const STREAM_FIELDS: [PacketId; 12] = [
    PacketId::Distance,
    PacketId::ChargingState,
    PacketId::Voltage,
    PacketId::Current,
    PacketId::BatteryTemperature,
    PacketId::BatteryCharge,
    PacketId::BatteryCapacity,
    PacketId::ChargingSourcesAvailable,
    PacketId::OiMode,
    PacketId::LeftEncoderCounts,
    PacketId::RightEncoderCounts,
    PacketId::Stasis,
];

/// Number of ids in [`STREAM_FIELDS`] as sent on the wire.
pub const STREAM_FIELD_COUNT: u8 = 12;

/// Longest stream control message: opcode, count, and one byte per field.
pub const STREAM_REQUEST_LEN: usize = STREAM_FIELDS.len() + 2;

/// Builds the `148 n ids…` subscription message for [`STREAM_FIELDS`].
#[must_use]
pub fn stream_request() -> heapless::Vec<u8, STREAM_REQUEST_LEN> {
    let mut message = heapless::Vec::new();
    // Capacity is sized for the fixed field list, so these pushes cannot fail.
    let _ = message.push(Opcode::Stream.byte());
    let _ = message.push(STREAM_FIELD_COUNT);
    for field in STREAM_FIELDS {
        let _ = message.push(field.byte());
    }
    message
}

/// Clears any active stream subscription.
pub const STREAM_RESET: [u8; 2] = [Opcode::Stream.byte(), 0];
/// Pauses an active stream without forgetting the subscription.
pub const STREAM_PAUSE: [u8; 2] = [Opcode::PauseResumeStream.byte(), 0];
/// Resumes a paused stream.
pub const STREAM_RESUME: [u8; 2] = [Opcode::PauseResumeStream.byte(), 1];

/// OI command-acceptance level reported in packet 35.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OperatingMode {
    #[default]
    Off,
    Passive,
    Safe,
    Full,
    /// A byte outside the documented range, kept so re-encoding is lossless.
    Unknown(u8),
}

impl OperatingMode {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => OperatingMode::Off,
            1 => OperatingMode::Passive,
            2 => OperatingMode::Safe,
            3 => OperatingMode::Full,
            other => OperatingMode::Unknown(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            OperatingMode::Off => 0,
            OperatingMode::Passive => 1,
            OperatingMode::Safe => 2,
            OperatingMode::Full => 3,
            OperatingMode::Unknown(raw) => raw,
        }
    }
}

/// Charger state machine reported in packet 21.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChargingState {
    #[default]
    NotCharging,
    Reconditioning,
    Full,
    Trickle,
    Waiting,
    Fault,
    Unknown(u8),
}

impl ChargingState {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ChargingState::NotCharging,
            1 => ChargingState::Reconditioning,
            2 => ChargingState::Full,
            3 => ChargingState::Trickle,
            4 => ChargingState::Waiting,
            5 => ChargingState::Fault,
            other => ChargingState::Unknown(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ChargingState::NotCharging => 0,
            ChargingState::Reconditioning => 1,
            ChargingState::Full => 2,
            ChargingState::Trickle => 3,
            ChargingState::Waiting => 4,
            ChargingState::Fault => 5,
            ChargingState::Unknown(raw) => raw,
        }
    }

    /// Returns `true` while current is flowing into the battery.
    #[must_use]
    pub const fn is_charging(self) -> bool {
        matches!(
            self,
            ChargingState::Reconditioning | ChargingState::Full | ChargingState::Trickle
        )
    }
}

/// Bitfield from packet 34.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChargingSources(pub u8);

impl ChargingSources {
    pub const INTERNAL_CHARGER: u8 = 0b01;
    pub const HOME_BASE: u8 = 0b10;

    /// Returns `true` when the home base is the only available source.
    #[must_use]
    pub const fn on_home_base(self) -> bool {
        self.0 == Self::HOME_BASE
    }

    #[must_use]
    pub const fn internal_charger(self) -> bool {
        self.0 & Self::INTERNAL_CHARGER != 0
    }
}

/// Serial rates the local UART can be switched to from the debug console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BaudRate {
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    #[must_use]
    pub const fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B57600 => 57_600,
            BaudRate::B115200 => 115_200,
        }
    }
}
