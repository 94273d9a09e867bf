//! Status payloads published on the message bus.
//!
//! Payloads are plain typed values. [`Payload`] implements
//! [`core::fmt::Display`] as a flat JSON object so every front-end renders
//! the same text without pulling in a serializer.

use core::fmt::{self, Write};
use core::time::Duration;

use crate::journal::BridgeInstant;
use crate::protocol::{ChargingState, OperatingMode};
use crate::state::DeviceState;

/// Text of the low-battery warning.
pub const LOW_BATTERY_WARNING: &str = "low battery - disabled cleaning";

/// Full telemetry report for the verbose status topic.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusReport {
    pub cleaning: bool,
    /// Home base is the only charging source.
    pub docked: bool,
    pub charging: bool,
    pub charging_state: ChargingState,
    pub voltage: u16,
    pub current: i16,
    pub charge: i16,
    pub capacity: u16,
    pub distance: i16,
    pub distance_sum: i32,
    pub battery_level: Option<i32>,
    pub battery_temperature: i8,
    pub charging_sources: u8,
    pub mode: OperatingMode,
    pub stasis: u8,
}

impl StatusReport {
    #[must_use]
    pub fn from_state<I>(state: &DeviceState<I>) -> Self
    where
        I: BridgeInstant,
    {
        let telemetry = state.telemetry();
        Self {
            cleaning: state.cleaning(),
            docked: state.on_home_base(),
            charging: state.charging(),
            charging_state: telemetry.charging_state,
            voltage: telemetry.voltage,
            current: telemetry.current,
            charge: telemetry.charge,
            capacity: telemetry.capacity,
            distance: telemetry.distance,
            distance_sum: state.distance_total(),
            battery_level: state.battery_percent(),
            battery_temperature: telemetry.temperature,
            charging_sources: telemetry.charging_sources.0,
            mode: telemetry.mode,
            stasis: telemetry.stasis,
        }
    }
}

/// Coarse activity for home-automation consumers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActivityState {
    Returning,
    Cleaning,
    Docked,
    Idle,
}

impl ActivityState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ActivityState::Returning => "returning",
            ActivityState::Cleaning => "cleaning",
            ActivityState::Docked => "docked",
            ActivityState::Idle => "idle",
        }
    }
}

/// Report for the retained compact status topic.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CompactStatus {
    pub state: ActivityState,
    pub battery_level: Option<i32>,
}

impl CompactStatus {
    #[must_use]
    pub fn from_state<I>(state: &DeviceState<I>) -> Self
    where
        I: BridgeInstant,
    {
        let activity = if state.returning() {
            ActivityState::Returning
        } else if state.cleaning() {
            ActivityState::Cleaning
        } else if state.on_home_base() {
            ActivityState::Docked
        } else {
            ActivityState::Idle
        };
        Self {
            state: activity,
            battery_level: state.battery_percent(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LowBatteryWarning {
    pub voltage: u16,
    pub battery_level: Option<i32>,
}

/// Time since boot, rendered as `<days>T<HH>:<MM>:<SS>`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Uptime(pub Duration);

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let days = total / 86_400;
        let hours = (total / 3_600) % 24;
        let minutes = (total / 60) % 60;
        let seconds = total % 60;
        write!(f, "{days}T{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Identity and connectivity report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InfoReport<'a> {
    pub hostname: &'a str,
    /// Only included in the report sent right after connecting.
    pub mac_address: Option<&'a str>,
    pub ip_address: &'a str,
    pub rssi: i32,
    pub ssid: &'a str,
    pub build: &'a str,
    /// Omitted from the connect-time report.
    pub uptime: Option<Uptime>,
}

/// Anything the bridge publishes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Payload<'a> {
    /// Bare liveness marker such as `ONLINE`; rendered verbatim.
    Liveness(&'a str),
    Status(StatusReport),
    Compact(CompactStatus),
    LowBattery(LowBatteryWarning),
    Info(InfoReport<'a>),
}

impl fmt::Display for Payload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Liveness(text) => f.write_str(text),
            Payload::Status(report) => {
                let mut object = JsonObject::begin(f)?;
                object.boolean("cleaning", report.cleaning)?;
                object.boolean("docked", report.docked)?;
                object.boolean("charging", report.charging)?;
                object.number("chargingState", report.charging_state.to_raw())?;
                object.number("voltage", report.voltage)?;
                object.number("current", report.current)?;
                object.number("charge", report.charge)?;
                object.number("capacity", report.capacity)?;
                object.number("distance", report.distance)?;
                object.number("distanceSum", report.distance_sum)?;
                object.optional("batteryLevel", report.battery_level)?;
                object.number("batteryTemperature", report.battery_temperature)?;
                object.number("chargingSourcesAvailable", report.charging_sources)?;
                object.number("OIMode", report.mode.to_raw())?;
                object.number("stasis", report.stasis)?;
                object.end()
            }
            Payload::Compact(compact) => {
                let mut object = JsonObject::begin(f)?;
                object.string("state", compact.state.as_str())?;
                object.optional("battery_level", compact.battery_level)?;
                object.end()
            }
            Payload::LowBattery(warning) => {
                let mut object = JsonObject::begin(f)?;
                object.string("warning", LOW_BATTERY_WARNING)?;
                object.number("voltage", warning.voltage)?;
                object.optional("batteryLevel", warning.battery_level)?;
                object.end()
            }
            Payload::Info(info) => {
                let mut object = JsonObject::begin(f)?;
                if let Some(uptime) = info.uptime {
                    object.display("UPTIME", &uptime)?;
                }
                object.string("Hostname", info.hostname)?;
                if let Some(mac) = info.mac_address {
                    object.string("MACAddress", mac)?;
                }
                object.string("IPAddress", info.ip_address)?;
                object.number("RSSI", info.rssi)?;
                object.string("SSID", info.ssid)?;
                object.string("COMPILE_DATE", info.build)?;
                object.end()
            }
        }
    }
}

/// Streaming writer for a single-level JSON object.
struct JsonObject<'w, W: Write> {
    out: &'w mut W,
    first: bool,
}

impl<'w, W: Write> JsonObject<'w, W> {
    fn begin(out: &'w mut W) -> Result<Self, fmt::Error> {
        out.write_char('{')?;
        Ok(Self { out, first: true })
    }

    fn key(&mut self, key: &str) -> fmt::Result {
        if !self.first {
            self.out.write_char(',')?;
        }
        self.first = false;
        write_escaped(self.out, key)?;
        self.out.write_char(':')
    }

    fn boolean(&mut self, key: &str, value: bool) -> fmt::Result {
        self.key(key)?;
        self.out.write_str(if value { "true" } else { "false" })
    }

    fn number(&mut self, key: &str, value: impl fmt::Display) -> fmt::Result {
        self.key(key)?;
        write!(self.out, "{value}")
    }

    fn optional(&mut self, key: &str, value: Option<impl fmt::Display>) -> fmt::Result {
        match value {
            Some(value) => self.number(key, value),
            None => {
                self.key(key)?;
                self.out.write_str("null")
            }
        }
    }

    fn string(&mut self, key: &str, value: &str) -> fmt::Result {
        self.key(key)?;
        write_escaped(self.out, value)
    }

    fn display(&mut self, key: &str, value: &impl fmt::Display) -> fmt::Result {
        self.key(key)?;
        self.out.write_char('"')?;
        write!(self.out, "{value}")?;
        self.out.write_char('"')
    }

    fn end(self) -> fmt::Result {
        self.out.write_char('}')
    }
}

fn write_escaped(out: &mut impl Write, text: &str) -> fmt::Result {
    out.write_char('"')?;
    for ch in text.chars() {
        match ch {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            ch if u32::from(ch) < 0x20 => write!(out, "\\u{:04x}", u32::from(ch))?,
            ch => out.write_char(ch)?,
        }
    }
    out.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChargingSources;
    use crate::telemetry::RawTelemetrySnapshot;
    use crate::test_support::MockInstant;
    use std::string::ToString;

    fn docked_state() -> DeviceState<MockInstant> {
        let mut state = DeviceState::new();
        let snapshot = RawTelemetrySnapshot {
            distance: 5,
            charging_state: ChargingState::Trickle,
            voltage: 16_000,
            current: 120,
            temperature: 28,
            charge: 1_200,
            capacity: 3_000,
            charging_sources: ChargingSources(2),
            mode: OperatingMode::Passive,
            stasis: 0,
            ..RawTelemetrySnapshot::default()
        };
        state.reconcile(&snapshot, MockInstant(0)).unwrap();
        state
    }

    #[test]
    fn verbose_status_renders_every_field() {
        let rendered = Payload::Status(StatusReport::from_state(&docked_state())).to_string();
        assert_eq!(
            rendered,
            "{\"cleaning\":false,\"docked\":true,\"charging\":true,\"chargingState\":3,\
             \"voltage\":16000,\"current\":120,\"charge\":1200,\"capacity\":3000,\
             \"distance\":5,\"distanceSum\":5,\"batteryLevel\":40,\"batteryTemperature\":28,\
             \"chargingSourcesAvailable\":2,\"OIMode\":1,\"stasis\":0}"
        );
    }

    #[test]
    fn underflowed_charge_publishes_negative_level() {
        let mut state = DeviceState::<MockInstant>::new();
        let snapshot = RawTelemetrySnapshot {
            current: -200,
            temperature: 22,
            charge: -1_000,
            capacity: 3_000,
            ..RawTelemetrySnapshot::default()
        };
        state.reconcile(&snapshot, MockInstant(0)).unwrap();

        let compact = CompactStatus::from_state(&state);
        assert_eq!(compact.battery_level, Some(-33));
        assert_eq!(
            Payload::Compact(compact).to_string(),
            "{\"state\":\"idle\",\"battery_level\":-33}"
        );
    }

    #[test]
    fn compact_status_prioritises_returning() {
        let mut state = docked_state();
        assert_eq!(CompactStatus::from_state(&state).state, ActivityState::Docked);

        state.set_cleaning(true);
        assert_eq!(CompactStatus::from_state(&state).state, ActivityState::Cleaning);

        state.set_returning(true);
        let compact = CompactStatus::from_state(&state);
        assert_eq!(compact.state, ActivityState::Returning);
        assert_eq!(
            Payload::Compact(compact).to_string(),
            "{\"state\":\"returning\",\"battery_level\":40}"
        );

        let idle = DeviceState::<MockInstant>::new();
        let compact = CompactStatus::from_state(&idle);
        assert_eq!(compact.state, ActivityState::Idle);
        assert_eq!(
            Payload::Compact(compact).to_string(),
            "{\"state\":\"idle\",\"battery_level\":null}"
        );
    }

    #[test]
    fn uptime_uses_day_separator() {
        assert_eq!(Uptime(Duration::from_secs(90_061)).to_string(), "1T01:01:01");
        assert_eq!(Uptime(Duration::from_secs(59)).to_string(), "0T00:00:59");
    }

    #[test]
    fn info_report_escapes_strings() {
        let info = InfoReport {
            hostname: "roomba",
            mac_address: Some("AA:BB"),
            ip_address: "10.0.0.2",
            rssi: -61,
            ssid: "home \"net\"",
            build: "0.1.0",
            uptime: Some(Uptime(Duration::from_secs(61))),
        };
        assert_eq!(
            Payload::Info(info).to_string(),
            "{\"UPTIME\":\"0T00:01:01\",\"Hostname\":\"roomba\",\"MACAddress\":\"AA:BB\",\
             \"IPAddress\":\"10.0.0.2\",\"RSSI\":-61,\"SSID\":\"home \\\"net\\\"\",\
             \"COMPILE_DATE\":\"0.1.0\"}"
        );
    }

    #[test]
    fn low_battery_warning_and_liveness() {
        let warning = LowBatteryWarning {
            voltage: 10_500,
            battery_level: Some(12),
        };
        assert_eq!(
            Payload::LowBattery(warning).to_string(),
            "{\"warning\":\"low battery - disabled cleaning\",\"voltage\":10500,\"batteryLevel\":12}"
        );
        assert_eq!(Payload::Liveness("ONLINE").to_string(), "ONLINE");
    }
}
