//! Bridge configuration.
//!
//! Everything here has a compile-time default so the firmware can build a
//! [`BridgeConfig`] in a `const` context; host tools override individual
//! values through the `with_*` builders.

use core::time::Duration;

use crate::protocol::BaudRate;

/// Topic names used on the message bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Topics<'a> {
    pub command: &'a str,
    pub status: &'a str,
    pub compact_status: &'a str,
    pub info: &'a str,
    pub liveness: &'a str,
}

impl Topics<'static> {
    pub const DEFAULT: Self = Self {
        command: "vacuum/command",
        status: "vacuum/STATUS",
        compact_status: "vacuum/STATUSHA",
        info: "vacuum/INFO",
        liveness: "vacuum/LWT",
    };
}

/// Payloads published on the liveness topic.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Liveness<'a> {
    pub online: &'a str,
    /// Registered as the bus last-will.
    pub offline: &'a str,
}

impl Liveness<'static> {
    pub const DEFAULT: Self = Self {
        online: "ONLINE",
        offline: "OFFLINE",
    };
}

/// Periods of the bridge loop's timers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Intervals {
    pub reconnect: Duration,
    pub wake: Duration,
    pub status: Duration,
    pub info: Duration,
    /// Age after which telemetry is considered stale.
    pub stale_after: Duration,
}

impl Intervals {
    pub const DEFAULT: Self = Self {
        reconnect: Duration::from_secs(30),
        wake: Duration::from_secs(50),
        status: Duration::from_secs(10),
        info: Duration::from_secs(60),
        stale_after: Duration::from_secs(30),
    };
}

/// Battery levels that trigger the low-battery shutdown.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LowBatteryThresholds {
    /// Voltages strictly between zero and this value count as low (mV).
    pub voltage_mv: u16,
    /// Battery percentages strictly below this value count as low.
    pub percent: u8,
}

impl LowBatteryThresholds {
    pub const DEFAULT: Self = Self {
        voltage_mv: 10_800,
        percent: 15,
    };
}

/// Complete runtime configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BridgeConfig<'a> {
    /// Client identity on the bus and in info reports.
    pub hostname: &'a str,
    pub topics: Topics<'a>,
    pub liveness: Liveness<'a>,
    pub intervals: Intervals,
    pub low_battery: LowBatteryThresholds,
    /// Run the dock wake variant while docked. Disabled by default.
    pub dock_wake: bool,
    pub baud: BaudRate,
    /// Firmware build identifier reported by `version` and the info topic.
    pub build: &'a str,
}

impl BridgeConfig<'static> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hostname: "roomba",
            topics: Topics::DEFAULT,
            liveness: Liveness::DEFAULT,
            intervals: Intervals::DEFAULT,
            low_battery: LowBatteryThresholds::DEFAULT,
            dock_wake: false,
            baud: BaudRate::B115200,
            build: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl Default for BridgeConfig<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BridgeConfig<'a> {
    #[must_use]
    pub const fn with_hostname(mut self, hostname: &'a str) -> Self {
        self.hostname = hostname;
        self
    }

    #[must_use]
    pub const fn with_topics(mut self, topics: Topics<'a>) -> Self {
        self.topics = topics;
        self
    }

    #[must_use]
    pub const fn with_intervals(mut self, intervals: Intervals) -> Self {
        self.intervals = intervals;
        self
    }

    #[must_use]
    pub const fn with_dock_wake(mut self, enabled: bool) -> Self {
        self.dock_wake = enabled;
        self
    }

    #[must_use]
    pub const fn with_build(mut self, build: &'a str) -> Self {
        self.build = build;
        self
    }
}
