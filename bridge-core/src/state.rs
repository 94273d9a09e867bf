//! Device state reconciliation.
//!
//! [`DeviceState`] is the bridge's single view of the vacuum. It is replaced
//! wholesale by each validated telemetry snapshot and carries the derived
//! `cleaning`/`docked`/`returning` flags the dispatcher and status reports
//! rely on.

use core::{fmt, time::Duration};

use crate::journal::BridgeInstant;
use crate::telemetry::RawTelemetrySnapshot;

/// Current below which the vacuum is assumed to be running a cycle (mA).
pub const CLEANING_CURRENT_MA: i16 = -400;
/// Current above which the vacuum is assumed to be on its dock (mA).
pub const DOCKED_CURRENT_MA: i16 = -50;

/// High-level activity flags derived from telemetry and dispatched commands.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DerivedFlags {
    pub cleaning: bool,
    pub docked: bool,
    pub returning: bool,
}

/// Reasons a snapshot is not merged.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReconcileError {
    /// A battery temperature of exactly zero marks an incomplete frame.
    Rejected { temperature: i8 },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::Rejected { temperature } => {
                write!(f, "snapshot rejected (temperature {temperature})")
            }
        }
    }
}

/// The bridge's view of the vacuum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceState<I>
where
    I: Copy,
{
    telemetry: RawTelemetrySnapshot,
    flags: DerivedFlags,
    updated_at: Option<I>,
    published: bool,
    distance_total: i32,
}

impl<I> DeviceState<I>
where
    I: BridgeInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            telemetry: RawTelemetrySnapshot::EMPTY,
            flags: DerivedFlags {
                cleaning: false,
                docked: false,
                returning: false,
            },
            updated_at: None,
            published: false,
            distance_total: 0,
        }
    }

    /// Merges a decoded snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Rejected`] when the snapshot reports a battery
    /// temperature of zero; the state is left untouched.
    pub fn reconcile(
        &mut self,
        snapshot: &RawTelemetrySnapshot,
        now: I,
    ) -> Result<DerivedFlags, ReconcileError> {
        if snapshot.temperature == 0 {
            return Err(ReconcileError::Rejected {
                temperature: snapshot.temperature,
            });
        }

        let returning = self.flags.returning;
        self.flags = if snapshot.current < CLEANING_CURRENT_MA && !returning {
            DerivedFlags {
                cleaning: true,
                docked: false,
                returning,
            }
        } else if snapshot.current > DOCKED_CURRENT_MA {
            DerivedFlags {
                cleaning: false,
                docked: true,
                returning: false,
            }
        } else {
            DerivedFlags {
                cleaning: false,
                docked: false,
                returning,
            }
        };

        self.telemetry = *snapshot;
        self.updated_at = Some(now);
        self.published = false;
        self.distance_total = self
            .distance_total
            .wrapping_add(i32::from(snapshot.distance));

        Ok(self.flags)
    }

    /// Raw fields from the latest validated snapshot.
    #[must_use]
    pub const fn telemetry(&self) -> &RawTelemetrySnapshot {
        &self.telemetry
    }

    #[must_use]
    pub const fn flags(&self) -> DerivedFlags {
        self.flags
    }

    #[must_use]
    pub const fn cleaning(&self) -> bool {
        self.flags.cleaning
    }

    #[must_use]
    pub const fn docked(&self) -> bool {
        self.flags.docked
    }

    #[must_use]
    pub const fn returning(&self) -> bool {
        self.flags.returning
    }

    pub fn set_cleaning(&mut self, cleaning: bool) {
        self.flags.cleaning = cleaning;
    }

    pub fn set_returning(&mut self, returning: bool) {
        self.flags.returning = returning;
    }

    /// Timestamp of the latest validated snapshot.
    #[must_use]
    pub const fn updated_at(&self) -> Option<I> {
        self.updated_at
    }

    #[must_use]
    pub const fn has_snapshot(&self) -> bool {
        self.updated_at.is_some()
    }

    /// Returns `true` when no validated snapshot arrived within `window`.
    #[must_use]
    pub fn is_stale(&self, now: I, window: Duration) -> bool {
        self.updated_at
            .is_none_or(|at| now.saturating_duration_since(at) > window)
    }

    #[must_use]
    pub const fn published(&self) -> bool {
        self.published
    }

    pub fn mark_published(&mut self) {
        self.published = true;
    }

    /// Lifetime sum of reported distances in millimetres.
    #[must_use]
    pub const fn distance_total(&self) -> i32 {
        self.distance_total
    }

    /// Remaining charge as a whole percentage of capacity.
    ///
    /// Negative when the reported charge has underflowed.
    #[must_use]
    pub fn battery_percent(&self) -> Option<i32> {
        battery_percent(self.telemetry.charge, self.telemetry.capacity)
    }

    #[must_use]
    pub const fn charging(&self) -> bool {
        self.telemetry.charging_state.is_charging()
    }

    #[must_use]
    pub const fn on_home_base(&self) -> bool {
        self.telemetry.charging_sources.on_home_base()
    }
}

impl<I> Default for DeviceState<I>
where
    I: BridgeInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

/// `charge * 100 / capacity`, truncated toward zero. Not clamped.
#[must_use]
pub fn battery_percent(charge: i16, capacity: u16) -> Option<i32> {
    if capacity == 0 {
        return None;
    }
    Some((i32::from(charge) * 100) / i32::from(capacity))
}
