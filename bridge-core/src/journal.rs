//! Bounded event history for the bridge.
//!
//! The core never formats log lines. Every notable occurrence is written into
//! an [`EventJournal`] ring instead, and each front-end drains the records it
//! has not yet seen (the firmware through `defmt`, the emulator to the
//! terminal).

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::command::CommandKind;
use crate::console::ConsoleCommand;
use crate::state::DerivedFlags;
use crate::telemetry::{DecodeError, FrameError};
use crate::wake::WakeReport;

/// Total number of journal entries retained in memory.
pub const JOURNAL_CAPACITY: usize = 64;

/// Monotonically increasing journal record identifier.
pub type RecordId = u32;

/// Monotonic clock reading supplied by the platform.
pub trait BridgeInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Everything the bridge reports about its own activity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    Started,
    FrameDropped(FrameError),
    DecodeFailed(DecodeError),
    SnapshotRejected { temperature: i8 },
    SnapshotAccepted(DerivedFlags),
    CommandExecuted(CommandKind),
    CommandRefused(CommandKind),
    CommandUnrecognized,
    ConsoleExecuted(ConsoleCommand),
    ConsoleUnknown,
    LinkFailed,
    WakeRun(WakeReport),
    WakeSkipped,
    StreamRequested,
    StatusPublished,
    StatusSkipped,
    InfoPublished,
    BusConnectAttempt,
    BusConnected,
    BusConnectFailed,
    BusMessageIgnored,
    LowBattery { voltage: u16, percent: Option<i32> },
    /// The retained low-battery warning could not be published.
    WarningDropped,
    FirmwareUpdateHold,
    RestartRequested,
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeEvent::Started => f.write_str("started"),
            BridgeEvent::FrameDropped(error) => write!(f, "frame-dropped {error}"),
            BridgeEvent::DecodeFailed(error) => write!(f, "decode-failed {error}"),
            BridgeEvent::SnapshotRejected { temperature } => {
                write!(f, "snapshot-rejected temperature={temperature}")
            }
            BridgeEvent::SnapshotAccepted(flags) => write!(
                f,
                "snapshot-accepted cleaning={} docked={} returning={}",
                flags.cleaning, flags.docked, flags.returning
            ),
            BridgeEvent::CommandExecuted(kind) => write!(f, "command {kind}"),
            BridgeEvent::CommandRefused(kind) => write!(f, "command-refused {kind}"),
            BridgeEvent::CommandUnrecognized => f.write_str("command-unrecognized"),
            BridgeEvent::ConsoleExecuted(command) => write!(f, "console {command}"),
            BridgeEvent::ConsoleUnknown => f.write_str("console-unknown"),
            BridgeEvent::LinkFailed => f.write_str("serial-write-failed"),
            BridgeEvent::WakeRun(report) => write!(f, "wake {report}"),
            BridgeEvent::WakeSkipped => f.write_str("wake-skipped"),
            BridgeEvent::StreamRequested => f.write_str("stream-requested"),
            BridgeEvent::StatusPublished => f.write_str("status-published"),
            BridgeEvent::StatusSkipped => f.write_str("status-skipped (bus offline)"),
            BridgeEvent::InfoPublished => f.write_str("info-published"),
            BridgeEvent::BusConnectAttempt => f.write_str("bus-connect-attempt"),
            BridgeEvent::BusConnected => f.write_str("bus-connected"),
            BridgeEvent::BusConnectFailed => f.write_str("bus-connect-failed"),
            BridgeEvent::BusMessageIgnored => f.write_str("bus-message-ignored"),
            BridgeEvent::LowBattery { voltage, percent } => match percent {
                Some(percent) => write!(f, "low-battery voltage={voltage} level={percent}%"),
                None => write!(f, "low-battery voltage={voltage}"),
            },
            BridgeEvent::WarningDropped => f.write_str("low-battery-warning-dropped"),
            BridgeEvent::FirmwareUpdateHold => f.write_str("firmware-update-hold"),
            BridgeEvent::RestartRequested => f.write_str("restart-requested"),
        }
    }
}

impl BridgeEvent {
    /// Returns `true` for events a front-end should surface as warnings.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            BridgeEvent::FrameDropped(_)
                | BridgeEvent::DecodeFailed(_)
                | BridgeEvent::SnapshotRejected { .. }
                | BridgeEvent::CommandUnrecognized
                | BridgeEvent::ConsoleUnknown
                | BridgeEvent::LinkFailed
                | BridgeEvent::BusConnectFailed
                | BridgeEvent::LowBattery { .. }
                | BridgeEvent::WarningDropped
        )
    }
}

/// Journal record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JournalRecord<I>
where
    I: Copy,
{
    pub id: RecordId,
    pub timestamp: I,
    pub event: BridgeEvent,
}

/// Fixed-size ring of [`JournalRecord`]s.
pub struct EventJournal<I, const CAPACITY: usize = JOURNAL_CAPACITY>
where
    I: Copy,
{
    ring: HistoryBuf<JournalRecord<I>, CAPACITY>,
    next_id: RecordId,
}

impl<I, const CAPACITY: usize> EventJournal<I, CAPACITY>
where
    I: Copy,
{
    /// Creates an empty journal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
        }
    }

    /// Appends an event and returns its identifier.
    pub fn record(&mut self, event: BridgeEvent, timestamp: I) -> RecordId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(JournalRecord {
            id,
            timestamp,
            event,
        });
        id
    }

    /// Returns an iterator over the retained records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, JournalRecord<I>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&JournalRecord<I>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Identifier the next recorded event will receive.
    ///
    /// Consumers keep this as a cursor and pass it to [`EventJournal::since`].
    #[must_use]
    pub const fn cursor(&self) -> RecordId {
        self.next_id
    }

    /// Returns the retained records with `id >= cursor`, oldest first.
    ///
    /// Records that were overwritten before the consumer caught up are lost.
    pub fn since(&self, cursor: RecordId) -> impl Iterator<Item = &JournalRecord<I>> + '_ {
        let backlog = self.next_id.wrapping_sub(cursor);
        let retained = u32::try_from(self.ring.len()).unwrap_or(u32::MAX);
        let skip = retained.saturating_sub(backlog);
        self.ring
            .oldest_ordered()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
    }
}

impl<I, const CAPACITY: usize> Default for EventJournal<I, CAPACITY>
where
    I: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockInstant;

    #[test]
    fn records_are_numbered_in_order() {
        let mut journal = EventJournal::<MockInstant, 4>::new();
        assert!(journal.is_empty());

        assert_eq!(journal.record(BridgeEvent::Started, MockInstant(0)), 0);
        assert_eq!(journal.record(BridgeEvent::StreamRequested, MockInstant(5)), 1);

        let latest = journal.latest().copied().unwrap();
        assert_eq!(latest.id, 1);
        assert_eq!(latest.timestamp, MockInstant(5));
        assert_eq!(latest.event, BridgeEvent::StreamRequested);
    }

    #[test]
    fn since_returns_only_unseen_records() {
        let mut journal = EventJournal::<MockInstant, 4>::new();
        journal.record(BridgeEvent::Started, MockInstant(0));
        let cursor = journal.cursor();
        journal.record(BridgeEvent::WakeSkipped, MockInstant(1));
        journal.record(BridgeEvent::StatusSkipped, MockInstant(2));

        let events: std::vec::Vec<_> = journal.since(cursor).map(|record| record.event).collect();
        assert_eq!(events, [BridgeEvent::WakeSkipped, BridgeEvent::StatusSkipped]);
        assert_eq!(journal.since(journal.cursor()).count(), 0);
    }

    #[test]
    fn since_survives_overwritten_history() {
        let mut journal = EventJournal::<MockInstant, 2>::new();
        for tick in 0..5 {
            journal.record(BridgeEvent::StreamRequested, MockInstant(tick));
        }
        assert_eq!(journal.len(), 2);

        let ids: std::vec::Vec<_> = journal.since(0).map(|record| record.id).collect();
        assert_eq!(ids, [3, 4]);
        let ids: std::vec::Vec<_> = journal.since(4).map(|record| record.id).collect();
        assert_eq!(ids, [4]);
    }

    #[test]
    fn warnings_are_classified() {
        assert!(BridgeEvent::LinkFailed.is_warning());
        assert!(!BridgeEvent::StatusPublished.is_warning());
    }
}
