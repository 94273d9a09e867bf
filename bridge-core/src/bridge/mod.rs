//! The bridge loop.
//!
//! [`Bridge`] owns the device state, the device link, the stream framer, the
//! event journal, and the periodic timers. The platform calls its entry
//! points from a single cooperative loop:
//!
//! 1. [`Bridge::begin`] once at start-up;
//! 2. [`Bridge::handle_console`] / [`Bridge::handle_bus_message`] for inbound
//!    lines;
//! 3. [`Bridge::poll_timers`] every iteration;
//! 4. [`Bridge::ingest_serial`] with whatever bytes the vacuum sent.

use core::time::Duration;

use crate::bus::{LastWill, MessageBus, NetworkInfo};
use crate::command::{CommandDispatcher, CommandError, CommandOutcome, Dispatched};
use crate::config::BridgeConfig;
use crate::console::{ConsoleCommand, ConsoleError, ConsoleOutcome, parse_console, run_console};
use crate::journal::{BridgeEvent, BridgeInstant, EventJournal};
use crate::protocol::{self, Opcode};
use crate::state::DeviceState;
use crate::status::{CompactStatus, InfoReport, LowBatteryWarning, Payload, StatusReport, Uptime};
use crate::telemetry::{StreamFramer, decode};
use crate::wake::{
    BASE_TEMPLATE, DOCK_TEMPLATE, Delay, DeviceLink, OFF_DOCK_TEMPLATE, SerialLink, WakeLine,
};

/// Settle between the start-up writes.
pub const BEGIN_SETTLE: Duration = Duration::from_millis(100);

/// What the platform should do after an entry point returns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopSignal {
    Continue,
    Restart,
}

/// Reply to a console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleReply {
    /// The line was a regular command.
    Command(Dispatched),
    /// The line was a console-only command.
    Console {
        command: ConsoleCommand,
        outcome: ConsoleOutcome,
    },
}

impl ConsoleReply {
    #[must_use]
    pub const fn signal(&self) -> LoopSignal {
        match self {
            ConsoleReply::Command(Dispatched {
                outcome: CommandOutcome::Restart,
                ..
            })
            | ConsoleReply::Console {
                outcome: ConsoleOutcome::Restart,
                ..
            } => LoopSignal::Restart,
            _ => LoopSignal::Continue,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Timers<I> {
    connect: Option<I>,
    wake: Option<I>,
    info: Option<I>,
    status: Option<I>,
}

/// Returns `true` when `interval` has strictly elapsed since `last`, or when
/// there was no previous run.
fn due<I>(last: Option<I>, now: I, interval: Duration) -> bool
where
    I: BridgeInstant,
{
    last.is_none_or(|at| now.saturating_duration_since(at) > interval)
}

/// Serial-to-bus bridge for one vacuum.
pub struct Bridge<'c, I, L, P, D>
where
    I: BridgeInstant,
{
    config: BridgeConfig<'c>,
    state: DeviceState<I>,
    link: DeviceLink<L, P, D>,
    dispatcher: CommandDispatcher,
    framer: StreamFramer,
    journal: EventJournal<I>,
    timers: Timers<I>,
    started_at: Option<I>,
    wakeups_stopped: bool,
}

impl<'c, I, L, P, D> Bridge<'c, I, L, P, D>
where
    I: BridgeInstant,
    L: SerialLink,
    P: WakeLine,
    D: Delay,
{
    pub fn new(config: BridgeConfig<'c>, link: DeviceLink<L, P, D>) -> Self {
        Self {
            config,
            state: DeviceState::new(),
            link,
            dispatcher: CommandDispatcher::new(),
            framer: StreamFramer::new(),
            journal: EventJournal::new(),
            timers: Timers {
                connect: None,
                wake: None,
                info: None,
                status: None,
            },
            started_at: None,
            wakeups_stopped: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig<'c> {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> &DeviceState<I> {
        &self.state
    }

    #[must_use]
    pub const fn journal(&self) -> &EventJournal<I> {
        &self.journal
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink<L, P, D> {
        &mut self.link
    }

    /// Returns `true` once a firmware update holds the bridge.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.dispatcher.is_held()
    }

    /// Returns `true` once the low-battery check disabled periodic wakes.
    #[must_use]
    pub const fn wakeups_stopped(&self) -> bool {
        self.wakeups_stopped
    }

    /// Time since [`Bridge::begin`].
    #[must_use]
    pub fn uptime(&self, now: I) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |at| now.saturating_duration_since(at))
    }

    /// Opens the OI and subscribes to the sensor stream.
    ///
    /// # Errors
    ///
    /// Returns the serial error from the first failed write.
    pub fn begin(&mut self, now: I) -> Result<(), L::Error> {
        self.started_at = Some(now);
        self.timers.wake = Some(now);
        self.timers.info = Some(now);
        self.timers.status = Some(now);
        self.journal.record(BridgeEvent::Started, now);

        let result = self.open_stream();
        match result {
            Ok(()) => {
                self.journal.record(BridgeEvent::StreamRequested, now);
            }
            Err(_) => {
                self.journal.record(BridgeEvent::LinkFailed, now);
            }
        }
        result
    }

    fn open_stream(&mut self) -> Result<(), L::Error> {
        self.link.send_opcode(Opcode::Start)?;
        self.link.settle(BEGIN_SETTLE);
        self.link.send(&protocol::STREAM_RESET)?;
        self.link.settle(BEGIN_SETTLE);
        self.link.send(&protocol::stream_request())
    }

    /// Feeds bytes received from the vacuum.
    ///
    /// Every completed frame is decoded and reconciled; failures are
    /// journaled and leave the state untouched.
    pub fn ingest_serial(&mut self, bytes: &[u8], now: I) {
        if self.dispatcher.is_held() {
            return;
        }

        for byte in bytes {
            let decoded = match self.framer.push(*byte) {
                None => continue,
                Some(Ok(payload)) => decode(payload),
                Some(Err(error)) => {
                    self.journal.record(BridgeEvent::FrameDropped(error), now);
                    continue;
                }
            };

            let event = match decoded {
                Ok(None) => continue,
                Ok(Some(snapshot)) => match self.state.reconcile(&snapshot, now) {
                    Ok(flags) => BridgeEvent::SnapshotAccepted(flags),
                    Err(crate::state::ReconcileError::Rejected { temperature }) => {
                        BridgeEvent::SnapshotRejected { temperature }
                    }
                },
                Err(error) => BridgeEvent::DecodeFailed(error),
            };
            self.journal.record(event, now);
        }
    }

    /// Handles a message delivered by the bus.
    ///
    /// Only the configured command topic is honoured and the payload must be
    /// UTF-8.
    pub fn handle_bus_message<B>(
        &mut self,
        topic: &str,
        payload: &[u8],
        now: I,
        bus: &mut B,
    ) -> LoopSignal
    where
        B: MessageBus,
    {
        if topic != self.config.topics.command {
            self.journal.record(BridgeEvent::BusMessageIgnored, now);
            return LoopSignal::Continue;
        }
        let Ok(line) = core::str::from_utf8(payload) else {
            self.journal.record(BridgeEvent::BusMessageIgnored, now);
            return LoopSignal::Continue;
        };

        match self.run_command(line, now, bus) {
            Ok(Dispatched {
                outcome: CommandOutcome::Restart,
                ..
            }) => LoopSignal::Restart,
            Ok(_) | Err(CommandError::Busy | CommandError::Link(_)) => LoopSignal::Continue,
            Err(CommandError::Unrecognized { .. }) => {
                self.journal.record(BridgeEvent::CommandUnrecognized, now);
                LoopSignal::Continue
            }
        }
    }

    /// Handles a line typed on the debug console.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Unknown`] when the line is neither a command nor
    /// a console command, [`ConsoleError::Busy`] during a firmware update, and
    /// [`ConsoleError::Link`] on a serial failure.
    pub fn handle_console<B>(
        &mut self,
        line: &str,
        now: I,
        bus: &mut B,
    ) -> Result<ConsoleReply, ConsoleError<L::Error>>
    where
        B: MessageBus,
    {
        match self.run_command(line, now, bus) {
            Ok(dispatched) => Ok(ConsoleReply::Command(dispatched)),
            Err(CommandError::Busy) => Err(ConsoleError::Busy),
            Err(CommandError::Link(error)) => Err(ConsoleError::Link(error)),
            Err(CommandError::Unrecognized { .. }) => {
                let command = match parse_console(line) {
                    Ok(command) => command,
                    Err(error) => {
                        self.journal.record(BridgeEvent::ConsoleUnknown, now);
                        return Err(error);
                    }
                };

                let outcome = match run_console(command, &self.state, &mut self.link) {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        self.journal.record(BridgeEvent::LinkFailed, now);
                        return Err(error);
                    }
                };
                self.journal
                    .record(BridgeEvent::ConsoleExecuted(command), now);
                if let ConsoleOutcome::Woke(report) = outcome {
                    self.journal.record(BridgeEvent::WakeRun(report), now);
                }
                if outcome == ConsoleOutcome::Restart {
                    self.journal.record(BridgeEvent::RestartRequested, now);
                }
                Ok(ConsoleReply::Console { command, outcome })
            }
        }
    }

    /// Dispatches a command line and journals the result. Unrecognized lines
    /// are left for the caller to journal.
    fn run_command<B>(
        &mut self,
        line: &str,
        now: I,
        bus: &mut B,
    ) -> Result<Dispatched, CommandError<L::Error>>
    where
        B: MessageBus,
    {
        let result = self.dispatcher.execute(line, &mut self.state, &mut self.link);
        match &result {
            Ok(dispatched) => {
                self.journal
                    .record(BridgeEvent::WakeRun(dispatched.wake), now);
                let event = if dispatched.outcome == CommandOutcome::Refused {
                    BridgeEvent::CommandRefused(dispatched.kind)
                } else {
                    BridgeEvent::CommandExecuted(dispatched.kind)
                };
                self.journal.record(event, now);

                match dispatched.outcome {
                    CommandOutcome::PublishStatus if self.state.has_snapshot() => {
                        if self.publish_status(bus, now) {
                            self.state.mark_published();
                        }
                    }
                    CommandOutcome::Restart => {
                        self.journal.record(BridgeEvent::RestartRequested, now);
                    }
                    _ => {}
                }
            }
            Err(CommandError::Link(_)) => {
                self.journal.record(BridgeEvent::LinkFailed, now);
            }
            Err(CommandError::Unrecognized { wake }) => {
                self.journal.record(BridgeEvent::WakeRun(*wake), now);
            }
            Err(CommandError::Busy) => {}
        }
        result
    }

    /// Runs whichever periodic jobs are due.
    pub fn poll_timers<B, N>(&mut self, now: I, bus: &mut B, net: &N)
    where
        B: MessageBus,
        N: NetworkInfo,
    {
        if self.dispatcher.is_held() {
            return;
        }

        let intervals = self.config.intervals;

        if !bus.is_connected() && due(self.timers.connect, now, intervals.reconnect) {
            self.timers.connect = Some(now);
            self.reconnect(now, bus, net);
        }

        if due(self.timers.wake, now, intervals.wake) {
            self.timers.wake = Some(now);
            self.wake_cycle(now);
        }

        if due(self.timers.info, now, intervals.info) {
            self.timers.info = Some(now);
            let uptime = Uptime(self.uptime(now));
            self.publish_info(now, bus, net, None, Some(uptime));
        }

        if due(self.timers.status, now, intervals.status) {
            self.timers.status = Some(now);
            self.status_cycle(now, bus);
        }
    }

    fn reconnect<B, N>(&mut self, now: I, bus: &mut B, net: &N)
    where
        B: MessageBus,
        N: NetworkInfo,
    {
        self.journal.record(BridgeEvent::BusConnectAttempt, now);

        let topics = self.config.topics;
        let liveness = self.config.liveness;
        let will = LastWill {
            topic: topics.liveness,
            payload: liveness.offline,
            retained: true,
        };

        let connected = bus
            .connect(self.config.hostname, will)
            .and_then(|()| bus.publish(topics.liveness, &Payload::Liveness(liveness.online), true))
            .and_then(|()| bus.subscribe(topics.command));
        if connected.is_err() {
            self.journal.record(BridgeEvent::BusConnectFailed, now);
            return;
        }

        self.journal.record(BridgeEvent::BusConnected, now);
        self.publish_info(now, bus, net, Some(net.mac_address()), None);
    }

    fn publish_info<B, N>(
        &mut self,
        now: I,
        bus: &mut B,
        net: &N,
        mac_address: Option<&str>,
        uptime: Option<Uptime>,
    ) where
        B: MessageBus,
        N: NetworkInfo,
    {
        if !bus.is_connected() {
            return;
        }
        let info = InfoReport {
            hostname: net.hostname(),
            mac_address,
            ip_address: net.ip_address(),
            rssi: net.rssi(),
            ssid: net.ssid(),
            build: self.config.build,
            uptime,
        };
        if bus
            .publish(self.config.topics.info, &Payload::Info(info), false)
            .is_ok()
        {
            self.journal.record(BridgeEvent::InfoPublished, now);
        }
    }

    fn wake_cycle(&mut self, now: I) {
        if self.state.cleaning() || self.state.returning() || self.wakeups_stopped {
            self.journal.record(BridgeEvent::WakeSkipped, now);
            return;
        }

        let mode = self.state.telemetry().mode;
        let result = if self.state.docked() {
            if !self.config.dock_wake {
                self.journal.record(BridgeEvent::WakeSkipped, now);
                return;
            }
            self.link
                .wake(&DOCK_TEMPLATE, mode)
                .map(|report| self.journal.record(BridgeEvent::WakeRun(report), now))
        } else {
            self.link
                .wake(&OFF_DOCK_TEMPLATE, mode)
                .map(|report| self.journal.record(BridgeEvent::WakeRun(report), now))
                .and_then(|_| self.link.wake(&BASE_TEMPLATE, mode))
                .map(|report| self.journal.record(BridgeEvent::WakeRun(report), now))
        };

        if result.is_err() {
            self.journal.record(BridgeEvent::LinkFailed, now);
        }
    }

    fn status_cycle<B>(&mut self, now: I, bus: &mut B)
    where
        B: MessageBus,
    {
        let stale = self.state.is_stale(now, self.config.intervals.stale_after);
        if stale || self.state.published() {
            let event = match self.link.send(&protocol::stream_request()) {
                Ok(()) => BridgeEvent::StreamRequested,
                Err(_) => BridgeEvent::LinkFailed,
            };
            self.journal.record(event, now);
        } else if self.publish_status(bus, now) {
            self.state.mark_published();
        }

        self.check_battery(now, bus);
    }

    /// Publishes verbose and compact status. Returns `true` when both went out.
    fn publish_status<B>(&mut self, bus: &mut B, now: I) -> bool
    where
        B: MessageBus,
    {
        if !bus.is_connected() {
            self.journal.record(BridgeEvent::StatusSkipped, now);
            return false;
        }

        let topics = self.config.topics;
        let verbose = Payload::Status(StatusReport::from_state(&self.state));
        let compact = Payload::Compact(CompactStatus::from_state(&self.state));
        let sent = bus.publish(topics.status, &verbose, false).is_ok()
            && bus.publish(topics.compact_status, &compact, true).is_ok();

        let event = if sent {
            BridgeEvent::StatusPublished
        } else {
            BridgeEvent::StatusSkipped
        };
        self.journal.record(event, now);
        sent
    }

    fn check_battery<B>(&mut self, now: I, bus: &mut B)
    where
        B: MessageBus,
    {
        if !self.state.has_snapshot() {
            return;
        }

        let thresholds = self.config.low_battery;
        let voltage = self.state.telemetry().voltage;
        let percent = self.state.battery_percent();
        let low_voltage = voltage > 0 && voltage < thresholds.voltage_mv;
        let low_percent = percent.is_some_and(|level| level < i32::from(thresholds.percent));
        if !low_voltage && !low_percent {
            return;
        }

        self.journal
            .record(BridgeEvent::LowBattery { voltage, percent }, now);

        if (self.state.cleaning() || self.state.returning())
            && self.link.send_opcode(Opcode::Clean).is_err()
        {
            self.journal.record(BridgeEvent::LinkFailed, now);
        }

        if bus.is_connected() {
            self.publish_status(bus, now);
            let warning = Payload::LowBattery(LowBatteryWarning {
                voltage,
                battery_level: percent,
            });
            if bus.publish(self.config.topics.status, &warning, true).is_err() {
                self.journal.record(BridgeEvent::WarningDropped, now);
            }
            self.wakeups_stopped = true;
        }
    }

    /// Pauses the stream and latches exclusive mode for a firmware update.
    ///
    /// Afterwards ingestion and timers are no-ops and commands return
    /// [`CommandError::Busy`] until the process restarts.
    ///
    /// # Errors
    ///
    /// Returns the serial error if the pause could not be written; the hold is
    /// latched regardless.
    pub fn begin_firmware_update(&mut self, now: I) -> Result<(), L::Error> {
        let result = self.link.send(&protocol::STREAM_PAUSE);
        self.dispatcher.hold();
        self.framer.reset();
        self.journal.record(BridgeEvent::FirmwareUpdateHold, now);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockInstant;

    #[test]
    fn timers_fire_strictly_after_their_interval() {
        let interval = Duration::from_secs(10);
        assert!(due::<MockInstant>(None, MockInstant(0), interval));
        assert!(!due(Some(MockInstant(0)), MockInstant(10_000), interval));
        assert!(due(Some(MockInstant(0)), MockInstant(10_001), interval));
    }

    #[test]
    fn console_reply_signals_restart() {
        let reply = ConsoleReply::Console {
            command: ConsoleCommand::Restart,
            outcome: ConsoleOutcome::Restart,
        };
        assert_eq!(reply.signal(), LoopSignal::Restart);

        let reply = ConsoleReply::Console {
            command: ConsoleCommand::Version,
            outcome: ConsoleOutcome::Version,
        };
        assert_eq!(reply.signal(), LoopSignal::Continue);
    }
}
