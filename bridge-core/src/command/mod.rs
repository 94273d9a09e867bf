//! Command dispatch.
//!
//! Inbound lines are parsed once into a [`Command`] and executed against the
//! shared [`DeviceState`] and [`DeviceLink`]. The vacuum may be asleep, so
//! every line first runs the base wake, even lines that then turn out to be
//! unrecognized.

use core::{fmt, time::Duration};

use crate::journal::BridgeInstant;
use crate::protocol::Opcode;
use crate::state::DeviceState;
use crate::wake::{BASE_TEMPLATE, Delay, DeviceLink, SerialLink, WakeError, WakeLine, WakeReport};

pub mod grammar;

pub use grammar::{
    Command, CommandKind, PacketArgs, UnrecognizedCommand, decimal_byte, parse_command,
};

/// Three-note locate tune: define song 1, then play it.
pub const LOCATE_SONG: [u8; 14] = [140, 1, 3, 57, 8, 75, 8, 73, 16, 0, 131, 0, 141, 1];
/// Time the tune needs before the OI is returned to passive.
pub const LOCATE_SETTLE: Duration = Duration::from_millis(750);

/// What a successfully dispatched command did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    /// Opcodes were written.
    Executed,
    /// `clean` while a cycle was already running.
    AlreadyCleaning,
    /// `stop` while neither cleaning nor returning.
    NothingToStop,
    /// `locate` while the vacuum is busy; nothing was written.
    Refused,
    /// `send_status`: the bridge loop should publish now.
    PublishStatus,
    /// `sleep`: accepted but deep sleep is unavailable.
    SleepIgnored,
    /// `reboot`: the caller should restart.
    Restart,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandOutcome::Executed => "executed",
            CommandOutcome::AlreadyCleaning => "already cleaning",
            CommandOutcome::NothingToStop => "nothing to stop",
            CommandOutcome::Refused => "refused while busy",
            CommandOutcome::PublishStatus => "status requested",
            CommandOutcome::SleepIgnored => "sleep ignored",
            CommandOutcome::Restart => "restart requested",
        };
        f.write_str(label)
    }
}

/// Result of a dispatched line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dispatched {
    pub kind: CommandKind,
    pub outcome: CommandOutcome,
    pub wake: WakeReport,
}

/// Failures surfaced to the caller of [`CommandDispatcher::execute`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandError<E> {
    /// The line named no known command. The wake still ran.
    Unrecognized { wake: WakeReport },
    /// A firmware update holds the link; nothing ran.
    Busy,
    /// A serial write failed.
    Link(E),
}

impl<E> From<WakeError<E>> for CommandError<E> {
    fn from(value: WakeError<E>) -> Self {
        match value {
            WakeError::Link(error) => CommandError::Link(error),
        }
    }
}

impl<E> fmt::Display for CommandError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unrecognized { .. } => f.write_str("unrecognized command"),
            CommandError::Busy => f.write_str("firmware update in progress"),
            CommandError::Link(error) => write!(f, "serial link error: {error:?}"),
        }
    }
}

/// Executes command lines.
///
/// Once [`CommandDispatcher::hold`] is called every line is refused with
/// [`CommandError::Busy`] until the process restarts.
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    held: bool,
}

impl CommandDispatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self { held: false }
    }

    /// Latches exclusive mode for a firmware update.
    pub fn hold(&mut self) {
        self.held = true;
    }

    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.held
    }

    /// Wakes the vacuum, parses `line`, and executes it.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Busy`] while held, [`CommandError::Link`] when a
    /// serial write fails, and [`CommandError::Unrecognized`] when the line
    /// does not parse.
    pub fn execute<I, L, P, D>(
        &mut self,
        line: &str,
        state: &mut DeviceState<I>,
        link: &mut DeviceLink<L, P, D>,
    ) -> Result<Dispatched, CommandError<L::Error>>
    where
        I: BridgeInstant,
        L: SerialLink,
        P: WakeLine,
        D: Delay,
    {
        if self.held {
            return Err(CommandError::Busy);
        }

        let wake = link.wake(&BASE_TEMPLATE, state.telemetry().mode)?;
        let command = parse_command(line).map_err(|_| CommandError::Unrecognized { wake })?;
        let outcome = Self::apply(command, state, link).map_err(CommandError::Link)?;

        Ok(Dispatched {
            kind: command.kind(),
            outcome,
            wake,
        })
    }

    fn apply<I, L, P, D>(
        command: Command<'_>,
        state: &mut DeviceState<I>,
        link: &mut DeviceLink<L, P, D>,
    ) -> Result<CommandOutcome, L::Error>
    where
        I: BridgeInstant,
        L: SerialLink,
        P: WakeLine,
        D: Delay,
    {
        match command {
            Command::Clean => {
                if state.cleaning() {
                    state.set_returning(false);
                    return Ok(CommandOutcome::AlreadyCleaning);
                }
                link.send_opcode(Opcode::Clean)?;
                state.set_cleaning(true);
                state.set_returning(false);
            }
            Command::TurnOff => {
                link.send_opcode(Opcode::Power)?;
                state.set_cleaning(false);
                state.set_returning(false);
            }
            Command::Toggle | Command::StartPause => {
                let was_cleaning = state.cleaning();
                let first = if was_cleaning {
                    Opcode::Power
                } else {
                    Opcode::Clean
                };
                link.send_opcode(first)?;
                link.send_opcode(Opcode::Clean)?;
                state.set_cleaning(!was_cleaning);
                state.set_returning(false);
            }
            Command::Stop => {
                if !state.cleaning() && !state.returning() {
                    return Ok(CommandOutcome::NothingToStop);
                }
                link.send_opcode(Opcode::Clean)?;
                state.set_cleaning(false);
                state.set_returning(false);
            }
            Command::CleanSpot => {
                link.send_opcode(Opcode::Spot)?;
                state.set_cleaning(true);
                state.set_returning(false);
            }
            Command::Locate => {
                if state.cleaning() || state.returning() {
                    return Ok(CommandOutcome::Refused);
                }
                link.send(&LOCATE_SONG)?;
                link.settle(LOCATE_SETTLE);
                link.send_opcode(Opcode::Start)?;
            }
            Command::ReturnToBase => {
                link.send_opcode(Opcode::Dock)?;
                state.set_returning(true);
            }
            Command::SendStatus => return Ok(CommandOutcome::PublishStatus),
            Command::Packet(args) => {
                for byte in args.bytes() {
                    link.send(&[byte])?;
                }
            }
            Command::Sleep => return Ok(CommandOutcome::SleepIgnored),
            Command::Reboot => return Ok(CommandOutcome::Restart),
        }
        Ok(CommandOutcome::Executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OperatingMode;
    use crate::telemetry::RawTelemetrySnapshot;
    use crate::test_support::{LinkLog, MockInstant, RecordingLink, recording_link};
    use crate::wake::ModeNudge;

    /// State whose last reported mode is Safe, so the wake writes nothing.
    fn awake_state() -> DeviceState<MockInstant> {
        let mut state = DeviceState::new();
        let snapshot = RawTelemetrySnapshot {
            temperature: 20,
            current: -200,
            mode: OperatingMode::Safe,
            ..RawTelemetrySnapshot::default()
        };
        state.reconcile(&snapshot, MockInstant(0)).unwrap();
        state
    }

    fn run(
        line: &str,
        state: &mut DeviceState<MockInstant>,
    ) -> (
        Result<Dispatched, CommandError<crate::test_support::MockLinkError>>,
        LinkLog,
    ) {
        let (mut link, log): (RecordingLink, LinkLog) = recording_link();
        let result = CommandDispatcher::new().execute(line, state, &mut link);
        (result, log)
    }

    #[test]
    fn clean_starts_a_cycle() {
        let mut state = awake_state();
        state.set_returning(true);
        let (result, log) = run("clean", &mut state);

        assert_eq!(result.unwrap().outcome, CommandOutcome::Executed);
        assert_eq!(log.written(), [135]);
        assert!(state.cleaning());
        assert!(!state.returning());
    }

    #[test]
    fn clean_while_cleaning_writes_nothing() {
        let mut state = awake_state();
        state.set_cleaning(true);
        state.set_returning(true);
        let (result, log) = run("clean", &mut state);

        assert_eq!(result.unwrap().outcome, CommandOutcome::AlreadyCleaning);
        assert!(log.written().is_empty());
        assert!(state.cleaning());
        assert!(!state.returning());
    }

    #[test]
    fn turn_off_sends_power() {
        let mut state = awake_state();
        state.set_cleaning(true);
        let (_, log) = run("turn_off", &mut state);

        assert_eq!(log.written(), [133]);
        assert!(!state.cleaning());
    }

    #[test]
    fn toggle_and_start_pause_invert_cleaning() {
        for line in ["toggle", "start_pause"] {
            let mut state = awake_state();
            let (_, log) = run(line, &mut state);
            assert_eq!(log.written(), [135, 135]);
            assert!(state.cleaning());

            let (_, log) = run(line, &mut state);
            assert_eq!(log.written(), [133, 135]);
            assert!(!state.cleaning());
        }
    }

    #[test]
    fn stop_pauses_an_active_cycle() {
        let mut state = awake_state();
        state.set_returning(true);
        let (result, log) = run("stop", &mut state);

        assert_eq!(result.unwrap().outcome, CommandOutcome::Executed);
        assert_eq!(log.written(), [135]);
        assert!(!state.returning());
        assert!(!state.cleaning());
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut state = awake_state();
        let (result, log) = run("stop", &mut state);

        assert_eq!(result.unwrap().outcome, CommandOutcome::NothingToStop);
        assert!(log.written().is_empty());
    }

    #[test]
    fn clean_spot_sends_spot() {
        let mut state = awake_state();
        let (_, log) = run("clean_spot", &mut state);
        assert_eq!(log.written(), [134]);
        assert!(state.cleaning());
    }

    #[test]
    fn locate_plays_the_song_when_idle() {
        let mut state = awake_state();
        let (result, log) = run("locate", &mut state);

        assert_eq!(result.unwrap().outcome, CommandOutcome::Executed);
        let mut expected = LOCATE_SONG.to_vec();
        expected.push(128);
        assert_eq!(log.written(), expected);
        assert!(log.delays().contains(&LOCATE_SETTLE));
    }

    #[test]
    fn locate_is_refused_while_busy() {
        let mut state = awake_state();
        state.set_cleaning(true);
        let (result, log) = run("locate", &mut state);

        assert_eq!(result.unwrap().outcome, CommandOutcome::Refused);
        assert!(log.written().is_empty());
    }

    #[test]
    fn return_to_base_marks_returning() {
        let mut state = awake_state();
        state.set_cleaning(true);
        let (_, log) = run("return_to_base", &mut state);

        assert_eq!(log.written(), [143]);
        assert!(state.returning());
        assert!(state.cleaning());
    }

    #[test]
    fn packet_writes_each_token() {
        let mut state = awake_state();
        let (_, log) = run("packet 128 131 abc 300", &mut state);
        assert_eq!(log.writes(), [std::vec![128], std::vec![131], std::vec![0], std::vec![44]]);

        let (_, log) = run("packet 128 2", &mut state);
        assert_eq!(log.written(), [128, 2]);

        let (_, log) = run("packet abc", &mut state);
        assert_eq!(log.written(), [0]);

        let (result, log) = run("packet", &mut state);
        assert_eq!(result.unwrap().kind, CommandKind::Packet);
        assert!(log.written().is_empty());
    }

    #[test]
    fn status_sleep_and_reboot_only_report() {
        let mut state = awake_state();
        for (line, outcome) in [
            ("send_status", CommandOutcome::PublishStatus),
            ("sleep", CommandOutcome::SleepIgnored),
            ("reboot", CommandOutcome::Restart),
        ] {
            let (result, log) = run(line, &mut state);
            assert_eq!(result.unwrap().outcome, outcome);
            assert!(log.written().is_empty());
        }
    }

    #[test]
    fn unrecognized_lines_still_wake() {
        let mut state = DeviceState::<MockInstant>::new();
        let (result, log) = run("dance", &mut state);

        let Err(CommandError::Unrecognized { wake }) = result else {
            panic!("expected unrecognized");
        };
        assert_eq!(wake.nudge, ModeNudge::Start);
        assert_eq!(log.written(), [128]);
        assert_eq!(log.line_pulses(), 1);
    }

    #[test]
    fn held_dispatcher_does_nothing() {
        let mut state = awake_state();
        let (mut link, log) = recording_link();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.hold();

        let result = dispatcher.execute("clean", &mut state, &mut link);
        assert_eq!(result, Err(CommandError::Busy));
        assert!(log.events().is_empty());
        assert!(!state.cleaning());
    }

    #[test]
    fn link_failure_is_reported() {
        let mut state = awake_state();
        let (mut link, log) = recording_link();
        log.fail_writes(true);

        let result = CommandDispatcher::new().execute("clean", &mut state, &mut link);
        assert!(matches!(result, Err(CommandError::Link(_))));
        assert!(!state.cleaning());
    }

    #[test]
    fn failed_writes_leave_flags_alone() {
        for line in ["clean", "toggle", "start_pause", "clean_spot", "turn_off"] {
            let mut state = awake_state();
            state.set_returning(true);
            let before = state.flags();
            let (mut link, log) = recording_link();
            log.fail_writes(true);

            let result = CommandDispatcher::new().execute(line, &mut state, &mut link);
            assert!(matches!(result, Err(CommandError::Link(_))), "{line}");
            assert_eq!(state.flags(), before, "{line}");
        }
    }
}
