//! Debug-console commands.
//!
//! These are reachable only from the local console, never from the bus. The
//! bridge tries every console line as a regular command first and falls back
//! to [`parse_console`] when the dispatcher does not recognise it.

use core::{fmt, time::Duration};

use winnow::combinator::{alt, eof, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::journal::BridgeInstant;
use crate::protocol::{self, BaudRate, Opcode};
use crate::state::DeviceState;
use crate::wake::{Delay, DeviceLink, SerialLink, WakeError, WakeLine, WakeReport, WakeSequenceKind, template_for};

/// Settle after reconfiguring the local UART.
pub const BAUD_SETTLE: Duration = Duration::from_millis(100);

/// Direct OI mode requests.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModeRequest {
    Passive,
    Safe,
    Full,
}

impl ModeRequest {
    #[must_use]
    pub const fn opcode(self) -> Opcode {
        match self {
            ModeRequest::Passive => Opcode::Start,
            ModeRequest::Safe => Opcode::Safe,
            ModeRequest::Full => Opcode::Full,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    /// Stop opcode; the vacuum closes the OI.
    Quit,
    /// Reset opcode; the vacuum reboots.
    ResetDevice,
    Version,
    Baud(BaudRate),
    Wake(WakeSequenceKind),
    Mode(ModeRequest),
    Stream,
    StreamPause,
    StreamResume,
    StreamReset,
    Restart,
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::Quit => f.write_str("quit"),
            ConsoleCommand::ResetDevice => f.write_str("rreset"),
            ConsoleCommand::Version => f.write_str("version"),
            ConsoleCommand::Baud(rate) => write!(f, "baud{}", rate.bits_per_second()),
            ConsoleCommand::Wake(WakeSequenceKind::Base) => f.write_str("wake"),
            ConsoleCommand::Wake(WakeSequenceKind::Dock) => f.write_str("wake2"),
            ConsoleCommand::Wake(WakeSequenceKind::OffDock) => f.write_str("wake3"),
            ConsoleCommand::Mode(ModeRequest::Passive) => f.write_str("oipassive"),
            ConsoleCommand::Mode(ModeRequest::Safe) => f.write_str("oisafe"),
            ConsoleCommand::Mode(ModeRequest::Full) => f.write_str("oifull"),
            ConsoleCommand::Stream => f.write_str("stream"),
            ConsoleCommand::StreamPause => f.write_str("streampause"),
            ConsoleCommand::StreamResume => f.write_str("streamresume"),
            ConsoleCommand::StreamReset => f.write_str("streamreset"),
            ConsoleCommand::Restart => f.write_str("esprestart"),
        }
    }
}

/// What a console command produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleOutcome {
    Executed,
    Woke(WakeReport),
    /// `version`: the caller prints the build stamp.
    Version,
    /// `esprestart`: the caller restarts.
    Restart,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError<E> {
    Unknown,
    Busy,
    Link(E),
}

impl<E> From<WakeError<E>> for ConsoleError<E> {
    fn from(value: WakeError<E>) -> Self {
        match value {
            WakeError::Link(error) => ConsoleError::Link(error),
        }
    }
}

impl<E> fmt::Display for ConsoleError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Unknown => f.write_str("unknown command"),
            ConsoleError::Busy => f.write_str("firmware update in progress"),
            ConsoleError::Link(error) => write!(f, "serial link error: {error:?}"),
        }
    }
}

/// Parses a console-only command line.
///
/// # Errors
///
/// Returns [`ConsoleError::Unknown`] for anything outside the console table.
pub fn parse_console<E>(line: &str) -> Result<ConsoleCommand, ConsoleError<E>> {
    console_command
        .parse(line.trim_end())
        .map_err(|_| ConsoleError::Unknown)
}

fn console_command(input: &mut &str) -> Result<ConsoleCommand, ContextError> {
    terminated(
        alt((
            "quit".value(ConsoleCommand::Quit),
            "rreset".value(ConsoleCommand::ResetDevice),
            "version".value(ConsoleCommand::Version),
            "baud115200".value(ConsoleCommand::Baud(BaudRate::B115200)),
            "baud57600".value(ConsoleCommand::Baud(BaudRate::B57600)),
            "baud38400".value(ConsoleCommand::Baud(BaudRate::B38400)),
            "baud19200".value(ConsoleCommand::Baud(BaudRate::B19200)),
            "wake2".value(ConsoleCommand::Wake(WakeSequenceKind::Dock)),
            "wake3".value(ConsoleCommand::Wake(WakeSequenceKind::OffDock)),
            "wake".value(ConsoleCommand::Wake(WakeSequenceKind::Base)),
            alt(("oipassive", "OIPassive")).value(ConsoleCommand::Mode(ModeRequest::Passive)),
            alt(("oisafe", "OISafe")).value(ConsoleCommand::Mode(ModeRequest::Safe)),
            alt(("oifull", "OIFull")).value(ConsoleCommand::Mode(ModeRequest::Full)),
            "streampause".value(ConsoleCommand::StreamPause),
            "streamresume".value(ConsoleCommand::StreamResume),
            "streamreset".value(ConsoleCommand::StreamReset),
            "stream".value(ConsoleCommand::Stream),
            "esprestart".value(ConsoleCommand::Restart),
        )),
        eof,
    )
    .parse_next(input)
}

/// Executes a parsed console command.
///
/// # Errors
///
/// Returns [`ConsoleError::Link`] when a serial write or baud change fails.
pub fn run_console<I, L, P, D>(
    command: ConsoleCommand,
    state: &DeviceState<I>,
    link: &mut DeviceLink<L, P, D>,
) -> Result<ConsoleOutcome, ConsoleError<L::Error>>
where
    I: BridgeInstant,
    L: SerialLink,
    P: WakeLine,
    D: Delay,
{
    match command {
        ConsoleCommand::Quit => link.send_opcode(Opcode::Stop).map_err(ConsoleError::Link)?,
        ConsoleCommand::ResetDevice => {
            link.send_opcode(Opcode::Reset).map_err(ConsoleError::Link)?;
        }
        ConsoleCommand::Version => return Ok(ConsoleOutcome::Version),
        ConsoleCommand::Baud(rate) => {
            link.serial.set_baud(rate).map_err(ConsoleError::Link)?;
            link.settle(BAUD_SETTLE);
        }
        ConsoleCommand::Wake(kind) => {
            let report = link.wake(template_for(kind), state.telemetry().mode)?;
            return Ok(ConsoleOutcome::Woke(report));
        }
        ConsoleCommand::Mode(request) => {
            link.send_opcode(request.opcode())
                .map_err(ConsoleError::Link)?;
        }
        ConsoleCommand::Stream => {
            link.send(&protocol::stream_request())
                .map_err(ConsoleError::Link)?;
        }
        ConsoleCommand::StreamPause => {
            link.send(&protocol::STREAM_PAUSE).map_err(ConsoleError::Link)?;
        }
        ConsoleCommand::StreamResume => {
            link.send(&protocol::STREAM_RESUME)
                .map_err(ConsoleError::Link)?;
        }
        ConsoleCommand::StreamReset => {
            link.send(&protocol::STREAM_RESET).map_err(ConsoleError::Link)?;
        }
        ConsoleCommand::Restart => return Ok(ConsoleOutcome::Restart),
    }
    Ok(ConsoleOutcome::Executed)
}
