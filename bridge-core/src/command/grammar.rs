//! `winnow` grammar for inbound command lines.

use core::{fmt, mem};

use winnow::ascii::{space0, space1};
use winnow::combinator::{alt, eof, peek, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;

/// Command names without their arguments.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandKind {
    Clean,
    TurnOff,
    Toggle,
    StartPause,
    Stop,
    CleanSpot,
    Locate,
    ReturnToBase,
    SendStatus,
    Packet,
    Sleep,
    Reboot,
}

impl CommandKind {
    /// Token that selects the command on the wire.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            CommandKind::Clean => "clean",
            CommandKind::TurnOff => "turn_off",
            CommandKind::Toggle => "toggle",
            CommandKind::StartPause => "start_pause",
            CommandKind::Stop => "stop",
            CommandKind::CleanSpot => "clean_spot",
            CommandKind::Locate => "locate",
            CommandKind::ReturnToBase => "return_to_base",
            CommandKind::SendStatus => "send_status",
            CommandKind::Packet => "packet",
            CommandKind::Sleep => "sleep",
            CommandKind::Reboot => "reboot",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Space-separated decimal byte list following `packet`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketArgs<'a>(&'a str);

impl<'a> PacketArgs<'a> {
    #[must_use]
    pub const fn new(raw: &'a str) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(&self) -> &'a str {
        self.0
    }

    /// Yields one byte per token, in order.
    ///
    /// Only spaces separate tokens; runs of spaces count as one.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + 'a {
        self.0
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(decimal_byte)
    }
}

/// A parsed command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    Clean,
    TurnOff,
    Toggle,
    StartPause,
    Stop,
    CleanSpot,
    Locate,
    ReturnToBase,
    SendStatus,
    Packet(PacketArgs<'a>),
    Sleep,
    Reboot,
}

impl Command<'_> {
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Command::Clean => CommandKind::Clean,
            Command::TurnOff => CommandKind::TurnOff,
            Command::Toggle => CommandKind::Toggle,
            Command::StartPause => CommandKind::StartPause,
            Command::Stop => CommandKind::Stop,
            Command::CleanSpot => CommandKind::CleanSpot,
            Command::Locate => CommandKind::Locate,
            Command::ReturnToBase => CommandKind::ReturnToBase,
            Command::SendStatus => CommandKind::SendStatus,
            Command::Packet(_) => CommandKind::Packet,
            Command::Sleep => CommandKind::Sleep,
            Command::Reboot => CommandKind::Reboot,
        }
    }
}

/// The line did not name a known command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UnrecognizedCommand;

impl fmt::Display for UnrecognizedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized command")
    }
}

/// Parses a command line. Trailing whitespace and line terminators are ignored.
///
/// # Errors
///
/// Returns [`UnrecognizedCommand`] for unknown tokens, mismatched case, or
/// extra arguments on anything other than `packet`.
pub fn parse_command(line: &str) -> Result<Command<'_>, UnrecognizedCommand> {
    command
        .parse(line.trim_end())
        .map_err(|_| UnrecognizedCommand)
}

fn keyword(input: &mut &str) -> Result<CommandKind, ContextError> {
    // Longer tokens first so `clean` does not shadow `clean_spot`.
    terminated(
        alt((
            "clean_spot".value(CommandKind::CleanSpot),
            "clean".value(CommandKind::Clean),
            "turn_off".value(CommandKind::TurnOff),
            "toggle".value(CommandKind::Toggle),
            "start_pause".value(CommandKind::StartPause),
            "stop".value(CommandKind::Stop),
            "locate".value(CommandKind::Locate),
            "return_to_base".value(CommandKind::ReturnToBase),
            "send_status".value(CommandKind::SendStatus),
            "packet".value(CommandKind::Packet),
            "sleep".value(CommandKind::Sleep),
            "reboot".value(CommandKind::Reboot),
        )),
        peek(alt((space1.void(), eof.void()))),
    )
    .parse_next(input)
}

fn command<'a>(input: &mut &'a str) -> Result<Command<'a>, ContextError> {
    let kind = keyword.parse_next(input)?;
    space0.parse_next(input)?;
    let remainder = mem::take(input);

    let command = match kind {
        CommandKind::Packet => Command::Packet(PacketArgs::new(remainder)),
        _ if !remainder.is_empty() => return Err(ContextError::new()),
        CommandKind::Clean => Command::Clean,
        CommandKind::TurnOff => Command::TurnOff,
        CommandKind::Toggle => Command::Toggle,
        CommandKind::StartPause => Command::StartPause,
        CommandKind::Stop => Command::Stop,
        CommandKind::CleanSpot => Command::CleanSpot,
        CommandKind::Locate => Command::Locate,
        CommandKind::ReturnToBase => Command::ReturnToBase,
        CommandKind::SendStatus => Command::SendStatus,
        CommandKind::Sleep => Command::Sleep,
        CommandKind::Reboot => Command::Reboot,
    };
    Ok(command)
}

/// C `atoi` reading of a token, truncated to a byte.
///
/// Leading whitespace is skipped, then an optional sign and leading decimal
/// digits are read; anything after them is ignored and a token without digits
/// reads as zero.
#[must_use]
pub fn decimal_byte(token: &str) -> u8 {
    let bytes = token.trim_ascii_start().as_bytes();
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };

    let magnitude = digits
        .iter()
        .take_while(|byte| byte.is_ascii_digit())
        .fold(0u32, |acc, digit| {
            acc.wrapping_mul(10).wrapping_add(u32::from(digit - b'0'))
        });
    let value = if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    };
    value.to_le_bytes()[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_keyword() {
        let fixtures = [
            ("clean", CommandKind::Clean),
            ("turn_off", CommandKind::TurnOff),
            ("toggle", CommandKind::Toggle),
            ("start_pause", CommandKind::StartPause),
            ("stop", CommandKind::Stop),
            ("clean_spot", CommandKind::CleanSpot),
            ("locate", CommandKind::Locate),
            ("return_to_base", CommandKind::ReturnToBase),
            ("send_status", CommandKind::SendStatus),
            ("packet", CommandKind::Packet),
            ("sleep", CommandKind::Sleep),
            ("reboot", CommandKind::Reboot),
        ];

        for (line, kind) in fixtures {
            assert_eq!(parse_command(line).map(|command| command.kind()), Ok(kind));
            assert_eq!(kind.token(), line);
        }
    }

    #[test]
    fn trailing_whitespace_is_ignored() {
        assert_eq!(parse_command("clean\r\n"), Ok(Command::Clean));
        assert_eq!(parse_command("stop  \t"), Ok(Command::Stop));
    }

    #[test]
    fn case_prefixes_and_extra_arguments_are_rejected() {
        for line in [
            "CLEAN",
            "Clean",
            "cleanx",
            "clean now",
            " clean",
            "",
            "packets 1",
            "dock",
        ] {
            assert_eq!(parse_command(line), Err(UnrecognizedCommand), "{line:?}");
        }
    }

    #[test]
    fn packet_keeps_its_arguments() {
        let Ok(Command::Packet(args)) = parse_command("packet 128  131\n") else {
            panic!("expected packet command");
        };
        assert_eq!(args.raw(), "128  131");
        assert_eq!(args.bytes().collect::<std::vec::Vec<_>>(), [128, 131]);

        let Ok(Command::Packet(args)) = parse_command("packet") else {
            panic!("expected packet command");
        };
        assert_eq!(args.bytes().count(), 0);
    }

    #[test]
    fn packet_tokens_split_on_spaces_only() {
        let Ok(Command::Packet(args)) = parse_command("packet 128\t2 7") else {
            panic!("expected packet command");
        };
        assert_eq!(args.bytes().collect::<std::vec::Vec<_>>(), [128, 7]);

        let Ok(Command::Packet(args)) = parse_command("packet \t9") else {
            panic!("expected packet command");
        };
        assert_eq!(args.bytes().collect::<std::vec::Vec<_>>(), [9]);
    }

    #[test]
    fn decimal_tokens_follow_atoi() {
        assert_eq!(decimal_byte("135"), 135);
        assert_eq!(decimal_byte("12abc"), 12);
        assert_eq!(decimal_byte("abc"), 0);
        assert_eq!(decimal_byte("-1"), 255);
        assert_eq!(decimal_byte("+7"), 7);
        assert_eq!(decimal_byte("256"), 0);
        assert_eq!(decimal_byte("300"), 44);
        assert_eq!(decimal_byte(""), 0);
        assert_eq!(decimal_byte("\t42"), 42);
    }
}
