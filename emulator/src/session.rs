use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bridge_core::bridge::{ConsoleReply, LoopSignal};
use bridge_core::bus::{LastWill, MessageBus, NetworkInfo};
use bridge_core::console::ConsoleOutcome;
use bridge_core::journal::RecordId;
use bridge_core::status::Payload;
use bridge_core::wake::DeviceLink;
use bridge_core::{Bridge, BridgeConfig};

use crate::sim::{
    Activity, SharedRoomba, SimDelay, SimLine, SimSerial, SimulatedRoomba, VirtualClock,
    VirtualInstant,
};

/// Upper bound for a single `advance`.
const MAX_ADVANCE_SECONDS: u64 = 24 * 60 * 60;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "advance",
        "advance <seconds>               - run the bridge loop on virtual time",
    ),
    (
        "mqtt",
        "mqtt <command>                  - deliver a command on the bus command topic",
    ),
    (
        "bus",
        "bus <up|down>                   - bring the broker up or drop it",
    ),
    (
        "vacuum",
        "vacuum <idle|clean|dock|battery <pct>> - change the simulated vacuum",
    ),
    (
        "ota",
        "ota                             - hold the bridge for a firmware update",
    ),
    (
        "status",
        "status                          - show bridge and vacuum state",
    ),
    (
        "console",
        "<anything else>                 - bridge console (clean, wake2, stream, version, ...)",
    ),
    (
        "help",
        "help [topic]                    - show help for a command",
    ),
];

/// How a line of session output should be presented.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineKind {
    Reply,
    Published,
    Event,
    Warning,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputLine {
    pub kind: LineKind,
    pub text: String,
}

impl OutputLine {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub hostname: String,
    pub dock_wake: bool,
    pub transcript: Option<PathBuf>,
}

type EmulatorBridge<'c> = Bridge<'c, VirtualInstant, SimSerial, SimLine, SimDelay>;

pub struct Session<'c> {
    config: BridgeConfig<'c>,
    bridge: EmulatorBridge<'c>,
    roomba: SharedRoomba,
    clock: VirtualClock,
    bus: ConsoleBus,
    network: HostNetwork<'c>,
    cursor: RecordId,
    restarts: usize,
    transcript: Option<TranscriptLogger>,
}

impl<'c> Session<'c> {
    pub fn new(options: &'c SessionOptions) -> io::Result<Self> {
        let config = BridgeConfig::new()
            .with_hostname(&options.hostname)
            .with_dock_wake(options.dock_wake);
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;

        let roomba: SharedRoomba = Rc::new(RefCell::new(SimulatedRoomba::default()));
        let clock = VirtualClock::default();
        let bridge = Self::boot(config, &roomba, &clock);

        Ok(Self {
            config,
            bridge,
            roomba,
            clock,
            bus: ConsoleBus::default(),
            network: HostNetwork {
                hostname: &options.hostname,
            },
            cursor: 0,
            restarts: 0,
            transcript,
        })
    }

    fn boot(
        config: BridgeConfig<'c>,
        roomba: &SharedRoomba,
        clock: &VirtualClock,
    ) -> EmulatorBridge<'c> {
        let link = DeviceLink::new(
            SimSerial(Rc::clone(roomba)),
            SimLine(Rc::clone(roomba)),
            SimDelay(clock.clone()),
        );
        let mut bridge = Bridge::new(config, link);
        // The simulated link cannot fail.
        let _ = bridge.begin(clock.now());
        bridge
    }

    pub fn bridge(&self) -> &EmulatorBridge<'c> {
        &self.bridge
    }

    pub fn roomba(&self) -> std::cell::Ref<'_, SimulatedRoomba> {
        self.roomba.borrow()
    }

    /// Output produced by start-up, before any command was typed.
    pub fn drain_startup(&mut self) -> io::Result<Vec<OutputLine>> {
        let lines = self.collect(Vec::new());
        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<OutputLine>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let at = self.clock.now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(at, TranscriptRole::Host, trimmed)?;
        }

        let (word, rest) = trimmed
            .split_once(' ')
            .map_or((trimmed, ""), |(word, rest)| (word, rest.trim()));
        let replies = match word {
            "help" => Self::help(Some(rest).filter(|topic| !topic.is_empty())),
            "advance" => self.advance(rest),
            "mqtt" => self.deliver(rest),
            "bus" => self.set_broker(rest),
            "vacuum" => self.change_vacuum(rest),
            "ota" => self.firmware_update(),
            "status" => self.describe(),
            _ => self.console(trimmed),
        };

        let lines = self.collect(replies);
        self.record_output(&lines)?;
        Ok(lines)
    }

    fn help(topic: Option<&str>) -> Vec<OutputLine> {
        match topic {
            Some(target) => {
                if let Some((_, detail)) = HELP_TOPICS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(target))
                {
                    vec![OutputLine::new(LineKind::Reply, *detail)]
                } else {
                    vec![
                        OutputLine::new(
                            LineKind::Error,
                            format!("No help available for `{target}`."),
                        ),
                        OutputLine::new(
                            LineKind::Reply,
                            format!("Available topics: {}", help_topic_list()),
                        ),
                    ]
                }
            }
            None => {
                let mut lines = vec![OutputLine::new(LineKind::Reply, "Available commands:")];
                for (_, detail) in HELP_TOPICS {
                    lines.push(OutputLine::new(LineKind::Reply, format!("  {detail}")));
                }
                lines
            }
        }
    }

    fn advance(&mut self, argument: &str) -> Vec<OutputLine> {
        let Ok(seconds) = argument.parse::<u64>() else {
            return vec![OutputLine::new(
                LineKind::Error,
                "ERR usage: advance <seconds>",
            )];
        };
        let seconds = seconds.min(MAX_ADVANCE_SECONDS);

        for _ in 0..seconds {
            self.clock.advance(Duration::from_secs(1));
            let bytes = {
                let mut roomba = self.roomba.borrow_mut();
                roomba.tick_second();
                roomba.drain_output()
            };
            let now = self.clock.now();
            self.bridge.ingest_serial(&bytes, now);
            self.bridge.poll_timers(now, &mut self.bus, &self.network);
        }

        vec![OutputLine::new(
            LineKind::Reply,
            format!("OK advanced {seconds}s now=+{}ms", self.clock.now().0),
        )]
    }

    fn deliver(&mut self, payload: &str) -> Vec<OutputLine> {
        let topic = self.config.topics.command;
        let signal =
            self.bridge
                .handle_bus_message(topic, payload.as_bytes(), self.clock.now(), &mut self.bus);
        let mut lines = vec![OutputLine::new(
            LineKind::Reply,
            format!("OK delivered on {topic}"),
        )];
        if signal == LoopSignal::Restart {
            lines.push(self.restart());
        }
        lines
    }

    fn set_broker(&mut self, argument: &str) -> Vec<OutputLine> {
        match argument {
            "up" => {
                self.bus.broker_up = true;
                vec![OutputLine::new(LineKind::Reply, "OK broker up")]
            }
            "down" => {
                self.bus.drop_connection();
                vec![OutputLine::new(LineKind::Reply, "OK broker down")]
            }
            _ => vec![OutputLine::new(LineKind::Error, "ERR usage: bus <up|down>")],
        }
    }

    fn change_vacuum(&mut self, argument: &str) -> Vec<OutputLine> {
        let mut roomba = self.roomba.borrow_mut();
        match argument.split_once(' ') {
            Some(("battery", percent)) => match percent.trim().parse::<u8>() {
                Ok(percent) => {
                    roomba.set_battery_percent(percent);
                    vec![OutputLine::new(
                        LineKind::Reply,
                        format!("OK battery {}%", percent.min(100)),
                    )]
                }
                Err(_) => vec![OutputLine::new(
                    LineKind::Error,
                    "ERR usage: vacuum battery <0-100>",
                )],
            },
            _ => {
                let activity = match argument {
                    "idle" => Activity::Idle,
                    "clean" => Activity::Cleaning,
                    "dock" => Activity::Docked,
                    _ => {
                        return vec![OutputLine::new(
                            LineKind::Error,
                            "ERR usage: vacuum <idle|clean|dock|battery <pct>>",
                        )];
                    }
                };
                roomba.set_activity(activity);
                vec![OutputLine::new(
                    LineKind::Reply,
                    format!("OK vacuum {activity:?}"),
                )]
            }
        }
    }

    fn firmware_update(&mut self) -> Vec<OutputLine> {
        let _ = self.bridge.begin_firmware_update(self.clock.now());
        vec![OutputLine::new(
            LineKind::Reply,
            "OK firmware update hold; restart to resume",
        )]
    }

    fn describe(&self) -> Vec<OutputLine> {
        let state = self.bridge.state();
        let roomba = self.roomba.borrow();
        let battery = state
            .battery_percent()
            .map_or_else(|| "?".to_owned(), |level| format!("{level}%"));
        vec![
            OutputLine::new(
                LineKind::Reply,
                format!(
                    "bridge cleaning={} docked={} returning={} battery={battery} held={} wakeups-stopped={} restarts={}",
                    state.cleaning(),
                    state.docked(),
                    state.returning(),
                    self.bridge.is_held(),
                    self.bridge.wakeups_stopped(),
                    self.restarts,
                ),
            ),
            OutputLine::new(
                LineKind::Reply,
                format!(
                    "vacuum activity={:?} mode={:?} streaming={} baud={}",
                    roomba.activity(),
                    roomba.mode(),
                    roomba.is_streaming(),
                    roomba.baud().bits_per_second(),
                ),
            ),
            OutputLine::new(
                LineKind::Reply,
                format!(
                    "bus broker={} connected={}",
                    if self.bus.broker_up { "up" } else { "down" },
                    self.bus.connected,
                ),
            ),
        ]
    }

    fn console(&mut self, line: &str) -> Vec<OutputLine> {
        let reply = self
            .bridge
            .handle_console(line, self.clock.now(), &mut self.bus);
        match reply {
            Ok(reply) => {
                let mut lines = vec![self.describe_reply(reply)];
                if reply.signal() == LoopSignal::Restart {
                    lines.push(self.restart());
                }
                lines
            }
            Err(error) => vec![OutputLine::new(LineKind::Error, format!("ERR {error}"))],
        }
    }

    fn describe_reply(&self, reply: ConsoleReply) -> OutputLine {
        let text = match reply {
            ConsoleReply::Command(dispatched) => format!(
                "OK {} {} wake={}",
                dispatched.kind, dispatched.outcome, dispatched.wake
            ),
            ConsoleReply::Console {
                outcome: ConsoleOutcome::Version,
                ..
            } => format!("version {}", self.config.build),
            ConsoleReply::Console {
                command,
                outcome: ConsoleOutcome::Woke(report),
            } => format!("OK {command} {report}"),
            ConsoleReply::Console { command, .. } => format!("OK {command}"),
        };
        OutputLine::new(LineKind::Reply, text)
    }

    fn restart(&mut self) -> OutputLine {
        self.restarts += 1;
        self.bus.drop_connection();
        self.bus.broker_up = true;
        self.bridge = Self::boot(self.config, &self.roomba, &self.clock);
        self.cursor = 0;
        OutputLine::new(LineKind::Warning, "bridge restarted")
    }

    /// Appends the bus traffic and journal records produced since the last
    /// call to `replies`.
    fn collect(&mut self, mut replies: Vec<OutputLine>) -> Vec<OutputLine> {
        for message in self.bus.outbox.drain(..) {
            replies.push(OutputLine::new(LineKind::Published, message));
        }

        let journal = self.bridge.journal();
        for record in journal.since(self.cursor) {
            let kind = if record.event.is_warning() {
                LineKind::Warning
            } else {
                LineKind::Event
            };
            replies.push(OutputLine::new(
                kind,
                format!("[+{:>7} ms] {}", record.timestamp.0, record.event),
            ));
        }
        self.cursor = journal.cursor();
        replies
    }

    fn record_output(&mut self, lines: &[OutputLine]) -> io::Result<()> {
        let at = self.clock.now();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(at, TranscriptRole::Emulator, &line.text)?;
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BrokerDown;

/// Bus client that reports traffic to the terminal.
struct ConsoleBus {
    broker_up: bool,
    connected: bool,
    will: Option<(String, String)>,
    outbox: Vec<String>,
}

impl Default for ConsoleBus {
    fn default() -> Self {
        Self {
            broker_up: true,
            connected: false,
            will: None,
            outbox: Vec::new(),
        }
    }
}

impl ConsoleBus {
    /// Drops the session; the broker delivers the last will.
    fn drop_connection(&mut self) {
        self.broker_up = false;
        if self.connected {
            self.connected = false;
            if let Some((topic, payload)) = self.will.take() {
                self.outbox
                    .push(format!("PUB {topic} (retained, last will) {payload}"));
            }
        }
    }
}

impl MessageBus for ConsoleBus {
    type Error = BrokerDown;

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, client: &str, will: LastWill<'_>) -> Result<(), Self::Error> {
        if !self.broker_up {
            return Err(BrokerDown);
        }
        self.connected = true;
        self.will = Some((will.topic.to_owned(), will.payload.to_owned()));
        self.outbox.push(format!(
            "CONNECT {client} will={}:{}",
            will.topic, will.payload
        ));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(BrokerDown);
        }
        self.outbox.push(format!("SUB {topic}"));
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &Payload<'_>,
        retained: bool,
    ) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(BrokerDown);
        }
        let flag = if retained { " (retained)" } else { "" };
        self.outbox.push(format!("PUB {topic}{flag} {payload}"));
        Ok(())
    }
}

struct HostNetwork<'a> {
    hostname: &'a str,
}

impl NetworkInfo for HostNetwork<'_> {
    fn hostname(&self) -> &str {
        self.hostname
    }

    fn ip_address(&self) -> &str {
        "127.0.0.1"
    }

    fn rssi(&self) -> i32 {
        0
    }

    fn ssid(&self) -> &str {
        "emulator"
    }

    fn mac_address(&self) -> &str {
        "02:00:00:00:00:01"
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# Vacuum bridge emulator transcript")?;
        writeln!(logger.writer, "# Timestamps are virtual milliseconds")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(
        &mut self,
        at: VirtualInstant,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(self.writer, "[+{:>7} ms] {} {}", at.0, role.prefix(), line)?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}
