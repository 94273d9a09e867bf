//! Wake and keep-alive sequencing.
//!
//! The vacuum drops into a low-power sleep when idle and ignores the serial
//! port until its BRC line is pulsed low. Wake sequences are expressed as
//! static [`WakeTemplate`]s and executed against a [`DeviceLink`], which
//! bundles the three hardware seams the bridge needs: the wake line, the
//! serial link, and a blocking delay.

use core::{fmt, time::Duration};

use crate::protocol::{BaudRate, OperatingMode, Opcode};

pub mod templates;

pub use templates::{
    BASE_TEMPLATE, DOCK_TEMPLATE, LINE_HOLD, LINE_RELEASE, OFF_DOCK_TEMPLATE, template_for,
};

/// Open-drain BRC line toward the vacuum.
pub trait WakeLine {
    /// Drives the line low.
    fn assert_low(&mut self);
    /// Releases the line to high impedance.
    fn release(&mut self);
}

/// Byte-oriented serial port toward the vacuum.
pub trait SerialLink {
    type Error;

    /// Writes every byte or fails.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the write cannot complete.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reconfigures the local UART.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the peripheral rejects the rate.
    fn set_baud(&mut self, baud: BaudRate) -> Result<(), Self::Error>;
}

/// Bounded blocking sleep. The bridge loop stalls for the duration.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Everything the bridge uses to talk to the vacuum.
pub struct DeviceLink<L, P, D> {
    pub serial: L,
    pub line: P,
    pub delay: D,
}

impl<L, P, D> DeviceLink<L, P, D>
where
    L: SerialLink,
    P: WakeLine,
    D: Delay,
{
    pub const fn new(serial: L, line: P, delay: D) -> Self {
        Self {
            serial,
            line,
            delay,
        }
    }

    /// Writes raw bytes to the vacuum.
    ///
    /// # Errors
    ///
    /// Propagates the serial transport error.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), L::Error> {
        self.serial.write(bytes)
    }

    /// Writes a single opcode.
    ///
    /// # Errors
    ///
    /// Propagates the serial transport error.
    pub fn send_opcode(&mut self, opcode: Opcode) -> Result<(), L::Error> {
        self.serial.write(&[opcode.byte()])
    }

    /// Sleeps for `duration`; zero durations return immediately.
    pub fn settle(&mut self, duration: Duration) {
        if !duration.is_zero() {
            self.delay.delay(duration);
        }
    }

    /// Runs a wake template.
    ///
    /// `mode` is the last operating mode the vacuum reported and decides what
    /// the [`WakeAction::ModeNudge`] step sends.
    ///
    /// # Errors
    ///
    /// Returns [`WakeError::Link`] on the first failed write; the remaining
    /// steps are not executed.
    pub fn wake(
        &mut self,
        template: &WakeTemplate,
        mode: OperatingMode,
    ) -> Result<WakeReport, WakeError<L::Error>> {
        let mut nudge = ModeNudge::None;

        for step in template.steps {
            match step.action {
                WakeAction::AssertLine => self.line.assert_low(),
                WakeAction::ReleaseLine => self.line.release(),
                WakeAction::Write(opcode) => {
                    self.send_opcode(opcode).map_err(WakeError::Link)?;
                }
                WakeAction::ModeNudge => {
                    nudge = ModeNudge::for_mode(mode);
                    if let Some(opcode) = nudge.opcode() {
                        self.send_opcode(opcode).map_err(WakeError::Link)?;
                    }
                }
            }
            self.settle(step.hold_for);
        }

        Ok(WakeReport {
            kind: template.kind,
            nudge,
        })
    }
}

/// Identifies the wake variants.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeSequenceKind {
    /// Pulse the line and nudge the OI out of Off/Passive.
    Base,
    /// Base wake followed by a clean/dock kick for a vacuum sitting on its dock.
    Dock,
    /// Safe then Passive, keeping an undocked vacuum from sleeping.
    OffDock,
}

impl fmt::Display for WakeSequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeSequenceKind::Base => f.write_str("base"),
            WakeSequenceKind::Dock => f.write_str("dock"),
            WakeSequenceKind::OffDock => f.write_str("off-dock"),
        }
    }
}

/// Operation performed by one wake step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeAction {
    AssertLine,
    ReleaseLine,
    Write(Opcode),
    /// Mode-dependent opcode; see [`ModeNudge::for_mode`].
    ModeNudge,
}

/// One step of a wake template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WakeStep {
    pub action: WakeAction,
    /// Delay after the action before the next step starts.
    pub hold_for: Duration,
}

impl WakeStep {
    pub const fn new(action: WakeAction, hold_for: Duration) -> Self {
        Self { action, hold_for }
    }
}

/// Static description of a wake variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WakeTemplate {
    pub kind: WakeSequenceKind,
    pub steps: &'static [WakeStep],
}

impl WakeTemplate {
    pub const fn new(kind: WakeSequenceKind, steps: &'static [WakeStep]) -> Self {
        Self { kind, steps }
    }

    #[must_use]
    pub const fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Sum of every step's hold time.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|step| step.hold_for).sum()
    }
}

/// What the mode-nudge step sent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModeNudge {
    /// Safe, Full, or an unrecognised mode: the OI is already listening.
    None,
    /// Off: Start opens the interface.
    Start,
    /// Passive: Start again as a keep-alive, without escalating the mode.
    KeepAlive,
}

impl ModeNudge {
    #[must_use]
    pub const fn for_mode(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Off => ModeNudge::Start,
            OperatingMode::Passive => ModeNudge::KeepAlive,
            OperatingMode::Safe | OperatingMode::Full | OperatingMode::Unknown(_) => {
                ModeNudge::None
            }
        }
    }

    #[must_use]
    pub const fn opcode(self) -> Option<Opcode> {
        match self {
            ModeNudge::None => None,
            ModeNudge::Start | ModeNudge::KeepAlive => Some(Opcode::Start),
        }
    }
}

/// Summary of a completed wake run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WakeReport {
    pub kind: WakeSequenceKind,
    pub nudge: ModeNudge,
}

impl fmt::Display for WakeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nudge = match self.nudge {
            ModeNudge::None => "none",
            ModeNudge::Start => "start",
            ModeNudge::KeepAlive => "keep-alive",
        };
        write!(f, "{} nudge={nudge}", self.kind)
    }
}

/// Failure while running a wake template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeError<E> {
    Link(E),
}

impl<E> fmt::Display for WakeError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeError::Link(error) => write!(f, "serial link failed during wake: {error:?}"),
        }
    }
}
