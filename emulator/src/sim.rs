//! Simulated vacuum on the far side of the serial link.
//!
//! The simulator interprets the opcodes the bridge writes, tracks a coarse
//! activity model, and streams telemetry frames back once a stream has been
//! requested.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use bridge_core::BridgeInstant;
use bridge_core::protocol::{
    BaudRate, ChargingSources, ChargingState, OperatingMode, Opcode, STREAM_FIELDS,
};
use bridge_core::telemetry::{RawTelemetrySnapshot, encode_frame, encode_payload};
use bridge_core::wake::{Delay, SerialLink, WakeLine};

/// Milliseconds of virtual time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct VirtualInstant(pub u64);

impl BridgeInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Shared virtual clock. Link delays advance it.
#[derive(Clone, Default)]
pub struct VirtualClock(Rc<Cell<u64>>);

impl VirtualClock {
    pub fn now(&self) -> VirtualInstant {
        VirtualInstant(self.0.get())
    }

    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.0.set(self.0.get().saturating_add(millis));
    }
}

/// What the vacuum is physically doing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Activity {
    Idle,
    Cleaning,
    Returning,
    Docked,
}

const FULL_CHARGE: i16 = 2_600;
const CAPACITY: u16 = 2_600;
/// Charge used per virtual second of cleaning.
const DRAIN_PER_SECOND: i16 = 2;
/// Charge gained per virtual second on the dock.
const CHARGE_PER_SECOND: i16 = 4;
/// Seconds the vacuum needs to find its dock.
const RETURN_SECONDS: u32 = 20;

/// Pending multi-byte opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Pending {
    None,
    /// Skip this many argument bytes.
    Skip(usize),
    /// `148 n`: the id count is next.
    StreamCount,
    /// `148 n ids`: this many ids remain.
    StreamIds(usize),
    /// `150 x`: pause or resume flag is next.
    PauseResume,
    /// `140 id n`: the song header is next.
    SongHeader { seen: u8 },
}

pub struct SimulatedRoomba {
    mode: OperatingMode,
    asleep: bool,
    activity: Activity,
    charge: i16,
    streaming: bool,
    stream_paused: bool,
    return_elapsed: u32,
    baud: BaudRate,
    pending: Pending,
    outbox: VecDeque<u8>,
}

impl Default for SimulatedRoomba {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Off,
            asleep: true,
            activity: Activity::Docked,
            charge: FULL_CHARGE,
            streaming: false,
            stream_paused: false,
            return_elapsed: 0,
            baud: BaudRate::B115200,
            pending: Pending::None,
            outbox: VecDeque::new(),
        }
    }
}

impl SimulatedRoomba {
    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming && !self.stream_paused
    }

    pub fn baud(&self) -> BaudRate {
        self.baud
    }

    pub fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
        self.return_elapsed = 0;
    }

    /// Sets remaining charge as a percentage of capacity.
    pub fn set_battery_percent(&mut self, percent: u8) {
        let charge = u32::from(CAPACITY) * u32::from(percent.min(100)) / 100;
        self.charge = i16::try_from(charge).unwrap_or(FULL_CHARGE);
    }

    fn pulse(&mut self) {
        self.asleep = false;
    }

    fn receive(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.receive_byte(*byte);
        }
    }

    fn receive_byte(&mut self, byte: u8) {
        match self.pending {
            Pending::Skip(remaining) => {
                self.pending = if remaining > 1 {
                    Pending::Skip(remaining - 1)
                } else {
                    Pending::None
                };
                return;
            }
            Pending::StreamCount => {
                let count = usize::from(byte);
                self.streaming = count > 0;
                self.stream_paused = false;
                self.pending = if count > 0 {
                    Pending::StreamIds(count)
                } else {
                    Pending::None
                };
                return;
            }
            Pending::StreamIds(remaining) => {
                self.pending = if remaining > 1 {
                    Pending::StreamIds(remaining - 1)
                } else {
                    Pending::None
                };
                return;
            }
            Pending::PauseResume => {
                self.stream_paused = byte == 0;
                self.pending = Pending::None;
                return;
            }
            Pending::SongHeader { seen } => {
                if seen == 0 {
                    self.pending = Pending::SongHeader { seen: 1 };
                } else {
                    let notes = usize::from(byte) * 2;
                    self.pending = if notes == 0 {
                        Pending::None
                    } else {
                        Pending::Skip(notes)
                    };
                }
                return;
            }
            Pending::None => {}
        }

        let Some(opcode) = Opcode::from_byte(byte) else {
            return;
        };
        if self.asleep && opcode != Opcode::Start {
            return;
        }
        match opcode {
            Opcode::Start => {
                self.asleep = false;
                if self.mode == OperatingMode::Off {
                    self.mode = OperatingMode::Passive;
                }
            }
            Opcode::Reset | Opcode::Stop => {
                self.mode = OperatingMode::Off;
                self.streaming = false;
            }
            Opcode::Baud => self.pending = Pending::Skip(1),
            Opcode::Passive => self.mode = OperatingMode::Passive,
            Opcode::Safe => self.mode = OperatingMode::Safe,
            Opcode::Full => self.mode = OperatingMode::Full,
            Opcode::Power => {
                self.mode = OperatingMode::Passive;
                if self.activity != Activity::Docked {
                    self.activity = Activity::Idle;
                }
            }
            Opcode::Spot | Opcode::Max => {
                self.mode = OperatingMode::Passive;
                self.activity = Activity::Cleaning;
            }
            Opcode::Clean => {
                self.mode = OperatingMode::Passive;
                self.activity = match self.activity {
                    Activity::Cleaning | Activity::Returning => Activity::Idle,
                    Activity::Idle | Activity::Docked => Activity::Cleaning,
                };
            }
            Opcode::Dock => {
                self.mode = OperatingMode::Passive;
                if self.activity != Activity::Docked {
                    self.activity = Activity::Returning;
                    self.return_elapsed = 0;
                }
            }
            Opcode::Song => self.pending = Pending::SongHeader { seen: 0 },
            Opcode::Play | Opcode::Sensors => self.pending = Pending::Skip(1),
            Opcode::Stream => self.pending = Pending::StreamCount,
            Opcode::PauseResumeStream => self.pending = Pending::PauseResume,
        }
    }

    /// Advances the physical model by one virtual second and queues a
    /// telemetry frame when streaming.
    pub fn tick_second(&mut self) {
        match self.activity {
            Activity::Cleaning => {
                self.charge = self.charge.saturating_sub(DRAIN_PER_SECOND).max(0);
            }
            Activity::Returning => {
                self.charge = self.charge.saturating_sub(1).max(0);
                self.return_elapsed += 1;
                if self.return_elapsed >= RETURN_SECONDS {
                    self.activity = Activity::Docked;
                }
            }
            Activity::Docked => {
                self.charge = self.charge.saturating_add(CHARGE_PER_SECOND).min(FULL_CHARGE);
            }
            Activity::Idle => {}
        }

        if self.is_streaming() {
            self.queue_frame();
        }
    }

    pub fn snapshot(&self) -> RawTelemetrySnapshot {
        let (current, distance) = match self.activity {
            Activity::Cleaning => (-900, 35),
            Activity::Returning => (-450, 50),
            Activity::Docked => (450, 0),
            Activity::Idle => (-150, 0),
        };
        let docked = self.activity == Activity::Docked;
        let voltage = 13_000 + u16::try_from(self.charge.max(0)).unwrap_or(0);
        RawTelemetrySnapshot {
            distance,
            charging_state: if docked {
                ChargingState::Trickle
            } else {
                ChargingState::NotCharging
            },
            voltage,
            current,
            temperature: 27,
            charge: self.charge,
            capacity: CAPACITY,
            charging_sources: ChargingSources(if docked { 2 } else { 0 }),
            mode: self.mode,
            ..RawTelemetrySnapshot::default()
        }
    }

    fn queue_frame(&mut self) {
        let Ok(payload) = encode_payload::<64>(&self.snapshot(), &STREAM_FIELDS) else {
            return;
        };
        if let Some(frame) = encode_frame::<96>(&payload) {
            self.outbox.extend(frame.iter().copied());
        }
    }

    /// Drains the bytes queued for the bridge.
    pub fn drain_output(&mut self) -> Vec<u8> {
        self.outbox.drain(..).collect()
    }
}

pub type SharedRoomba = Rc<RefCell<SimulatedRoomba>>;

pub struct SimSerial(pub SharedRoomba);

impl SerialLink for SimSerial {
    type Error = std::convert::Infallible;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().receive(bytes);
        Ok(())
    }

    fn set_baud(&mut self, baud: BaudRate) -> Result<(), Self::Error> {
        self.0.borrow_mut().baud = baud;
        Ok(())
    }
}

pub struct SimLine(pub SharedRoomba);

impl WakeLine for SimLine {
    fn assert_low(&mut self) {
        self.0.borrow_mut().pulse();
    }

    fn release(&mut self) {}
}

/// Advances the virtual clock instead of sleeping.
pub struct SimDelay(pub VirtualClock);

impl Delay for SimDelay {
    fn delay(&mut self, duration: Duration) {
        self.0.advance(duration);
    }
}
