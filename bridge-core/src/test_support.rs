//! Recording collaborators shared by the unit tests.

use core::time::Duration;
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use crate::journal::BridgeInstant;
use crate::protocol::BaudRate;
use crate::wake::{Delay, DeviceLink, SerialLink, WakeLine};

/// Milliseconds since an arbitrary epoch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockInstant(pub u64);

impl BridgeInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    LineLow,
    LineReleased,
    Write(Vec<u8>),
    Baud(BaudRate),
    Delay(Duration),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MockLinkError;

#[derive(Default)]
struct LogInner {
    events: Vec<LinkEvent>,
    fail_writes: bool,
}

/// Shared view of everything the recording collaborators observed.
#[derive(Clone, Default)]
pub struct LinkLog(Rc<RefCell<LogInner>>);

impl LinkLog {
    fn push(&self, event: LinkEvent) {
        self.0.borrow_mut().events.push(event);
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.0.borrow().events.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::Write(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    /// Every successfully written byte, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.writes().concat()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::Delay(duration) => Some(duration),
                _ => None,
            })
            .collect()
    }

    pub fn line_pulses(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == LinkEvent::LineLow)
            .count()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.borrow_mut().fail_writes = fail;
    }

    pub fn clear(&self) {
        self.0.borrow_mut().events.clear();
    }
}

pub struct RecordingSerial(LinkLog);
pub struct RecordingLine(LinkLog);
pub struct RecordingDelay(LinkLog);

impl SerialLink for RecordingSerial {
    type Error = MockLinkError;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.0.0.borrow().fail_writes {
            return Err(MockLinkError);
        }
        self.0.push(LinkEvent::Write(bytes.to_vec()));
        Ok(())
    }

    fn set_baud(&mut self, baud: BaudRate) -> Result<(), Self::Error> {
        self.0.push(LinkEvent::Baud(baud));
        Ok(())
    }
}

impl WakeLine for RecordingLine {
    fn assert_low(&mut self) {
        self.0.push(LinkEvent::LineLow);
    }

    fn release(&mut self) {
        self.0.push(LinkEvent::LineReleased);
    }
}

impl Delay for RecordingDelay {
    fn delay(&mut self, duration: Duration) {
        self.0.push(LinkEvent::Delay(duration));
    }
}

pub type RecordingLink = DeviceLink<RecordingSerial, RecordingLine, RecordingDelay>;

pub fn recording_link() -> (RecordingLink, LinkLog) {
    let log = LinkLog::default();
    let link = DeviceLink::new(
        RecordingSerial(log.clone()),
        RecordingLine(log.clone()),
        RecordingDelay(log.clone()),
    );
    (link, log)
}
