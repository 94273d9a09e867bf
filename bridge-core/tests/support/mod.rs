//! Host collaborators for the bridge scenarios.
#![allow(dead_code)]

use core::time::Duration;
use std::cell::RefCell;
use std::rc::Rc;

use bridge_core::bus::{LastWill, MessageBus, NetworkInfo};
use bridge_core::protocol::{BaudRate, STREAM_FIELDS};
use bridge_core::status::Payload;
use bridge_core::telemetry::{RawTelemetrySnapshot, encode_frame, encode_payload};
use bridge_core::wake::{Delay, DeviceLink, SerialLink, WakeLine};
use bridge_core::{Bridge, BridgeConfig, BridgeInstant};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct TestInstant(pub u64);

impl TestInstant {
    pub fn secs(secs: u64) -> Self {
        Self(secs * 1_000)
    }

    pub fn plus_ms(self, ms: u64) -> Self {
        Self(self.0 + ms)
    }
}

impl BridgeInstant for TestInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WireError;

#[derive(Default)]
pub struct WireLog {
    pub written: Vec<u8>,
    pub line_pulses: usize,
    pub baud: Option<BaudRate>,
    pub fail: bool,
}

#[derive(Clone, Default)]
pub struct Wire(Rc<RefCell<WireLog>>);

impl Wire {
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn line_pulses(&self) -> usize {
        self.0.borrow().line_pulses
    }

    pub fn clear(&self) {
        let mut log = self.0.borrow_mut();
        log.written.clear();
        log.line_pulses = 0;
    }

    pub fn fail(&self, fail: bool) {
        self.0.borrow_mut().fail = fail;
    }
}

pub struct WireSerial(Wire);
pub struct WireLine(Wire);
pub struct NoDelay;

impl SerialLink for WireSerial {
    type Error = WireError;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut log = self.0.0.borrow_mut();
        if log.fail {
            return Err(WireError);
        }
        log.written.extend_from_slice(bytes);
        Ok(())
    }

    fn set_baud(&mut self, baud: BaudRate) -> Result<(), Self::Error> {
        self.0.0.borrow_mut().baud = Some(baud);
        Ok(())
    }
}

impl WakeLine for WireLine {
    fn assert_low(&mut self) {
        self.0.0.borrow_mut().line_pulses += 1;
    }

    fn release(&mut self) {}
}

impl Delay for NoDelay {
    fn delay(&mut self, _duration: Duration) {}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusError;

#[derive(Default)]
pub struct TestBus {
    pub connected: bool,
    pub refuse_connect: bool,
    pub refuse_publish: bool,
    pub client: Option<String>,
    pub will: Option<(String, String, bool)>,
    pub subscriptions: Vec<String>,
    pub published: Vec<Published>,
}

impl TestBus {
    pub fn on(&self, topic: &str) -> Vec<&Published> {
        self.published
            .iter()
            .filter(|message| message.topic == topic)
            .collect()
    }
}

impl MessageBus for TestBus {
    type Error = BusError;

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, client: &str, will: LastWill<'_>) -> Result<(), Self::Error> {
        if self.refuse_connect {
            return Err(BusError);
        }
        self.client = Some(client.to_owned());
        self.will = Some((will.topic.to_owned(), will.payload.to_owned(), will.retained));
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &Payload<'_>,
        retained: bool,
    ) -> Result<(), Self::Error> {
        if !self.connected || self.refuse_publish {
            return Err(BusError);
        }
        self.published.push(Published {
            topic: topic.to_owned(),
            payload: payload.to_string(),
            retained,
        });
        Ok(())
    }
}

pub struct TestNetwork;

impl NetworkInfo for TestNetwork {
    fn hostname(&self) -> &str {
        "roomba"
    }

    fn ip_address(&self) -> &str {
        "192.168.1.40"
    }

    fn rssi(&self) -> i32 {
        -61
    }

    fn ssid(&self) -> &str {
        "attic"
    }

    fn mac_address(&self) -> &str {
        "24:0A:C4:00:11:22"
    }
}

pub type TestBridge = Bridge<'static, TestInstant, WireSerial, WireLine, NoDelay>;

pub fn bridge(config: BridgeConfig<'static>) -> (TestBridge, Wire) {
    let wire = Wire::default();
    let link = DeviceLink::new(WireSerial(wire.clone()), WireLine(wire.clone()), NoDelay);
    (Bridge::new(config, link), wire)
}

/// Frames `snapshot` the way the vacuum streams it.
pub fn stream_frame(snapshot: &RawTelemetrySnapshot) -> Vec<u8> {
    let payload =
        encode_payload::<64>(snapshot, &STREAM_FIELDS).expect("stream payload fits");
    encode_frame::<96>(&payload)
        .expect("frame fits")
        .to_vec()
}

/// Wraps an arbitrary payload in a stream frame.
pub fn raw_frame(payload: &[u8]) -> Vec<u8> {
    encode_frame::<96>(payload).expect("frame fits").to_vec()
}

/// Idle on the floor, awake in passive mode, half charged.
pub fn idle_snapshot() -> RawTelemetrySnapshot {
    RawTelemetrySnapshot {
        voltage: 15_200,
        current: -180,
        temperature: 24,
        charge: 1_500,
        capacity: 3_000,
        mode: bridge_core::protocol::OperatingMode::Passive,
        ..RawTelemetrySnapshot::default()
    }
}
