//! Line protocol spoken with the broker agent on the host side of CDC1.
//!
//! The MCU has no network stack of its own. A host agent owns the broker
//! session and relays it over a text link:
//!
//! ```text
//! MCU -> host   CONNECT <client> <will-topic> <retain> <will-payload>
//!               SUB <topic>
//!               PUB <topic> <retain> <payload>
//! host -> MCU   UP
//!               DOWN
//!               OTA
//!               NET <ip> <rssi> <ssid> <mac>
//!               MSG <topic> <payload>
//! ```
//!
//! `<retain>` is `0` or `1`. Topics and network fields never contain spaces;
//! payloads run to the end of the line.

use core::fmt::{self, Write as _};

use bridge_core::bus::{LastWill, MessageBus, NetworkInfo};
use bridge_core::status::Payload;
use heapless::{Deque, String};
use winnow::ascii::{dec_int, space1};
use winnow::combinator::{alt, eof, preceded, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{rest, take_till};

/// Longest outbound line, terminator included.
pub const OUTBOUND_LINE_LEN: usize = 512;
/// Outbound lines buffered between drains.
///
/// One timer poll can queue up to ten lines: reconnect (connect, online,
/// subscribe, info), periodic info, status (two) and the low-battery burst
/// (status twice plus the warning).
pub const OUTBOUND_DEPTH: usize = 16;
/// Longest network field kept from a `NET` line.
pub const NET_FIELD_LEN: usize = 40;

pub type OutboundLine = String<OUTBOUND_LINE_LEN>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BusLinkError {
    /// The host reported no broker session.
    BrokerDown,
    /// The outbound queue is full.
    QueueFull,
    /// A rendered line did not fit [`OUTBOUND_LINE_LEN`].
    LineTooLong,
}

/// A parsed line from the host agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Inbound<'a> {
    Up,
    Down,
    /// A firmware image is about to be written; hold the bridge.
    FirmwareUpdate,
    Network {
        ip_address: &'a str,
        rssi: i32,
        ssid: &'a str,
        mac_address: &'a str,
    },
    Message {
        topic: &'a str,
        payload: &'a str,
    },
}

/// A host line outside the protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownLine;

/// Parses one line received from the host.
///
/// # Errors
///
/// Returns [`UnknownLine`] for lines outside the protocol.
pub fn parse_inbound(line: &str) -> Result<Inbound<'_>, UnknownLine> {
    inbound.parse(line.trim_end()).map_err(|_| UnknownLine)
}

fn field<'a>(input: &mut &'a str) -> Result<&'a str, ContextError> {
    take_till(1.., ' ').parse_next(input)
}

fn inbound<'a>(input: &mut &'a str) -> Result<Inbound<'a>, ContextError> {
    alt((
        terminated("UP", eof).value(Inbound::Up),
        terminated("DOWN", eof).value(Inbound::Down),
        terminated("OTA", eof).value(Inbound::FirmwareUpdate),
        preceded(
            ("NET", space1),
            (
                terminated(field, space1),
                terminated(dec_int, space1),
                terminated(field, space1),
                terminated(field, eof),
            ),
        )
        .map(|(ip_address, rssi, ssid, mac_address)| Inbound::Network {
            ip_address,
            rssi,
            ssid,
            mac_address,
        }),
        preceded(("MSG", space1), (terminated(field, space1), rest))
            .map(|(topic, payload)| Inbound::Message { topic, payload }),
    ))
    .parse_next(input)
}

/// Last network details reported by the host.
pub struct NetworkSnapshot {
    hostname: &'static str,
    ip_address: String<NET_FIELD_LEN>,
    rssi: i32,
    ssid: String<NET_FIELD_LEN>,
    mac_address: String<NET_FIELD_LEN>,
}

impl NetworkSnapshot {
    pub const fn new(hostname: &'static str) -> Self {
        Self {
            hostname,
            ip_address: String::new(),
            rssi: 0,
            ssid: String::new(),
            mac_address: String::new(),
        }
    }

    /// Stores the fields of a `NET` line; overlong fields are truncated.
    pub fn update(&mut self, ip_address: &str, rssi: i32, ssid: &str, mac_address: &str) {
        copy_truncated(&mut self.ip_address, ip_address);
        self.rssi = rssi;
        copy_truncated(&mut self.ssid, ssid);
        copy_truncated(&mut self.mac_address, mac_address);
    }
}

fn copy_truncated<const N: usize>(target: &mut String<N>, value: &str) {
    target.clear();
    for ch in value.chars() {
        if target.push(ch).is_err() {
            break;
        }
    }
}

impl NetworkInfo for NetworkSnapshot {
    fn hostname(&self) -> &str {
        self.hostname
    }

    fn ip_address(&self) -> &str {
        &self.ip_address
    }

    fn rssi(&self) -> i32 {
        self.rssi
    }

    fn ssid(&self) -> &str {
        &self.ssid
    }

    fn mac_address(&self) -> &str {
        &self.mac_address
    }
}

/// [`MessageBus`] backed by the host agent.
///
/// Published lines are queued; the USB task drains them with
/// [`BusLink::next_outbound`].
pub struct BusLink {
    broker_up: bool,
    connected: bool,
    outbox: Deque<OutboundLine, OUTBOUND_DEPTH>,
}

impl BusLink {
    pub const fn new() -> Self {
        Self {
            broker_up: false,
            connected: false,
            outbox: Deque::new(),
        }
    }

    /// Applies an `UP` or `DOWN` report from the host.
    pub fn set_broker_up(&mut self, up: bool) {
        self.broker_up = up;
        if !up {
            self.connected = false;
        }
    }

    pub fn next_outbound(&mut self) -> Option<OutboundLine> {
        self.outbox.pop_front()
    }

    fn enqueue(&mut self, args: fmt::Arguments<'_>) -> Result<(), BusLinkError> {
        let mut line = OutboundLine::new();
        line.write_fmt(args)
            .and_then(|()| line.write_char('\n'))
            .map_err(|_| BusLinkError::LineTooLong)?;
        self.outbox
            .push_back(line)
            .map_err(|_| BusLinkError::QueueFull)
    }
}

impl Default for BusLink {
    fn default() -> Self {
        Self::new()
    }
}

fn retain_flag(retained: bool) -> u8 {
    u8::from(retained)
}

impl MessageBus for BusLink {
    type Error = BusLinkError;

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, client: &str, will: LastWill<'_>) -> Result<(), Self::Error> {
        if !self.broker_up {
            return Err(BusLinkError::BrokerDown);
        }
        self.enqueue(format_args!(
            "CONNECT {client} {} {} {}",
            will.topic,
            retain_flag(will.retained),
            will.payload
        ))?;
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(BusLinkError::BrokerDown);
        }
        self.enqueue(format_args!("SUB {topic}"))
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &Payload<'_>,
        retained: bool,
    ) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(BusLinkError::BrokerDown);
        }
        self.enqueue(format_args!(
            "PUB {topic} {} {payload}",
            retain_flag(retained)
        ))
    }
}
