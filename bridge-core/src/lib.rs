#![no_std]

//! Portable core of the vacuum bridge.
//!
//! The crate decodes the Open Interface sensor stream, reconciles it into a
//! [`state::DeviceState`], drives the wake and command sequences over the
//! [`wake::SerialLink`] and [`wake::WakeLine`] seams, and publishes status
//! through the [`bus::MessageBus`] seam. It avoids the standard library so the
//! firmware and the host emulator share every line of it.

#[cfg(test)]
extern crate std;

pub mod bridge;
pub mod bus;
pub mod command;
pub mod config;
pub mod console;
pub mod journal;
pub mod protocol;
pub mod state;
pub mod status;
pub mod telemetry;
pub mod wake;

#[cfg(test)]
mod test_support;

pub use bridge::{Bridge, ConsoleReply, LoopSignal};
pub use config::BridgeConfig;
pub use journal::{BridgeEvent, BridgeInstant, EventJournal};
pub use state::DeviceState;
