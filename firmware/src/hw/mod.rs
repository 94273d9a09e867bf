//! Board adapters for the `bridge-core` seams.

use bridge_core::BridgeInstant;
use bridge_core::protocol::BaudRate;
use bridge_core::wake::{Delay, SerialLink, WakeLine};
use embassy_stm32::gpio::OutputOpenDrain;
use embassy_stm32::usart::{BufferedUartTx, ConfigError};
use embassy_time::Instant;
use embedded_io::Write;

/// Wrapper so the core can use the embassy clock.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(pub Instant);

impl FirmwareInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl BridgeInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        self.0
            .checked_duration_since(earlier.0)
            .map_or(core::time::Duration::ZERO, |elapsed| {
                core::time::Duration::from_micros(elapsed.as_micros())
            })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum UartError {
    Write,
    Baud,
}

impl From<ConfigError> for UartError {
    fn from(_: ConfigError) -> Self {
        UartError::Baud
    }
}

/// Transmit half of the vacuum UART.
pub struct UartLink {
    tx: BufferedUartTx<'static>,
}

impl UartLink {
    pub fn new(tx: BufferedUartTx<'static>) -> Self {
        Self { tx }
    }
}

impl SerialLink for UartLink {
    type Error = UartError;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.tx.write_all(bytes).map_err(|_| UartError::Write)?;
        self.tx.flush().map_err(|_| UartError::Write)
    }

    fn set_baud(&mut self, baud: BaudRate) -> Result<(), Self::Error> {
        self.tx.set_baudrate(baud.bits_per_second())?;
        Ok(())
    }
}

/// BRC wake line, open drain with the vacuum's pull-up.
pub struct BrcLine {
    pin: OutputOpenDrain<'static>,
}

impl BrcLine {
    pub fn new(pin: OutputOpenDrain<'static>) -> Self {
        Self { pin }
    }
}

impl WakeLine for BrcLine {
    fn assert_low(&mut self) {
        self.pin.set_low();
    }

    fn release(&mut self) {
        self.pin.set_high();
    }
}

/// Busy-wait delay. The bridge task owns the executor while a sequence runs.
pub struct BlockingDelay;

impl Delay for BlockingDelay {
    fn delay(&mut self, duration: core::time::Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        embassy_time::block_for(embassy_time::Duration::from_micros(micros));
    }
}
