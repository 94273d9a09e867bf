use core::fmt::Write as _;

use embassy_futures::select::{Either, select};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::gpio::{Level, OutputOpenDrain, Speed};
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_sync::channel::Sender;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use embedded_io_async::Read;
use heapless::String;
use static_cell::StaticCell;

use bridge_core::bridge::{Bridge, ConsoleReply, LoopSignal};
use bridge_core::console::ConsoleOutcome;
use bridge_core::journal::RecordId;
use bridge_core::wake::DeviceLink;

use super::{BRIDGE_CONFIG, BUS_RX, BUS_TX, CONSOLE_RX, CONSOLE_TX, FRAME_QUEUE_DEPTH, UsbFrame};
use crate::bus_link::{BusLink, Inbound, NetworkSnapshot, parse_inbound};
use crate::hw::{BlockingDelay, BrcLine, FirmwareInstant, UartLink};
use crate::line::{LineAssembler, MAX_LINE_LEN};

const UART_BUFFER_SIZE: usize = 256;
const UART_CHUNK: usize = 64;
/// Upper bound between timer polls when the vacuum is silent.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Lets queued replies reach the host before the core resets.
const RESTART_GRACE: Duration = Duration::from_millis(200);

static UART_TX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();

type FirmwareBridge = Bridge<'static, FirmwareInstant, UartLink, BrcLine, BlockingDelay>;
type FrameSender = Sender<'static, CriticalSectionRawMutex, UsbFrame, FRAME_QUEUE_DEPTH>;
type ReplyLine = String<MAX_LINE_LEN>;

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
    brc_pin: Peri<'static, hal::peripherals::PA4>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = BRIDGE_CONFIG.baud.bits_per_second();
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize vacuum UART");
    let (uart_tx, mut uart_rx) = uart.split();

    let link = DeviceLink::new(
        UartLink::new(uart_tx),
        BrcLine::new(OutputOpenDrain::new(brc_pin, Level::High, Speed::Low)),
        BlockingDelay,
    );
    let mut bridge = FirmwareBridge::new(BRIDGE_CONFIG, link);
    let mut bus = BusLink::new();
    let mut network = NetworkSnapshot::new(BRIDGE_CONFIG.hostname);
    let mut console_lines = LineAssembler::<MAX_LINE_LEN>::new();
    let mut bus_lines = LineAssembler::<MAX_LINE_LEN>::new();

    let console_rx = CONSOLE_RX.receiver();
    let console_tx = CONSOLE_TX.sender();
    let bus_rx = BUS_RX.receiver();
    let bus_tx = BUS_TX.sender();

    if let Err(err) = bridge.begin(FirmwareInstant::now()) {
        defmt::warn!("bridge: start-up write failed: {}", err);
    }
    let mut cursor = log_journal(&bridge, 0);

    let mut ingress = [0u8; UART_CHUNK];
    loop {
        if let Either::First(result) = select(uart_rx.read(&mut ingress), Timer::after(POLL_INTERVAL)).await {
            match result {
                Ok(count) => bridge.ingest_serial(&ingress[..count], FirmwareInstant::now()),
                Err(_) => defmt::warn!("bridge: UART read error"),
            }
        }

        let mut signal = LoopSignal::Continue;

        while let Ok(frame) = console_rx.try_receive() {
            for byte in frame {
                let reply = match console_lines.push(byte) {
                    Some(Ok(line)) => {
                        let (reply, line_signal) = run_console_line(&mut bridge, &mut bus, line);
                        if line_signal == LoopSignal::Restart {
                            signal = LoopSignal::Restart;
                        }
                        reply
                    }
                    Some(Err(err)) => render(format_args!("ERR line rejected: {err:?}")),
                    None => continue,
                };
                send_line(&console_tx, &reply).await;
            }
        }

        while let Ok(frame) = bus_rx.try_receive() {
            for byte in frame {
                match bus_lines.push(byte) {
                    Some(Ok(line)) => {
                        if apply_bus_line(&mut bridge, &mut bus, &mut network, line)
                            == LoopSignal::Restart
                        {
                            signal = LoopSignal::Restart;
                        }
                    }
                    Some(Err(_)) => defmt::warn!("bridge: dropped malformed agent line"),
                    None => {}
                }
            }
        }

        bridge.poll_timers(FirmwareInstant::now(), &mut bus, &network);

        while let Some(line) = bus.next_outbound() {
            send_line(&bus_tx, &line).await;
        }
        cursor = log_journal(&bridge, cursor);

        if signal == LoopSignal::Restart {
            defmt::warn!("bridge: restarting");
            Timer::after(RESTART_GRACE).await;
            cortex_m::peripheral::SCB::sys_reset();
        }
    }
}

fn run_console_line(
    bridge: &mut FirmwareBridge,
    bus: &mut BusLink,
    line: &str,
) -> (ReplyLine, LoopSignal) {
    match bridge.handle_console(line, FirmwareInstant::now(), bus) {
        Ok(reply) => (describe_reply(reply), reply.signal()),
        Err(err) => (render(format_args!("ERR {err}")), LoopSignal::Continue),
    }
}

fn describe_reply(reply: ConsoleReply) -> ReplyLine {
    match reply {
        ConsoleReply::Command(dispatched) => render(format_args!(
            "OK {} {} wake={}",
            dispatched.kind, dispatched.outcome, dispatched.wake
        )),
        ConsoleReply::Console {
            outcome: ConsoleOutcome::Version,
            ..
        } => render(format_args!("version {}", BRIDGE_CONFIG.build)),
        ConsoleReply::Console {
            command,
            outcome: ConsoleOutcome::Woke(report),
        } => render(format_args!("OK {command} {report}")),
        ConsoleReply::Console { command, .. } => render(format_args!("OK {command}")),
    }
}

fn apply_bus_line(
    bridge: &mut FirmwareBridge,
    bus: &mut BusLink,
    network: &mut NetworkSnapshot,
    line: &str,
) -> LoopSignal {
    match parse_inbound(line) {
        Ok(Inbound::Up) => bus.set_broker_up(true),
        Ok(Inbound::Down) => bus.set_broker_up(false),
        Ok(Inbound::FirmwareUpdate) => {
            if let Err(err) = bridge.begin_firmware_update(FirmwareInstant::now()) {
                defmt::warn!("bridge: stream pause failed: {}", err);
            }
        }
        Ok(Inbound::Network {
            ip_address,
            rssi,
            ssid,
            mac_address,
        }) => network.update(ip_address, rssi, ssid, mac_address),
        Ok(Inbound::Message { topic, payload }) => {
            return bridge.handle_bus_message(
                topic,
                payload.as_bytes(),
                FirmwareInstant::now(),
                bus,
            );
        }
        Err(_) => defmt::warn!("bridge: unknown agent line"),
    }
    LoopSignal::Continue
}

/// Formats into a fixed line; overflow truncates.
fn render(args: core::fmt::Arguments<'_>) -> ReplyLine {
    let mut line = ReplyLine::new();
    let _ = line.write_fmt(args);
    line
}

async fn send_line(tx: &FrameSender, text: &str) {
    for chunk in text.as_bytes().chunks(super::FRAME_CAPACITY) {
        let mut frame = UsbFrame::new();
        let _ = frame.extend_from_slice(chunk);
        tx.send(frame).await;
    }
    if !text.ends_with('\n') {
        let mut frame = UsbFrame::new();
        let _ = frame.extend_from_slice(b"\r\n");
        tx.send(frame).await;
    }
}

/// Forwards new journal records to defmt and returns the advanced cursor.
fn log_journal(bridge: &FirmwareBridge, cursor: RecordId) -> RecordId {
    let journal = bridge.journal();
    for record in journal.since(cursor) {
        let at = record.timestamp.0.as_millis();
        if record.event.is_warning() {
            defmt::warn!("[{=u64} ms] {}", at, defmt::Display2Format(&record.event));
        } else {
            defmt::info!("[{=u64} ms] {}", at, defmt::Display2Format(&record.event));
        }
    }
    journal.cursor()
}
