use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use static_cell::StaticCell;

use bridge_core::BridgeConfig;

use crate::usb;

mod bridge_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Frames exchanged between the USB task and the bridge task.
pub(super) const FRAME_CAPACITY: usize = usb::MAX_PACKET_SIZE as usize;
pub(super) const FRAME_QUEUE_DEPTH: usize = 8;

pub(super) type UsbFrame = Vec<u8, FRAME_CAPACITY>;
pub(super) type FrameQueue = Channel<CriticalSectionRawMutex, UsbFrame, FRAME_QUEUE_DEPTH>;

/// Console bytes from the host.
pub(super) static CONSOLE_RX: FrameQueue = Channel::new();
/// Console replies to the host.
pub(super) static CONSOLE_TX: FrameQueue = Channel::new();
/// Broker-agent lines from the host.
pub(super) static BUS_RX: FrameQueue = Channel::new();
/// Broker-agent lines to the host.
pub(super) static BUS_TX: FrameQueue = Channel::new();

pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

pub(super) const BRIDGE_CONFIG: BridgeConfig<'static> =
    BridgeConfig::new().with_build(env!("CARGO_PKG_VERSION"));

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA4,
        PB0,
        PB1,
        USB,
        PA11,
        PA12,
        USART5,
        ..
    } = hal::init(config);

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    spawner
        .spawn(bridge_task::run(USART5, PB0, PB1, PA4))
        .expect("failed to spawn bridge task");

    core::future::pending::<()>().await;
}
