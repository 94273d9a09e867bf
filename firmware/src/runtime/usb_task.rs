use super::{BUS_RX, BUS_TX, CONSOLE_RX, CONSOLE_TX, FrameQueue, USB_STORAGE, UsbFrame};
use crate::usb::{self, UsbDeviceStrings};
use embassy_futures::join::{join, join3};
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::driver::EndpointError;

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::UsbComposite {
        mut device,
        console,
        bus,
    } = usb::UsbComposite::new(driver, storage, UsbDeviceStrings::default());

    let console_future = pump_interface("console", console, &CONSOLE_RX, &CONSOLE_TX);
    let bus_future = pump_interface("bus", bus, &BUS_RX, &BUS_TX);

    join3(device.run(), console_future, bus_future).await;
    loop {
        core::future::pending::<()>().await;
    }
}

/// Moves packets between one CDC interface and its pair of frame queues.
///
/// Host bytes go to `inbound`; frames from `outbound` are written back one
/// packet at a time. A frame whose write failed is retried until the host
/// drops DTR.
async fn pump_interface<D>(
    label: &'static str,
    handle: usb::CdcAcmHandle<D>,
    inbound: &'static FrameQueue,
    outbound: &'static FrameQueue,
) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let usb::CdcAcmHandle {
        mut sender,
        mut receiver,
        control,
    } = handle;
    let inbound = inbound.sender();
    let outbound = outbound.receiver();
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut pending_tx: Option<UsbFrame> = None;

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &mut sender).await;
        pending_tx.take();

        defmt::info!("usb: {} interface connected", label);

        loop {
            match select3(
                receiver.read_packet(&mut ingress),
                async {
                    let frame = match pending_tx.take() {
                        Some(frame) => frame,
                        None => outbound.receive().await,
                    };
                    let result = sender.write_packet(&frame).await;
                    if result.is_err() {
                        pending_tx = Some(frame);
                    }
                    result
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(0)) => {}
                Either3::First(Ok(count)) => {
                    let mut frame = UsbFrame::new();
                    if frame.extend_from_slice(&ingress[..count]).is_err() {
                        defmt::warn!("usb: dropping {} frame len={} (overflow)", label, count);
                        continue;
                    }

                    inbound.send(frame).await;
                }
                Either3::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: {} interface disabled", label);
                    break;
                }
                Either3::First(Err(_)) => {
                    defmt::warn!("usb: {} read error", label);
                }
                Either3::Second(Ok(())) => {}
                Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: {} write disabled", label);
                    break;
                }
                Either3::Second(Err(_)) => {
                    defmt::warn!("usb: {} write error", label);
                }
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: {} host dropped DTR", label);
                        pending_tx.take();
                        break;
                    }
                }
            }
        }
    }
}

async fn wait_for_dtr<D>(
    control: &embassy_usb::class::cdc_acm::ControlChanged<'static>,
    sender: &mut embassy_usb::class::cdc_acm::Sender<'static, D>,
) where
    D: embassy_usb::driver::Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
