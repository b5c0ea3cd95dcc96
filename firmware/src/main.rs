#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(target_os = "none", allow(static_mut_refs))]

#[cfg(target_os = "none")]
extern crate panic_halt;

mod cli;
#[cfg(target_os = "none")]
mod glitch;
#[cfg(target_os = "none")]
mod target;
mod usb;

#[cfg(target_os = "none")]
use defmt_rtt as _;

#[cfg(target_os = "none")]
use core::mem::MaybeUninit;
#[cfg(target_os = "none")]
use embassy_executor::Spawner;
#[cfg(target_os = "none")]
use embassy_futures::join::join;
#[cfg(target_os = "none")]
use embassy_futures::select::{select3, Either3};
#[cfg(target_os = "none")]
use embassy_rp::peripherals::{PIO0, PIO1, UART1, USB};
#[cfg(target_os = "none")]
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
#[cfg(target_os = "none")]
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
#[cfg(target_os = "none")]
use embassy_rp::watchdog::Watchdog;
#[cfg(target_os = "none")]
use embassy_rp::{bind_interrupts, pio, Peri};
#[cfg(target_os = "none")]
use embassy_usb::driver::EndpointError;
#[cfg(target_os = "none")]
use embedded_io_async::{Read, Write};

#[cfg(target_os = "none")]
use crowbar_core::engine::GlitchController;
#[cfg(target_os = "none")]
use crowbar_core::repl::commands::CommandExecutor;
#[cfg(target_os = "none")]
use crowbar_core::target::TARGET_UART_BAUD;

#[cfg(target_os = "none")]
use crate::cli::{CliChannel, CliFrame, CliSession};
#[cfg(target_os = "none")]
use crate::glitch::{EnginePins, PioFaultEngine};
#[cfg(target_os = "none")]
use crate::target::{TargetLink, TargetRxPipe, TargetTxPipe};

/// Boot ROM image definition, required on RP2350 for the ROM to start us.
#[cfg(target_os = "none")]
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: embassy_rp::block::ImageDef = embassy_rp::block::ImageDef::secure_exe();

#[cfg(target_os = "none")]
bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => pio::InterruptHandler<PIO0>;
    PIO1_IRQ_0 => pio::InterruptHandler<PIO1>;
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
    UART1_IRQ => BufferedInterruptHandler<UART1>;
});

#[cfg(target_os = "none")]
static mut USB_STORAGE: MaybeUninit<usb::UsbDeviceStorage> = MaybeUninit::uninit();
#[cfg(target_os = "none")]
static CLI_RX_QUEUE: CliChannel = CliChannel::new();
#[cfg(target_os = "none")]
static CLI_TX_QUEUE: CliChannel = CliChannel::new();
#[cfg(target_os = "none")]
static TARGET_TX_PIPE: TargetTxPipe = TargetTxPipe::new();
#[cfg(target_os = "none")]
static TARGET_RX_PIPE: TargetRxPipe = TargetRxPipe::new();

#[cfg(target_os = "none")]
const UART_BUFFER_SIZE: usize = 256;
#[cfg(target_os = "none")]
static mut UART_TX_BUFFER: [u8; UART_BUFFER_SIZE] = [0; UART_BUFFER_SIZE];
#[cfg(target_os = "none")]
static mut UART_RX_BUFFER: [u8; UART_BUFFER_SIZE] = [0; UART_BUFFER_SIZE];

#[cfg(target_os = "none")]
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let glitch_pio = pio::Pio::new(p.PIO0, Irqs);
    let clock_pio = pio::Pio::new(p.PIO1, Irqs);

    let engine = PioFaultEngine::new(
        glitch_pio,
        clock_pio,
        EnginePins {
            glitch_out: p.PIN_2,
            glitch_out_inv: p.PIN_11,
            trigger_in: p.PIN_3,
            fire: p.PIN_12,
            armed: p.PIN_9,
            clock_out: p.PIN_6,
        },
    );

    let target = TargetLink::new(
        &TARGET_TX_PIPE,
        &TARGET_RX_PIPE,
        embassy_rp::gpio::Output::new(p.PIN_14, embassy_rp::gpio::Level::Low),
        Watchdog::new(p.WATCHDOG),
    );

    let executor = CommandExecutor::new(GlitchController::new(engine), target);
    let session = CliSession::new(&CLI_RX_QUEUE, &CLI_TX_QUEUE, executor);

    spawner
        .spawn(cli_task(session))
        .expect("failed to spawn CLI task");
    spawner
        .spawn(usb_task(p.USB))
        .expect("failed to spawn USB task");
    spawner
        .spawn(uart_task(p.UART1, p.PIN_4, p.PIN_5))
        .expect("failed to spawn target UART task");

    defmt::info!("crowbar: ready");
    core::future::pending::<()>().await;
}

#[cfg(not(target_os = "none"))]
fn main() {}

#[cfg(target_os = "none")]
#[embassy_executor::task]
async fn cli_task(mut session: CliSession) -> ! {
    session.run().await
}

#[cfg(target_os = "none")]
#[embassy_executor::task]
async fn uart_task(
    uart: Peri<'static, UART1>,
    tx_pin: Peri<'static, embassy_rp::peripherals::PIN_4>,
    rx_pin: Peri<'static, embassy_rp::peripherals::PIN_5>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = TARGET_UART_BAUD;

    let uart = unsafe {
        BufferedUart::new(
            uart,
            Irqs,
            tx_pin,
            rx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            config,
        )
    };
    let (mut uart_tx, mut uart_rx) = uart.split();

    let host_to_target = async {
        let mut chunk = [0u8; 32];
        loop {
            let count = TARGET_TX_PIPE.read(&mut chunk).await;
            let mut written = 0usize;
            while written < count {
                match uart_tx.write(&chunk[written..count]).await {
                    Ok(n) if n > 0 => written += n,
                    Ok(_) => {}
                    Err(_) => {
                        defmt::warn!("target: UART write error");
                        break;
                    }
                }
            }
        }
    };

    let target_to_buffer = async {
        let mut chunk = [0u8; 32];
        loop {
            match uart_rx.read(&mut chunk).await {
                Ok(count) if count > 0 => {
                    // The response buffer is bounded; overflow drops the
                    // tail, matching the documented buffer semantics.
                    let _ = TARGET_RX_PIPE.try_write(&chunk[..count]);
                }
                Ok(_) => {}
                Err(_) => {
                    defmt::warn!("target: UART read error");
                }
            }
        }
    };

    join(host_to_target, target_to_buffer).await;
    loop {
        core::future::pending::<()>().await;
    }
}

#[cfg(target_os = "none")]
#[embassy_executor::task]
async fn usb_task(usb: Peri<'static, USB>) -> ! {
    let storage = unsafe { USB_STORAGE.write(usb::UsbDeviceStorage::new()) };
    let driver = Driver::new(usb, Irqs);

    let mut composite = usb::UsbCli::new(driver, storage, usb::UsbDeviceStrings::default());
    let usb::CdcAcmHandle {
        sender,
        receiver,
        control,
    } = composite.take_cli().expect("CLI CDC interface unavailable");

    let mut device = composite.device;
    join(device.run(), run_cli_interface(sender, receiver, control)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

#[cfg(target_os = "none")]
async fn run_cli_interface<D>(
    mut sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
    mut receiver: embassy_usb::class::cdc_acm::Receiver<'static, D>,
    control: embassy_usb::class::cdc_acm::ControlChanged<'static>,
) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let cli_rx = CLI_RX_QUEUE.sender();
    let cli_tx = CLI_TX_QUEUE.receiver();
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut tx_packet = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut pending_tx: Option<CliFrame> = None;

    loop {
        embassy_futures::join::join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &mut sender).await;
        pending_tx.take();

        defmt::info!("usb: CLI interface connected");

        loop {
            match select3(
                receiver.read_packet(&mut ingress),
                async {
                    if pending_tx.is_none() {
                        pending_tx = Some(cli_tx.receive().await);
                    }

                    let frame = pending_tx
                        .as_ref()
                        .expect("pending frame missing during CLI write");
                    let len = frame.len().min(tx_packet.len());
                    tx_packet[..len].copy_from_slice(&frame.as_slice()[..len]);

                    match sender.write_packet(&tx_packet[..len]).await {
                        Ok(()) => {
                            pending_tx.take();
                            Ok(len)
                        }
                        Err(err) => Err(err),
                    }
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(count)) => {
                    if count == 0 {
                        continue;
                    }

                    let mut frame = CliFrame::new();
                    if frame.extend_from_slice(&ingress[..count]).is_err() {
                        defmt::warn!("usb: dropping CLI frame len={} (overflow)", count);
                        continue;
                    }

                    cli_rx.send(frame).await;
                }
                Either3::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: CLI interface disabled");
                    break;
                }
                Either3::First(Err(_)) => {
                    defmt::warn!("usb: CLI read error");
                }
                Either3::Second(Ok(_)) => {}
                Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: CLI write disabled");
                    break;
                }
                Either3::Second(Err(_)) => {
                    defmt::warn!("usb: CLI write error");
                }
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: host dropped DTR");
                        pending_tx.take();
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(target_os = "none")]
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
