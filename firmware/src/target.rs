//! Target-facing peripherals: UART byte stream, reset line, power switch.
//!
//! The UART RX path is a pure byte stream into the response buffer; all
//! trigger logic lives in the PIO matcher that snoops the same pad, so no
//! interrupt handler here ever touches glitch state.

#![cfg(target_os = "none")]

use crowbar_core::target::{
    PowerAction, ResetConfig, TargetError, TargetPort, RESPONSE_CAPACITY,
};

use embassy_rp::gpio::{Level, Output};
use embassy_rp::pac;
use embassy_rp::watchdog::Watchdog;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_time::{block_for, Duration};
use heapless::Vec;

/// Bytes queued towards the target UART.
pub type TargetTxPipe = Pipe<ThreadModeRawMutex, 128>;
/// Bytes received from the target, drained by `TARGET RESPONSE`.
pub type TargetRxPipe = Pipe<ThreadModeRawMutex, RESPONSE_CAPACITY>;

/// `TargetPort` realisation over the UART pipes and control pins.
pub struct TargetLink {
    tx: &'static TargetTxPipe,
    rx: &'static TargetRxPipe,
    power_pin: Output<'static>,
    watchdog: Watchdog,
}

impl TargetLink {
    pub fn new(
        tx: &'static TargetTxPipe,
        rx: &'static TargetRxPipe,
        power_pin: Output<'static>,
        watchdog: Watchdog,
    ) -> Self {
        Self {
            tx,
            rx,
            power_pin,
            watchdog,
        }
    }
}

impl TargetPort for TargetLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TargetError> {
        match self.tx.try_write(bytes) {
            Ok(written) if written == bytes.len() => Ok(()),
            _ => Err(TargetError::UartUnavailable),
        }
    }

    fn take_response(&mut self) -> Vec<u8, RESPONSE_CAPACITY> {
        let mut response = Vec::new();
        let mut chunk = [0u8; 32];
        while let Ok(count) = self.rx.try_read(&mut chunk) {
            if count == 0 || response.extend_from_slice(&chunk[..count]).is_err() {
                break;
            }
        }
        response
    }

    fn pulse_reset(&mut self, config: &ResetConfig) {
        defmt::info!(
            "target: reset pulse on GP{}, {} ms",
            config.pin,
            config.period_ms
        );
        let (assert_level, idle_level) = if config.active_high {
            (true, false)
        } else {
            (false, true)
        };

        drive_gpio(config.pin, idle_level);
        drive_gpio(config.pin, assert_level);
        block_for(Duration::from_millis(config.period_ms as u64));
        drive_gpio(config.pin, idle_level);
    }

    fn set_power(&mut self, action: PowerAction) {
        match action {
            PowerAction::On => self.power_pin.set_level(Level::High),
            PowerAction::Off => self.power_pin.set_level(Level::Low),
            PowerAction::Cycle => {
                self.power_pin.set_level(Level::Low);
                block_for(Duration::from_millis(250));
                self.power_pin.set_level(Level::High);
            }
        }
    }

    fn reboot(&mut self, bootloader: bool) {
        if bootloader {
            // Boot ROM reboot into BOOTSEL for firmware replacement.
            embassy_rp::rom_data::reboot(0x0002, 100, 0, 0);
        } else {
            self.watchdog.trigger_reset();
        }
        loop {
            cortex_m::asm::wfe();
        }
    }
}

/// Drives an arbitrary, runtime-selected GPIO as an SIO output. The reset
/// line is host-reconfigurable to any pin, which rules out the typed pin
/// API; the pad is claimed for SIO on first use and stays claimed.
fn drive_gpio(gpio: u8, high: bool) {
    let mask = 1u32 << gpio;
    pac::PADS_BANK0.gpio(gpio as usize).modify(|w| {
        w.set_iso(false);
        w.set_od(false);
    });
    pac::IO_BANK0
        .gpio(gpio as usize)
        .ctrl()
        .modify(|w| w.set_funcsel(5)); // SIO
    if high {
        pac::SIO.gpio_out_set().write_value(mask);
    } else {
        pac::SIO.gpio_out_clr().write_value(mask);
    }
    pac::SIO.gpio_oe_set().write_value(mask);
}
