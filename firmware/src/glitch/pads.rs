//! Pad- and register-level plumbing the HAL does not expose directly.
//!
//! The RP2350 pad isolation latch gates a pad's input from peripherals
//! other than the selected function. Two pins here are deliberately
//! observed across owners: the target-RX pad (hardware UART + the PIO
//! byte matcher) and FireSignal (driven by the glitch PIO, read by the
//! clock PIO). Sharing is modelled as an explicit capability the engine
//! acquires while it configures those observers, never cleared implicitly.

#![cfg(target_os = "none")]

use embassy_rp::pac;

/// Opens a pad's input to every peripheral that wants to observe it. Both
/// sharers of the pads in question are read-only on them, so this is safe
/// to hold for as long as the observer is configured.
pub fn share_pad_input(gpio: u8) {
    pac::PADS_BANK0.gpio(gpio as usize).modify(|w| {
        w.set_iso(false);
        w.set_ie(true);
    });
}

/// Applies the pad-level output inversion for the mirrored glitch output,
/// so both polarities transition on the same clock edge with no skew.
pub fn invert_output(gpio: u8) {
    pac::IO_BANK0
        .gpio(gpio as usize)
        .ctrl()
        .modify(|w| w.set_outover(pac::io::vals::Outover::INVERT));
}

/// Points a state machine's `jmp pin` condition at an arbitrary GPIO.
/// Needed when the observed pin belongs to another PIO block: the input is
/// readable regardless of function select once the pad is shared.
pub fn route_jmp_pin(pio: pac::pio::Pio, sm: usize, gpio: u8) {
    pio.sm(sm).execctrl().modify(|w| w.set_jmp_pin(gpio));
}

/// Points a state machine's IN pin base at an arbitrary GPIO, for `wait
/// pin` and `in pins` against a pad owned by another peripheral.
pub fn route_in_base(pio: pac::pio::Pio, sm: usize, gpio: u8) {
    pio.sm(sm).pinctrl().modify(|w| w.set_in_base(gpio));
}
