//! Pin assignment table.
//!
//! External tooling depends on these staying stable across firmware
//! versions; the firmware crate wires its peripherals from the same table.

/// GPIO numbers for every pin the controller drives or observes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinAssignments {
    /// Normal-polarity glitch output (pulse engine SET pin).
    pub glitch_out: u8,
    /// Inverted glitch output (pulse engine side-set pin, pad outover INVERT).
    pub glitch_out_inv: u8,
    /// GPIO edge trigger input, pulled up.
    pub trigger_in: u8,
    /// Target UART TX.
    pub target_tx: u8,
    /// Target UART RX, snooped by the UART byte-match trigger.
    pub target_rx: u8,
    /// Target clock output.
    pub clock_out: u8,
    /// ArmedSignal, CPU-driven, high while armed.
    pub armed: u8,
    /// FireSignal, PIO-driven, observed by the clock generator.
    pub fire: u8,
    /// Target reset line (default; reconfigurable at run time).
    pub target_reset: u8,
    /// Target power switch.
    pub target_power: u8,
}

/// The wiring every shipped board uses.
pub const PIN_ASSIGNMENTS: PinAssignments = PinAssignments {
    glitch_out: 2,
    glitch_out_inv: 11,
    trigger_in: 3,
    target_tx: 4,
    target_rx: 5,
    clock_out: 6,
    armed: 9,
    fire: 12,
    target_reset: 15,
    target_power: 14,
};
