//! Cycle accounting shared between the controller logic and the PIO programs.
//!
//! All user-facing durations are integer counts of 150 MHz system-clock
//! cycles (~6.67 ns each). The constants here mirror the instruction-level
//! overheads of the PIO programs shipped in the firmware crate; if a program
//! changes shape, its constant changes with it.

/// System clock the PIO blocks run from. One "cycle" everywhere in the
/// command surface means one tick of this clock.
pub const SYSTEM_CLOCK_HZ: u32 = 150_000_000;

/// Instruction memory per PIO block.
pub const PIO_INSTRUCTION_BUDGET: usize = 32;

/// Instructions permanently resident in the glitch PIO block
/// (pulse generator + fire strobe).
pub const RESIDENT_INSTRUCTIONS: usize = 19;

/// Largest trigger program (UART matcher / falling edge, 13 instructions).
/// Together with [`RESIDENT_INSTRUCTIONS`] this exactly fills the block.
pub const MAX_TRIGGER_INSTRUCTIONS: usize = 13;

/// Cycles the pulse program spends per high phase beyond the delay loop:
/// the counter reload plus the trailing pin write. Subtracted from the
/// requested width before it is pushed into the FIFO.
pub const WIDTH_OVERHEAD_CYCLES: u32 = 3;

/// Cycles the pulse program spends per low phase beyond the delay loop:
/// counter reload, loop-counter decrement, and the next pin write.
pub const GAP_OVERHEAD_CYCLES: u32 = 4;

/// Fixed latency from the FIRE-IRQ being accepted to the first rising edge,
/// on top of the configured pause: the width/gap FIFO drains plus the pin
/// write.
pub const TRIGGER_LATENCY_CYCLES: u32 = 5;

/// Cycles the clock generator spends per half period beyond its delay loop.
/// Bounds the fastest producible clock (and boost) at
/// `SYSTEM_CLOCK_HZ / (2 * CLOCK_HALF_OVERHEAD_CYCLES)`.
pub const CLOCK_HALF_OVERHEAD_CYCLES: u32 = 4;

/// The UART byte-match trigger samples its line at this multiple of the
/// target baud rate.
pub const UART_TRIGGER_OVERSAMPLE: u32 = 8;

/// PIO clock divider for the UART matcher in the 16.8 fixed-point encoding
/// the state-machine divider register uses.
///
/// Equivalent to `system_hz / (8 * baud)` carried to 8 fractional bits, so
/// the intra-bit sampling phase stays accurate across odd baud rates.
pub const fn uart_trigger_divider_bits(system_hz: u32, baud: u32) -> u32 {
    ((system_hz as u64 * 256) / (UART_TRIGGER_OVERSAMPLE as u64 * baud as u64)) as u32
}

/// Converts a cycle count to hundredths of a microsecond for display.
pub const fn cycles_to_us_hundredths(cycles: u32) -> u64 {
    cycles as u64 * 2 / 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divider_matches_reference_ratio() {
        // 150 MHz / (8 * 115200) = 162.76; check the integer and a couple of
        // fractional bits.
        let bits = uart_trigger_divider_bits(SYSTEM_CLOCK_HZ, 115_200);
        assert_eq!(bits >> 8, 162);
        // .76 of 256 ~= 195
        assert_eq!(bits & 0xff, 195);
    }

    #[test]
    fn divider_is_exact_for_divisible_bauds() {
        // 150 MHz / (8 * 9600) = 1953.125 -> fraction 0.125 = 32/256
        let bits = uart_trigger_divider_bits(SYSTEM_CLOCK_HZ, 9_600);
        assert_eq!(bits >> 8, 1953);
        assert_eq!(bits & 0xff, 32);
    }

    #[test]
    fn microsecond_conversion_uses_150_cycles_per_us() {
        assert_eq!(cycles_to_us_hundredths(150), 100);
        assert_eq!(cycles_to_us_hundredths(75), 50);
        assert_eq!(cycles_to_us_hundredths(0), 0);
    }

    #[test]
    fn trigger_programs_fit_alongside_resident_code() {
        assert!(RESIDENT_INSTRUCTIONS + MAX_TRIGGER_INSTRUCTIONS <= PIO_INSTRUCTION_BUDGET);
    }
}
