//! PIO programs for the glitch engine and the target clock generator.
//!
//! All cycle accounting here is mirrored by the constants in
//! `crowbar_core::timing`; the controller subtracts those overheads before
//! the delay words reach a FIFO, so realised durations equal the requested
//! cycle counts.
//!
//! Instruction memory layout, glitch block (32 words):
//! pulse generator (17) + fire strobe (2) stay resident; one trigger
//! program (11 or 13) is loaded per arming. The largest trigger fills the
//! block exactly.

#![cfg(target_os = "none")]

use embassy_rp::pio::program::{pio_asm, Program};

/// Shared PIO interrupt flag raised the instant a trigger is accepted.
pub const FIRE_IRQ: u8 = 0;

/// PIO interrupt flag the pulse program raises after the last pulse.
pub const DONE_IRQ: u8 = 1;

/// Pulse generator. Blocks on FIRE-IRQ with pause and count pre-pulled,
/// then renders COUNT (width-high, gap-low) pulses on the SET pin, with
/// the side-set pin mirroring every transition (the pad inverts it).
///
/// FIFO drain order: pause, count-1, width, gap. The first two words are
/// consumed as soon as the state machine is enabled; width and gap drain
/// right after the IRQ, which keeps the FIFO-empty check a valid fired
/// indicator while armed.
///
/// High phase lasts `width + 3` cycles, low phase `gap + 4`; first edge
/// rises `pause + 5` cycles after the IRQ is accepted.
pub fn pulse_generator() -> Program<32> {
    pio_asm!(
        ".side_set 1 opt",
        "    pull block",
        "    mov x, osr",       // pause
        "    pull block",
        "    mov y, osr",       // count - 1
        "    wait 1 irq 0",
        "pauseloop:",
        "    jmp x--, pauseloop",
        "    pull block",
        "    mov isr, osr",     // width parked in ISR
        "    pull block",       // gap stays in OSR
        "pulse:",
        "    set pins, 1 side 1",
        "    mov x, isr",
        "widthloop:",
        "    jmp x--, widthloop",
        "    set pins, 0 side 0",
        "    mov x, osr",
        "gaploop:",
        "    jmp x--, gaploop",
        "    jmp y--, pulse",
        "    irq wait 1",       // completion flag; halts here
    )
    .program
}

/// Manual-fire strobe: raises FireSignal and FIRE-IRQ, then stalls. The
/// controller enables it for a microsecond and tears it down.
pub fn fire_strobe() -> Program<32> {
    pio_asm!(
        "    set pins, 1",
        "    irq wait 0",
    )
    .program
}

/// Rising-edge trigger. Requires the line low across three ~32-cycle
/// confirmation windows (any bounce restarts the filter), then accepts the
/// next rising edge: FireSignal high, FIRE-IRQ, halt. One-shot.
pub fn edge_trigger_rising() -> Program<32> {
    pio_asm!(
        "idle:",
        "    jmp pin, idle",    // wait for the line to sit low
        "    nop [31]",
        "    jmp pin, idle",
        "    nop [31]",
        "    jmp pin, idle",
        "    nop [31]",
        "    jmp pin, idle",
        "    wait 1 pin 0",
        "    set pins, 1",
        "    irq 0",
        "halt:",
        "    jmp halt",
    )
    .program
}

/// Falling-edge twin: the line must hold high through the stability
/// windows before the falling edge is accepted.
pub fn edge_trigger_falling() -> Program<32> {
    pio_asm!(
        "idle:",
        "    nop [31]",
        "    jmp pin, check1",
        "    jmp idle",
        "check1:",
        "    nop [31]",
        "    jmp pin, check2",
        "    jmp idle",
        "check2:",
        "    nop [31]",
        "    jmp pin, armed",
        "    jmp idle",
        "armed:",
        "    wait 0 pin 0",
        "    set pins, 1",
        "    irq 0",
        "halt:",
        "    jmp halt",
    )
    .program
}

/// UART byte matcher. Samples the target-RX line at 8x baud, decodes each
/// frame into ISR[31:24], and fires when it equals the compare word pulled
/// from the FIFO at startup (trigger byte << 24). Non-matching frames
/// clear the ISR and re-arm; a match is one-shot.
pub fn uart_matcher() -> Program<32> {
    pio_asm!(
        "    pull block",
        "    mov y, osr",       // compare word
        "idle:",
        "    wait 0 pin 0",     // start bit
        "    set x, 7 [10]",    // first sample lands mid bit 0
        "bitloop:",
        "    in pins, 1",
        "    jmp x--, bitloop [6]",
        "    mov x, isr",
        "    jmp x!=y, nomatch",
        "    set pins, 1",
        "    irq 0",
        "halt:",
        "    jmp halt",
        "nomatch:",
        "    mov isr, null",
        "    jmp idle",
    )
    .program
}

/// Target clock generator with glitch boost.
///
/// Y holds the baseline delay word, ISR the boosted one. The baseline loop
/// toggles every `Y + 4` cycles and watches FireSignal (jmp pin) once per
/// period. On fire it pulls the boosted half-period count, runs that many
/// `ISR + 4`-cycle half periods, restores Y from the second FIFO word, and
/// then idles at baseline in a hold-off loop until FireSignal drops, so a
/// still-high FireSignal cannot re-enter the boost.
pub fn clock_generator() -> Program<32> {
    pio_asm!(
        ".wrap_target",
        "baseline:",
        "    mov x, y",
        "    set pins, 1 [1]",
        "high:",
        "    jmp x--, high",
        "    mov x, y",
        "    set pins, 0",
        "low:",
        "    jmp x--, low",
        "    jmp pin, boost",
        ".wrap",
        "boost:",
        "    pull block",
        "    mov y, osr",       // boosted half-period count
        "bhalf:",
        "    mov x, isr",
        "bdelay:",
        "    jmp x--, bdelay",
        "    mov pins, !pins",  // toggle
        "    jmp y--, bhalf",
        "    pull block",
        "    mov y, osr",       // baseline delay word restored
        "spent:",
        "    mov x, y",
        "    set pins, 1 [1]",
        "shigh:",
        "    jmp x--, shigh",
        "    mov x, y",
        "    set pins, 0",
        "slow:",
        "    jmp x--, slow",
        "    jmp pin, spent",   // hold off until FireSignal drops
        "    jmp baseline",
    )
    .program
}
