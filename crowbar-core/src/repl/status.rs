//! Rendering for `STATUS`, `GET`, `HELP`, `VERSION`, and `PINS`.

use core::fmt::Write;

use heapless::String;

use crate::engine::StatusSnapshot;
use crate::params::{Edge, ParamField, TriggerSource};
use crate::pins::PIN_ASSIGNMENTS;
use crate::timing::cycles_to_us_hundredths;

/// Chip the firmware targets, reported by `STATUS`.
pub const CHIP_NAME: &str = "RP2350";

/// Firmware identification for `VERSION`.
pub const FIRMWARE_NAME: &str = "Crowbar";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

type Line = String<96>;

/// Formats a cycle count with its microsecond conversion.
pub fn format_cycles<const N: usize>(buffer: &mut String<N>, cycles: u32) {
    let hundredths = cycles_to_us_hundredths(cycles);
    let _ = write!(
        buffer,
        "{} cycles ({}.{:02} us)",
        cycles,
        hundredths / 100,
        hundredths % 100
    );
}

/// Renders a `GET` reply for one field.
pub fn render_get(field: ParamField, value: u32, mut line: impl FnMut(&str)) {
    let mut text = Line::new();
    if field.is_duration() {
        format_cycles(&mut text, value);
    } else {
        let _ = write!(text, "{}", value);
    }
    line(text.as_str());
}

fn trigger_text(buffer: &mut Line, trigger: TriggerSource) {
    match trigger {
        TriggerSource::None => {
            let _ = buffer.push_str("NONE");
        }
        TriggerSource::GpioEdge(Edge::Rising) => {
            let _ = write!(buffer, "GPIO RISING (GP{})", PIN_ASSIGNMENTS.trigger_in);
        }
        TriggerSource::GpioEdge(Edge::Falling) => {
            let _ = write!(buffer, "GPIO FALLING (GP{})", PIN_ASSIGNMENTS.trigger_in);
        }
        TriggerSource::UartByte(byte) => {
            let _ = write!(buffer, "UART 0x{:02X}", byte);
        }
    }
}

/// Renders the full `STATUS` report.
pub fn render_status(snapshot: &StatusSnapshot, mut line: impl FnMut(&str)) {
    let mut text = Line::new();

    line("=== System Status ===");

    let _ = write!(text, "Chip:    {}", CHIP_NAME);
    line(text.as_str());

    text.clear();
    let _ = write!(text, "Armed:   {}", if snapshot.armed { "YES" } else { "NO" });
    line(text.as_str());

    text.clear();
    let _ = write!(text, "Fired:   {}", snapshot.fired);
    line(text.as_str());

    for (label, value) in [
        ("Pause:   ", snapshot.params.pause_cycles),
        ("Width:   ", snapshot.params.width_cycles),
        ("Gap:     ", snapshot.params.gap_cycles),
    ] {
        text.clear();
        let _ = text.push_str(label);
        format_cycles(&mut text, value);
        line(text.as_str());
    }

    text.clear();
    let _ = write!(text, "Count:   {}", snapshot.params.count);
    line(text.as_str());

    text.clear();
    let _ = text.push_str("Trigger: ");
    trigger_text(&mut text, snapshot.params.trigger);
    line(text.as_str());

    text.clear();
    if snapshot.clock.frequency_hz == 0 {
        let _ = text.push_str("Clock:   unconfigured");
    } else {
        let _ = write!(
            text,
            "Clock:   {} Hz ({})",
            snapshot.clock.frequency_hz,
            if snapshot.clock.enabled { "ON" } else { "OFF" }
        );
    }
    line(text.as_str());
}

/// Renders the `CLOCK` query reply.
pub fn render_clock(frequency_hz: u32, enabled: bool, mut line: impl FnMut(&str)) {
    let mut text = Line::new();
    if frequency_hz == 0 {
        let _ = text.push_str("clock unconfigured");
    } else {
        let _ = write!(
            text,
            "clock {} Hz ({})",
            frequency_hz,
            if enabled { "ON" } else { "OFF" }
        );
    }
    line(text.as_str());
}

/// Renders the `PINS` table.
pub fn render_pins(mut line: impl FnMut(&str)) {
    let pins = PIN_ASSIGNMENTS;
    let mut text = Line::new();

    line("=== Pin Assignments ===");
    for (gpio, role) in [
        (pins.glitch_out, "Glitch output"),
        (pins.glitch_out_inv, "Glitch output (inverted)"),
        (pins.trigger_in, "Trigger input (pull-up)"),
        (pins.target_tx, "Target UART TX"),
        (pins.target_rx, "Target UART RX (trigger snoop)"),
        (pins.clock_out, "Target clock output"),
        (pins.armed, "ARMED signal"),
        (pins.fire, "FIRE signal"),
        (pins.target_reset, "Target reset (default)"),
        (pins.target_power, "Target power"),
    ] {
        text.clear();
        let _ = write!(text, "GP{:<2} - {}", gpio, role);
        line(text.as_str());
    }
}

/// Renders the `HELP` reference.
pub fn render_help(mut line: impl FnMut(&str)) {
    for text in [
        "=== Crowbar Command Reference ===",
        "SET PAUSE|WIDTH|GAP|COUNT <cycles>  - glitch timing (150 MHz cycles)",
        "GET PAUSE|WIDTH|GAP|COUNT           - read back a parameter",
        "TRIGGER NONE                        - manual firing only",
        "TRIGGER GPIO RISING|FALLING         - debounced edge on the trigger pin",
        "TRIGGER UART <hex byte>             - fire on a target-RX byte",
        "ARM ON|OFF                          - arm / disarm one shot",
        "GLITCH                              - manual fire (armed, TRIGGER NONE)",
        "CLOCK [<hz>] [ON|OFF]               - target clock with glitch boost",
        "STATUS                              - state, counters, parameters",
        "RESET                               - disarm and restore defaults",
        "API ON|OFF                          - machine-readable acknowledgements",
        "ERROR                               - repeat the last error",
        "TARGET SEND <hex|\"text\">            - bytes to the target UART",
        "TARGET RESPONSE                     - dump the response buffer",
        "TARGET RESET [PIN n] [PERIOD ms] [HIGH] - pulse the reset line",
        "TARGET POWER ON|OFF|CYCLE           - target power switch",
        "REBOOT [BL]                         - restart, optionally to bootloader",
        "PINS / VERSION / HELP               - reference information",
        "Unique prefixes work everywhere: SET P 100, TRIG G R, STAT.",
    ] {
        line(text);
    }
}

/// Renders `VERSION`.
pub fn render_version(mut line: impl FnMut(&str)) {
    let mut text = Line::new();
    let _ = write!(
        text,
        "{} v{} ({} @ 150 MHz)",
        FIRMWARE_NAME, FIRMWARE_VERSION, CHIP_NAME
    );
    line(text.as_str());
}
