//! Portable pieces of the target interface.
//!
//! The firmware owns the UART, reset, and power peripherals; this module
//! owns everything about them that can be tested on the host: payload
//! parsing for `TARGET SEND`, the reset-line configuration model, and the
//! response-buffer rendering.

use heapless::Vec;

/// Bytes accepted by a single `TARGET SEND`.
pub const MAX_SEND_BYTES: usize = 64;

/// Target response buffer capacity.
pub const RESPONSE_CAPACITY: usize = 512;

/// Target UART line rate. The UART byte-match trigger derives its sampling
/// divider from the same value.
pub const TARGET_UART_BAUD: u32 = 115_200;

/// `TARGET POWER` actions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerAction {
    On,
    Off,
    Cycle,
}

/// Reset-line wiring, reconfigurable at run time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResetConfig {
    pub pin: u8,
    pub period_ms: u32,
    pub active_high: bool,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            pin: crate::pins::PIN_ASSIGNMENTS.target_reset,
            period_ms: 300,
            active_high: false,
        }
    }
}

/// Parsed `TARGET RESET` arguments; omitted options fall back to the
/// defaults.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct ResetRequest {
    pub pin: Option<u8>,
    pub period_ms: Option<u32>,
    pub active_high: bool,
}

impl ResetRequest {
    /// Resolves the request against the defaults. Every `TARGET RESET`
    /// invocation specifies its configuration in full; nothing is sticky
    /// between commands.
    pub fn resolve(&self) -> ResetConfig {
        let defaults = ResetConfig::default();
        ResetConfig {
            pin: self.pin.unwrap_or(defaults.pin),
            period_ms: self.period_ms.unwrap_or(defaults.period_ms),
            active_high: self.active_high,
        }
    }
}

/// Payload parse failures for `TARGET SEND`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PayloadError {
    Empty,
    /// Hex payloads need an even digit count.
    OddHexLength,
    InvalidHexDigit,
    UnterminatedQuote,
    TooLong,
}

/// Parses a `TARGET SEND` payload: either a quoted string (sent verbatim
/// with a trailing CR appended) or a run of hex digits.
pub fn parse_send_payload(raw: &str) -> Result<Vec<u8, MAX_SEND_BYTES>, PayloadError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PayloadError::Empty);
    }

    let mut bytes = Vec::new();
    if let Some(quote) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let inner = &raw[1..];
        let end = inner.find(quote).ok_or(PayloadError::UnterminatedQuote)?;
        for byte in inner[..end].bytes() {
            bytes.push(byte).map_err(|_| PayloadError::TooLong)?;
        }
        bytes.push(b'\r').map_err(|_| PayloadError::TooLong)?;
        return Ok(bytes);
    }

    // Hex payload; whitespace between pairs is tolerated.
    let mut pending: Option<u8> = None;
    for digit in raw.bytes() {
        if digit.is_ascii_whitespace() {
            if pending.is_some() {
                return Err(PayloadError::OddHexLength);
            }
            continue;
        }
        let value = hex_value(digit).ok_or(PayloadError::InvalidHexDigit)?;
        match pending.take() {
            Some(hi) => bytes
                .push((hi << 4) | value)
                .map_err(|_| PayloadError::TooLong)?,
            None => pending = Some(value),
        }
    }
    if pending.is_some() {
        return Err(PayloadError::OddHexLength);
    }
    Ok(bytes)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Renders the response buffer as rows of 16 hex bytes.
pub fn render_response_hex(bytes: &[u8], mut line: impl FnMut(&str)) {
    use core::fmt::Write;

    if bytes.is_empty() {
        line("(no response)");
        return;
    }

    for row in bytes.chunks(16) {
        let mut text: heapless::String<64> = heapless::String::new();
        for (i, byte) in row.iter().enumerate() {
            if i > 0 {
                let _ = text.push(' ');
            }
            let _ = write!(text, "{:02X}", byte);
        }
        line(text.as_str());
    }
}

/// Hardware operations behind the target-facing commands. The firmware
/// implements this on the UART/GPIO peripherals; tests implement it with a
/// recording mock.
pub trait TargetPort {
    /// Queues bytes for the target UART.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TargetError>;

    /// Drains and returns the response buffer.
    fn take_response(&mut self) -> Vec<u8, RESPONSE_CAPACITY>;

    /// Pulses the reset line per `config`.
    fn pulse_reset(&mut self, config: &ResetConfig);

    /// Drives the target power switch.
    fn set_power(&mut self, action: PowerAction);

    /// Reboots the controller itself, optionally into the USB bootloader.
    fn reboot(&mut self, bootloader: bool);
}

/// Target peripheral failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TargetError {
    /// The UART transmit path rejected the write.
    UartUnavailable,
}
