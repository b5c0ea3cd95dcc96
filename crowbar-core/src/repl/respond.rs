//! Reply plumbing for the command surface.
//!
//! Replies are line-oriented with `OK:`/`ERROR:` prefixes. In API mode each
//! command is additionally acknowledged with single bytes — `.` on receipt,
//! `+` on success, `!` on failure — and confirmation chatter is suppressed
//! while query output still flows.

use core::fmt::Write;

use heapless::String;

/// Receipt acknowledge byte (API mode).
pub const ACK_RECEIVED: u8 = b'.';
/// Success acknowledge byte (API mode).
pub const ACK_OK: u8 = b'+';
/// Failure acknowledge byte (API mode).
pub const ACK_FAILED: u8 = b'!';

/// Longest single reply line.
pub const MAX_REPLY_LINE: usize = 128;

/// Transport the executor writes replies into.
pub trait ReplySink {
    /// Emits one complete reply line (terminator added by the transport).
    fn line(&mut self, text: &str);

    /// Emits a raw acknowledge byte (API mode).
    fn ack(&mut self, byte: u8);
}

/// Tracks the reply mode and the last error for the `ERROR` verb.
pub struct Responder {
    api_mode: bool,
    last_error: String<MAX_REPLY_LINE>,
}

impl Responder {
    pub const fn new() -> Self {
        Self {
            api_mode: false,
            last_error: String::new(),
        }
    }

    pub fn api_mode(&self) -> bool {
        self.api_mode
    }

    pub fn set_api_mode(&mut self, enabled: bool) {
        self.api_mode = enabled;
    }

    pub fn last_error(&self) -> &str {
        if self.last_error.is_empty() {
            "(none)"
        } else {
            self.last_error.as_str()
        }
    }

    /// Acknowledges line receipt (API mode only).
    pub fn received(&mut self, sink: &mut impl ReplySink) {
        if self.api_mode {
            sink.ack(ACK_RECEIVED);
        }
    }

    /// Reports success. `detail` is human-oriented confirmation, suppressed
    /// in API mode.
    pub fn ok(&mut self, sink: &mut impl ReplySink, detail: &str) {
        if self.api_mode {
            sink.ack(ACK_OK);
            return;
        }
        let mut line: String<MAX_REPLY_LINE> = String::new();
        let _ = write!(line, "OK: {detail}");
        sink.line(line.as_str());
    }

    /// Reports failure, retaining the message for the `ERROR` verb.
    pub fn fail(&mut self, sink: &mut impl ReplySink, message: &str) {
        self.last_error.clear();
        let _ = self.last_error.push_str(message);
        if self.api_mode {
            sink.ack(ACK_FAILED);
            return;
        }
        let mut line: String<MAX_REPLY_LINE> = String::new();
        let _ = write!(line, "ERROR: {message}");
        sink.line(line.as_str());
    }

    /// Emits query output; flows in both modes.
    pub fn reply(&mut self, sink: &mut impl ReplySink, text: &str) {
        sink.line(text);
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}
