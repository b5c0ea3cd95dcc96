//! CLI transport and session.
//!
//! The USB interface task exchanges raw CDC frames with the session through
//! bounded channels; the session accumulates bytes into lines, runs them
//! through the shared command executor, and streams the buffered reply back
//! out in frame-sized chunks. The session also owns the completion tick
//! that auto-disarms finished hardware triggers.

use crowbar_core::repl::respond::ReplySink;
use heapless::{String, Vec};

#[cfg(target_os = "none")]
use crowbar_core::repl::commands::CommandExecutor;
#[cfg(target_os = "none")]
use embassy_futures::select::{select, Either};
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::channel::{Channel, Receiver, Sender};
#[cfg(target_os = "none")]
use embassy_time::{Duration, Ticker};

#[cfg(target_os = "none")]
use crate::glitch::PioFaultEngine;
#[cfg(target_os = "none")]
use crate::target::TargetLink;

/// Capacity of USB CDC frames exchanged with the interface task.
pub const FRAME_CAPACITY: usize = 64;

/// Queue depth for the CLI frame channels.
pub const FRAME_QUEUE_DEPTH: usize = 8;

/// Frame exchanged between the USB handler and the session.
pub type CliFrame = Vec<u8, FRAME_CAPACITY>;

#[cfg(target_os = "none")]
pub type CliChannel = Channel<ThreadModeRawMutex, CliFrame, FRAME_QUEUE_DEPTH>;

/// Maximum bytes accepted on a single command line.
pub const MAX_LINE_LEN: usize = 128;

/// Reply accumulation budget per command (STATUS and HELP are the largest).
pub const MAX_REPLY_BYTES: usize = 2048;

/// Errors while ingesting input into the line buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineError {
    Overflow,
}

/// Bounded buffer that accumulates bytes until CR or LF completes a line.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8, MAX_LINE_LEN>,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, byte: u8) -> Result<(), LineError> {
        self.buf.push(byte).map_err(|_| LineError::Overflow)
    }

    pub fn pop(&mut self) {
        self.buf.pop();
    }

    /// Yields the buffered line and clears the buffer.
    pub fn take(&mut self) -> Option<Vec<u8, MAX_LINE_LEN>> {
        if self.buf.is_empty() {
            return None;
        }

        let mut line = Vec::new();
        if line.extend_from_slice(self.buf.as_slice()).is_err() {
            return None;
        }
        self.buf.clear();
        Some(line)
    }
}

/// Collects one command's replies; the session flushes it to the CDC
/// transport afterwards. Overflow truncates with a marker rather than
/// blocking the executor.
#[derive(Default)]
pub struct ReplyBuffer {
    out: String<MAX_REPLY_BYTES>,
    truncated: bool,
}

impl ReplyBuffer {
    pub const fn new() -> Self {
        Self {
            out: String::new(),
            truncated: false,
        }
    }

    pub fn clear(&mut self) {
        self.out.clear();
        self.truncated = false;
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.out.as_bytes()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl ReplySink for ReplyBuffer {
    fn line(&mut self, text: &str) {
        if self.out.push_str(text).is_err() || self.out.push_str("\r\n").is_err() {
            self.truncated = true;
        }
    }

    fn ack(&mut self, byte: u8) {
        if self.out.push(byte as char).is_err() {
            self.truncated = true;
        }
    }
}

/// The CLI session: owns the controller stack and drives it from CDC
/// frames, interleaved with the periodic completion poll.
#[cfg(target_os = "none")]
pub struct CliSession {
    rx: Receiver<'static, ThreadModeRawMutex, CliFrame, FRAME_QUEUE_DEPTH>,
    tx: Sender<'static, ThreadModeRawMutex, CliFrame, FRAME_QUEUE_DEPTH>,
    executor: CommandExecutor<PioFaultEngine, TargetLink>,
    buffer: LineBuffer,
    reply: ReplyBuffer,
    drop_input: bool,
}

#[cfg(target_os = "none")]
impl CliSession {
    pub fn new(
        rx_queue: &'static CliChannel,
        tx_queue: &'static CliChannel,
        executor: CommandExecutor<PioFaultEngine, TargetLink>,
    ) -> Self {
        Self {
            rx: rx_queue.receiver(),
            tx: tx_queue.sender(),
            executor,
            buffer: LineBuffer::new(),
            reply: ReplyBuffer::new(),
            drop_input: false,
        }
    }

    pub async fn run(&mut self) -> ! {
        let mut poll = Ticker::every(Duration::from_millis(2));
        loop {
            match select(self.rx.receive(), poll.next()).await {
                Either::First(frame) => self.consume_frame(&frame).await,
                Either::Second(()) => self.executor.tick(),
            }
        }
    }

    async fn consume_frame(&mut self, frame: &CliFrame) {
        for &byte in frame {
            match byte {
                b'\r' | b'\n' => {
                    let discard = self.drop_input;
                    self.drop_input = false;
                    if let Some(line) = self.buffer.take() {
                        if !discard {
                            self.handle_line(line).await;
                        }
                    }
                }
                b'\x08' | b'\x7f' => {
                    self.buffer.pop();
                }
                byte if byte.is_ascii() && !self.drop_input => {
                    if self.buffer.push(byte) == Err(LineError::Overflow) {
                        self.drop_input = true;
                        self.send_bytes(b"ERROR: line too long\r\n").await;
                    }
                }
                _ => {}
            }
        }
    }

    async fn handle_line(&mut self, line: Vec<u8, MAX_LINE_LEN>) {
        let Ok(text) = core::str::from_utf8(line.as_slice()) else {
            self.send_bytes(b"ERROR: invalid utf-8\r\n").await;
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        defmt::debug!("cli: {}", text);
        self.reply.clear();
        self.executor.execute(text.trim(), &mut self.reply);
        if self.reply.is_truncated() {
            defmt::warn!("cli: reply truncated");
        }

        let mut out: Vec<u8, MAX_REPLY_BYTES> = Vec::new();
        let _ = out.extend_from_slice(self.reply.as_bytes());
        self.send_bytes(&out).await;
    }

    async fn send_bytes(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(FRAME_CAPACITY) {
            let mut frame = CliFrame::new();
            if frame.extend_from_slice(chunk).is_err() {
                continue;
            }
            self.tx.send(frame).await;
        }
    }
}
