// Line-oriented host link
//
// The protocol session only needs three things from a link: whether a host is
// there, the next complete line (without blocking), and a way to write bytes.

mod memory;
mod serial;
mod stdio;

use std::collections::VecDeque;

pub use memory::MemoryTransport;
pub use serial::SerialTransport;
pub use stdio::StdioTransport;

use crate::messages::SOFT_RESET;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Host disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, TransportError>;

pub trait Transport {
    /// Whether a host is attached; may try to re-establish a dropped link
    fn is_connected(&mut self) -> bool;

    /// Next complete line, or `None` if nothing is waiting; never blocks
    fn read_line(&mut self) -> Result<Option<String>>;

    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// The link is gone for good (e.g. end of input); the session stops
    fn is_closed(&self) -> bool {
        false
    }
}

/// Splits an incoming byte stream into lines
///
/// Lines end at CR or LF; empty lines are dropped. Soft reset and `?` are
/// real-time bytes that hosts send without a terminator, so they come out as
/// lines of their own as soon as they arrive.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match byte {
                b'\r' | b'\n' => self.finish_line(),
                b'?' => self.ready.push_back("?".to_string()),
                SOFT_RESET => self.ready.push_back(char::from(SOFT_RESET).to_string()),
                b => self.pending.push(b),
            }
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    fn finish_line(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.ready.push_back(line);
    }
}
