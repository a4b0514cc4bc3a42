// In-memory link for tests and demos

use std::sync::{Arc, Mutex, MutexGuard};

use super::{LineBuffer, Result, Transport, TransportError};

#[derive(Debug, Default)]
struct State {
    connected: bool,
    closed: bool,
    input: LineBuffer,
    output: Vec<u8>,
}

impl State {
    /// A closed link stays up until its remaining input is consumed
    fn attached(&self) -> bool {
        self.connected || (self.closed && self.input.has_ready())
    }
}

/// Scripted link; clones share the same state
///
/// Keep one clone to feed input and collect output while the session owns another.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    /// A link with a host already attached
    pub fn connected() -> Self {
        let transport = Self {
            state: Arc::new(Mutex::new(State::default())),
        };
        transport.set_connected(true);
        transport
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicked test thread must not hide the recorded output
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// No more input will arrive; what is already queued is still delivered
    pub fn close(&self) {
        let mut state = self.state();
        state.connected = false;
        state.closed = true;
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state().input.push(bytes);
    }

    /// Queue `line` followed by CRLF
    pub fn push_line(&self, line: &str) {
        let mut state = self.state();
        state.input.push(line.as_bytes());
        state.input.push(b"\r\n");
    }

    /// Everything written since the last call
    pub fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut self.state().output);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Transport for MemoryTransport {
    fn is_connected(&mut self) -> bool {
        self.state().attached()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.state().input.pop())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        // Replies to the last queued lines still land after close
        if !state.connected && !state.closed {
            return Err(TransportError::Disconnected);
        }
        state.output.extend_from_slice(bytes);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        let state = self.state();
        state.closed && !state.input.has_ready()
    }
}
