// Serial port link (USB CDC or UART)

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, warn};

use super::{LineBuffer, Result, Transport, TransportError};
use crate::config::RECONNECT_INTERVAL;

const READ_TIMEOUT_MS: u64 = 10;
const READ_CHUNK: usize = 256;

/// Serial link that reopens its port after the host goes away
pub struct SerialTransport {
    port_name: String,
    baudrate: u32,
    port: Option<Box<dyn SerialPort>>,
    lines: LineBuffer,
    last_attempt: Instant,
}

impl SerialTransport {
    /// Open the port now; fails if it cannot be opened at startup
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = Self::open_port(port_name, baudrate)?;
        info!("Opened {} at {} baud", port_name, baudrate);
        Ok(Self {
            port_name: port_name.to_string(),
            baudrate,
            port: Some(port),
            lines: LineBuffer::new(),
            last_attempt: Instant::now(),
        })
    }

    fn open_port(port_name: &str, baudrate: u32) -> Result<Box<dyn SerialPort>> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;
        Ok(port)
    }

    fn drop_port(&mut self, reason: &TransportError) {
        if self.port.take().is_some() {
            warn!("Lost {}: {}", self.port_name, reason);
        }
        self.last_attempt = Instant::now();
    }

    fn try_reopen(&mut self) {
        if self.last_attempt.elapsed() < RECONNECT_INTERVAL {
            return;
        }
        self.last_attempt = Instant::now();
        match Self::open_port(&self.port_name, self.baudrate) {
            Ok(port) => {
                info!("Reopened {}", self.port_name);
                self.lines = LineBuffer::new();
                self.port = Some(port);
            }
            Err(e) => debug!("Reopen of {} failed: {}", self.port_name, e),
        }
    }

    fn fill(&mut self) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        let waiting = port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(());
        }

        let mut chunk = [0u8; READ_CHUNK];
        let wanted = waiting.min(READ_CHUNK);
        match port.read(&mut chunk[..wanted]) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                self.lines.push(&chunk[..n]);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for SerialTransport {
    fn is_connected(&mut self) -> bool {
        if self.port.is_none() {
            self.try_reopen();
        }
        self.port.is_some()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.lines.pop() {
            return Ok(Some(line));
        }
        if let Err(e) = self.fill() {
            self.drop_port(&e);
            return Err(e);
        }
        Ok(self.lines.pop())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        let written = port.write_all(bytes).and_then(|_| port.flush());
        if let Err(e) = written {
            let e = TransportError::from(e);
            self.drop_port(&e);
            return Err(e);
        }
        Ok(())
    }
}
