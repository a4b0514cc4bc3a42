// Standard input/output link, for terminals, pipes, and socat-style bridges

use std::io::{Read, Write};

use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};
use tracing::{debug, info};

use super::{LineBuffer, Result, Transport};

const READ_CHUNK: usize = 256;

/// Stdin is read on a background thread; end of input ends the session
pub struct StdioTransport {
    incoming: UnboundedReceiver<Vec<u8>>,
    lines: LineBuffer,
    eof: bool,
}

impl StdioTransport {
    pub fn new() -> Self {
        let (tx, incoming) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match stdin.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        });
        Self {
            incoming,
            lines: LineBuffer::new(),
            eof: false,
        }
    }

    fn pump(&mut self) {
        loop {
            match self.incoming.try_recv() {
                Ok(bytes) => self.lines.push(&bytes),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.eof {
                        info!("End of input");
                    }
                    self.eof = true;
                    break;
                }
            }
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn is_connected(&mut self) -> bool {
        self.pump();
        !self.eof || self.lines.has_ready()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.pump();
        Ok(self.lines.pop())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.eof && !self.lines.has_ready()
    }
}
