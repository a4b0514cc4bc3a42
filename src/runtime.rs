// Host protocol session: banner, heartbeat, and command dispatch
//
// One loop pass: check the link, send the banner if owed, push a heartbeat
// status if due, then handle at most one line. Motion blocks the loop, so
// nothing (not even a soft reset) is seen until a move finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{DISCONNECTED_POLL, IDLE_POLL, MachineConfig};
use crate::messages::{self, SOFT_RESET};
use crate::motion::{AxisWords, CommandDispatcher};
use crate::motor::{AxisDriver, DriverError};
use crate::transport::{Transport, TransportError};

/// Millisecond time source for heartbeat scheduling
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Monotonic time since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    ConnectedAwaitingBanner,
    ConnectedActive,
}

/// Link state owned by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub last_heartbeat_ms: u64,
}

/// Result of one loop pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No host attached
    Disconnected,
    /// Connected, no line was waiting
    Idle,
    /// A line was read and answered
    Handled,
}

/// Protocol-level settings taken from the machine config
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub heartbeat_interval_ms: u64,
    pub banner_status_repeat: usize,
    pub steps_per_mm: f64,
    pub build_options: String,
}

impl From<&MachineConfig> for SessionSettings {
    fn from(config: &MachineConfig) -> Self {
        Self {
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            banner_status_repeat: config.banner_status_repeat,
            steps_per_mm: config.steps_per_mm,
            build_options: config.build_options.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&MachineConfig::default())
    }
}

/// Failure while handling one command line; reported to the host as `error: ...`
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Motion(#[from] DriverError),
}

pub struct ProtocolSession<T, C, A>
where
    T: Transport,
    C: Clock,
    A: AxisDriver,
{
    transport: T,
    clock: C,
    gcode: CommandDispatcher<A>,
    settings: SessionSettings,
    state: SessionState,
}

impl<T, C, A> ProtocolSession<T, C, A>
where
    T: Transport,
    C: Clock,
    A: AxisDriver,
{
    pub fn new(transport: T, clock: C, gcode: CommandDispatcher<A>, settings: SessionSettings) -> Self {
        let now = clock.now_ms();
        Self {
            transport,
            clock,
            gcode,
            settings,
            state: SessionState {
                phase: SessionPhase::Disconnected,
                last_heartbeat_ms: now,
            },
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<A> {
        &self.gcode
    }

    /// Loop until `shutdown` is set or the link closes for good
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            "Session started: {}ms heartbeat, {} steps/mm",
            self.settings.heartbeat_interval_ms, self.settings.steps_per_mm
        );

        while !shutdown.load(Ordering::SeqCst) {
            match self.poll() {
                Ok(Tick::Handled) => {}
                Ok(Tick::Idle) => std::thread::sleep(IDLE_POLL),
                Ok(Tick::Disconnected) => {
                    if self.transport.is_closed() {
                        info!("Link closed, stopping session");
                        break;
                    }
                    std::thread::sleep(DISCONNECTED_POLL);
                }
                Err(e) => {
                    warn!("Transport error: {}", e);
                    std::thread::sleep(DISCONNECTED_POLL);
                }
            }
        }
    }

    /// One pass of the control loop
    pub fn poll(&mut self) -> Result<Tick, TransportError> {
        if !self.transport.is_connected() {
            if self.state.phase != SessionPhase::Disconnected {
                info!("Host disconnected");
                self.enter(SessionPhase::Disconnected);
            }
            return Ok(Tick::Disconnected);
        }

        if self.state.phase == SessionPhase::Disconnected {
            info!("Host connected");
            self.enter(SessionPhase::ConnectedAwaitingBanner);
        }

        if self.state.phase == SessionPhase::ConnectedAwaitingBanner {
            self.send_banner()?;
            self.state.phase = SessionPhase::ConnectedActive;
        }

        let now = self.clock.now_ms();
        if now.saturating_sub(self.state.last_heartbeat_ms) > self.settings.heartbeat_interval_ms {
            self.send_status()?;
        }

        match self.transport.read_line()? {
            Some(line) => {
                self.handle_line(&line)?;
                Ok(Tick::Handled)
            }
            None => Ok(Tick::Idle),
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        self.state.phase = phase;
        self.state.last_heartbeat_ms = self.clock.now_ms();
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        self.transport.write_all(text.as_bytes())
    }

    fn send_status(&mut self) -> Result<(), TransportError> {
        let report = messages::status_report(&self.gcode.position());
        self.write(&report)?;
        self.state.last_heartbeat_ms = self.clock.now_ms();
        Ok(())
    }

    fn send_banner(&mut self) -> Result<(), TransportError> {
        debug!("Sending banner");
        self.write(messages::BANNER)?;
        self.write(messages::UNLOCK_HINT)?;
        for _ in 0..self.settings.banner_status_repeat {
            self.send_status()?;
        }
        Ok(())
    }

    /// Answer one line; command failures become an `error:` line, link failures propagate
    fn handle_line(&mut self, raw: &str) -> Result<(), TransportError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }
        debug!("<< {:?}", line);

        match self.dispatch(line) {
            Ok(()) => Ok(()),
            Err(CommandFailure::Command(e)) => {
                warn!("Command {:?} failed: {}", line, e);
                self.write(&messages::runtime_error(e))
            }
            Err(CommandFailure::Link(e)) => Err(e),
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<(), CommandFailure> {
        if line.as_bytes() == &[SOFT_RESET] {
            info!("Soft reset");
            self.gcode.reset_state();
            self.enter(SessionPhase::ConnectedAwaitingBanner);
            return Ok(());
        }

        match line {
            "?" => self.send_status()?,
            "$I" => {
                self.write(messages::VERSION)?;
                self.write(&messages::build_options(&self.settings.build_options))?;
                self.write(messages::OK)?;
                self.state.phase = SessionPhase::ConnectedAwaitingBanner;
            }
            "$X" => self.write(messages::OK)?,
            "$" | "$$" => {
                self.write(messages::SETTINGS_PLACEHOLDER)?;
                self.write(messages::OK)?;
            }
            "$G" => {
                self.write(messages::PARSER_STATE)?;
                self.write(messages::OK)?;
            }
            _ if line.starts_with("G92") => {
                let offsets = AxisWords::parse(line.split_whitespace().skip(1)).to_steps();
                self.gcode.set_position(&offsets);
                self.write(messages::OK)?;
            }
            _ if line.starts_with("$J=") => self.jog(&line[3..])?,
            _ => {
                self.gcode.parse_line(line).map_err(SessionError::from)?;
                self.write(messages::OK)?;
            }
        }
        Ok(())
    }

    fn jog(&mut self, command: &str) -> Result<(), CommandFailure> {
        let command = command.trim();
        if !command.starts_with("G91") {
            self.write(messages::JOG_REJECTED)?;
            return Ok(());
        }

        let [dx, dy, dz] = AxisWords::parse(command.split_whitespace()).scaled(self.settings.steps_per_mm);
        debug!("Jog by {}, {}, {} steps", dx, dy, dz);
        self.gcode.jog(dx, dy, dz).map_err(SessionError::from)?;
        self.write(messages::OK)?;
        Ok(())
    }
}

/// Why one line could not be answered normally
#[derive(Debug)]
enum CommandFailure {
    /// Reported to the host; the session carries on
    Command(SessionError),
    /// The link itself failed; nothing can be reported
    Link(TransportError),
}

impl From<SessionError> for CommandFailure {
    fn from(e: SessionError) -> Self {
        CommandFailure::Command(e)
    }
}

impl From<TransportError> for CommandFailure {
    fn from(e: TransportError) -> Self {
        CommandFailure::Link(e)
    }
}
