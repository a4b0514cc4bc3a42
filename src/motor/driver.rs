// Per-axis stepper driver
//
// Walks a coil table once per step, holding each pattern for a fixed delay.
// The limit switch sits on the home (negative) side, so only negative moves
// consult it.

use embedded_hal::digital::{Error as _, ErrorKind, InputPin, OutputPin, PinState};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::pins::{DelayError, NoLimit, StepDelay};
use super::sequence::{CoilPattern, DE_ENERGIZED, StepMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Direction that moves by `delta`; `None` for zero
    pub fn of(delta: i64) -> Option<Self> {
        match delta {
            d if d > 0 => Some(Direction::Positive),
            d if d < 0 => Some(Direction::Negative),
            _ => None,
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }
}

/// What to do when the hold between coil patterns fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingFailurePolicy {
    /// Log it and keep stepping
    #[default]
    Continue,
    /// De-energize and fail the move
    Abort,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to drive coil {coil}: {kind:?}")]
    Coil { coil: usize, kind: ErrorKind },

    #[error("Step timing failed: {0}")]
    Timing(#[from] DelayError),
}

/// Outcome of one `move_steps` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Full passes through the step table
    pub steps_completed: u64,
    pub stopped_by_limit: bool,
    /// Failed holds that were stepped over
    pub timing_faults: u32,
}

/// One motor, as seen by the command dispatcher
pub trait AxisDriver: Send {
    /// Step `steps` times in `direction`; blocks until done or stopped by the limit switch
    fn move_steps(&mut self, steps: u64, direction: Direction) -> Result<StepReport, DriverError>;

    /// Limit switch state; false when the axis has none
    fn is_endstop_triggered(&mut self) -> bool;

    /// De-energize all coils
    fn stop(&mut self) -> Result<(), DriverError>;
}

/// Four-coil stepper driven directly from digital outputs
pub struct StepperMotor<P, D, L = NoLimit>
where
    P: OutputPin,
    D: StepDelay,
    L: InputPin,
{
    label: String,
    coils: [P; 4],
    table: &'static [CoilPattern],
    step_delay_us: u32,
    delay: D,
    limit: Option<L>,
    timing_policy: TimingFailurePolicy,
}

/// Construction-time settings; immutable for the life of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperSettings {
    pub mode: StepMode,
    /// Hold after each table entry
    pub step_delay_us: u32,
    pub timing_policy: TimingFailurePolicy,
}

impl<P, D> StepperMotor<P, D, NoLimit>
where
    P: OutputPin,
    D: StepDelay,
{
    /// Driver without a limit switch
    pub fn new(label: impl Into<String>, coils: [P; 4], settings: StepperSettings, delay: D) -> Self {
        StepperMotor::with_limit(label, coils, settings, delay, None)
    }
}

impl<P, D, L> StepperMotor<P, D, L>
where
    P: OutputPin,
    D: StepDelay,
    L: InputPin,
{
    /// Driver with an optional limit switch on the negative end of travel
    pub fn with_limit(
        label: impl Into<String>,
        coils: [P; 4],
        settings: StepperSettings,
        delay: D,
        limit: Option<L>,
    ) -> Self {
        Self {
            label: label.into(),
            coils,
            table: settings.mode.table(),
            step_delay_us: settings.step_delay_us,
            delay,
            limit,
            timing_policy: settings.timing_policy,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn coils(&self) -> &[P; 4] {
        &self.coils
    }

    fn write_pattern(&mut self, pattern: &CoilPattern) -> Result<(), DriverError> {
        for (coil, (pin, &level)) in self.coils.iter_mut().zip(pattern.iter()).enumerate() {
            pin.set_state(PinState::from(level != 0))
                .map_err(|e| DriverError::Coil {
                    coil,
                    kind: e.kind(),
                })?;
        }
        Ok(())
    }

    fn limit_active(&mut self) -> bool {
        match self.limit.as_mut() {
            None => false,
            Some(limit) => limit.is_high().unwrap_or_else(|e| {
                // An unreadable switch counts as pressed
                warn!("{}: limit switch read failed: {:?}", self.label, e.kind());
                true
            }),
        }
    }

    fn run_sequence(
        &mut self,
        steps: u64,
        direction: Direction,
        report: &mut StepReport,
    ) -> Result<(), DriverError> {
        let table = self.table;
        for _ in 0..steps {
            for i in 0..table.len() {
                let pattern = match direction {
                    Direction::Positive => &table[i],
                    Direction::Negative => &table[table.len() - 1 - i],
                };

                if direction == Direction::Negative && self.limit_active() {
                    warn!(
                        "{}: endstop triggered after {} of {} steps, stopping",
                        self.label, report.steps_completed, steps
                    );
                    report.stopped_by_limit = true;
                    return Ok(());
                }

                self.write_pattern(pattern)?;

                if let Err(e) = self.delay.delay_us(self.step_delay_us) {
                    match self.timing_policy {
                        TimingFailurePolicy::Continue => {
                            warn!("{}: {}", self.label, e);
                            report.timing_faults += 1;
                        }
                        TimingFailurePolicy::Abort => return Err(e.into()),
                    }
                }
            }
            report.steps_completed += 1;
        }
        Ok(())
    }
}

impl<P, D, L> AxisDriver for StepperMotor<P, D, L>
where
    P: OutputPin + Send,
    D: StepDelay,
    L: InputPin + Send,
{
    fn move_steps(&mut self, steps: u64, direction: Direction) -> Result<StepReport, DriverError> {
        debug!("{}: moving {} steps {:?}", self.label, steps, direction);
        let mut report = StepReport::default();
        let result = self.run_sequence(steps, direction, &mut report);

        // Coils are always left off, whatever ended the sequence
        let stopped = self.stop();
        result?;
        stopped?;
        trace!("{}: {:?}", self.label, report);
        Ok(report)
    }

    fn is_endstop_triggered(&mut self) -> bool {
        self.limit_active()
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.write_pattern(&DE_ENERGIZED)
    }
}

impl<P, D, L> Drop for StepperMotor<P, D, L>
where
    P: OutputPin,
    D: StepDelay,
    L: InputPin,
{
    fn drop(&mut self) {
        if let Err(e) = self.write_pattern(&DE_ENERGIZED) {
            warn!("{}: failed to de-energize on drop: {}", self.label, e);
        }
    }
}
