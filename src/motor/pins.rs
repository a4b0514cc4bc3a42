// Pin and timing backends for the stepper driver
//
// Coils and limit switches are plain embedded-hal digital pins, so a board HAL
// can be dropped in directly. The simulated pins below back the host binary and
// the tests.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use tracing::trace;

/// The per-entry hold failed
#[derive(Debug, Clone, thiserror::Error)]
#[error("Delay of {us}us failed: {reason}")]
pub struct DelayError {
    pub us: u32,
    pub reason: String,
}

/// Timing primitive used between coil patterns
///
/// Unlike `DelayNs` this may fail, so the driver can decide what a failed hold means.
pub trait StepDelay: Send {
    fn delay_us(&mut self, us: u32) -> Result<(), DelayError>;
}

/// Blocking sleep on the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl StepDelay for StdDelay {
    fn delay_us(&mut self, us: u32) -> Result<(), DelayError> {
        std::thread::sleep(Duration::from_micros(us as u64));
        Ok(())
    }
}

/// Adapts any embedded-hal delay provider; never fails
#[derive(Debug)]
pub struct HalDelay<D>(pub D);

impl<D: DelayNs + Send> StepDelay for HalDelay<D> {
    fn delay_us(&mut self, us: u32) -> Result<(), DelayError> {
        self.0.delay_us(us);
        Ok(())
    }
}

/// Output pin that only records and traces its level
#[derive(Debug, Clone)]
pub struct SimulatedPin {
    pin: u8,
    level: bool,
}

impl SimulatedPin {
    pub fn new(pin: u8) -> Self {
        Self { pin, level: false }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn is_set_high(&self) -> bool {
        self.level
    }
}

impl ErrorType for SimulatedPin {
    type Error = Infallible;
}

impl OutputPin for SimulatedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.level {
            trace!("pin {} -> low", self.pin);
        }
        self.level = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.level {
            trace!("pin {} -> high", self.pin);
        }
        self.level = true;
        Ok(())
    }
}

/// Limit switch whose state is shared between clones
///
/// Hand one clone to the driver and keep another to press the switch.
#[derive(Debug, Clone)]
pub struct SimulatedLimit {
    pin: u8,
    active: Arc<AtomicBool>,
}

impl SimulatedLimit {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl ErrorType for SimulatedLimit {
    type Error = Infallible;
}

impl InputPin for SimulatedLimit {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.active.load(Ordering::SeqCst))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.active.load(Ordering::SeqCst))
    }
}

/// Placeholder input for axes without a limit switch; never read
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimit;

impl ErrorType for NoLimit {
    type Error = Infallible;
}

impl InputPin for NoLimit {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
