// Stepper motor control
//
// Provides:
// - Full-step and half-step coil tables
// - The per-axis driver (coil sequencing, limit switch, step timing)
// - Simulated pins and timing backends

mod driver;
pub mod pins;
pub mod sequence;

pub use driver::{
    AxisDriver, Direction, DriverError, StepReport, StepperMotor, StepperSettings,
    TimingFailurePolicy,
};
pub use pins::{DelayError, HalDelay, NoLimit, SimulatedLimit, SimulatedPin, StdDelay, StepDelay};
pub use sequence::{CoilPattern, StepMode};
