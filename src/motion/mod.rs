// G-code motion: position tracking and command dispatch

mod dispatcher;
pub mod model;

pub use dispatcher::{CommandDispatcher, MotionMode};
pub use model::{Axis, AxisWords, MotionModel, MotionRequest, PartialPosition, Position};
