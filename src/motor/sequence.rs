// Coil energization tables for four-coil unipolar steppers (28BYJ-48 style)

use serde::{Deserialize, Serialize};

/// Logic level per coil, in1..in4
pub type CoilPattern = [u8; 4];

/// All coils off
pub const DE_ENERGIZED: CoilPattern = [0, 0, 0, 0];

/// Two coils on at a time: more torque, 4 entries per step
pub const FULL_STEP: [CoilPattern; 4] = [
    [1, 1, 0, 0],
    [0, 1, 1, 0],
    [0, 0, 1, 1],
    [1, 0, 0, 1],
];

/// Alternating one/two coils: finer resolution, 8 entries per step
pub const HALF_STEP: [CoilPattern; 8] = [
    [1, 0, 0, 0],
    [1, 1, 0, 0],
    [0, 1, 0, 0],
    [0, 1, 1, 0],
    [0, 0, 1, 0],
    [0, 0, 1, 1],
    [0, 0, 0, 1],
    [1, 0, 0, 1],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    #[default]
    Full,
    Half,
}

impl StepMode {
    /// The table walked for one step in the positive direction
    pub fn table(self) -> &'static [CoilPattern] {
        match self {
            StepMode::Full => &FULL_STEP,
            StepMode::Half => &HALF_STEP,
        }
    }
}
