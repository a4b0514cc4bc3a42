// Machine position and the arithmetic that turns G-code words into targets
//
// Positions are whole motor steps. Word values truncate toward zero, so
// `X2.9` targets step 2, never 3.

use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Fixed order in which axes are always processed
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Step count per axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position(pub [i64; 3]);

impl Position {
    pub const ORIGIN: Position = Position([0, 0, 0]);

    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self([x, y, z])
    }
}

impl Index<Axis> for Position {
    type Output = i64;

    fn index(&self, axis: Axis) -> &i64 {
        &self.0[axis.index()]
    }
}

impl IndexMut<Axis> for Position {
    fn index_mut(&mut self, axis: Axis) -> &mut i64 {
        &mut self.0[axis.index()]
    }
}

/// Values for the axes a command mentioned; the rest stay `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialPosition(pub [Option<i64>; 3]);

impl PartialPosition {
    pub fn with(mut self, axis: Axis, steps: i64) -> Self {
        self.0[axis.index()] = Some(steps);
        self
    }

    pub fn get(&self, axis: Axis) -> Option<i64> {
        self.0[axis.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Raw axis words (`X1.5`, `Z-3`) parsed from a line
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisWords(pub [Option<f64>; 3]);

impl AxisWords {
    /// Collect every token that starts with an axis letter
    ///
    /// Tokens whose value does not parse to a finite number are skipped on
    /// their own; a later word for the same axis replaces an earlier one.
    pub fn parse<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let mut words = Self::default();
        for token in tokens {
            if let Some((axis, value)) = parse_axis_word(token) {
                words.0[axis.index()] = Some(value);
            }
        }
        words
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.0[axis.index()]
    }

    /// Whole steps per mentioned axis
    pub fn to_steps(&self) -> PartialPosition {
        PartialPosition(self.0.map(|value| value.map(truncate_steps)))
    }

    /// Per-axis values multiplied by `factor`; unmentioned axes are zero
    pub fn scaled(&self, factor: f64) -> [f64; 3] {
        self.0.map(|value| value.unwrap_or(0.0) * factor)
    }
}

fn parse_axis_word(token: &str) -> Option<(Axis, f64)> {
    let mut chars = token.chars();
    let axis = Axis::from_letter(chars.next()?)?;
    let value: f64 = chars.as_str().parse().ok()?;
    value.is_finite().then_some((axis, value))
}

/// Truncate toward zero, saturating at the `i64` range
pub fn truncate_steps(value: f64) -> i64 {
    value.trunc() as i64
}

/// Absolute per-axis target for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionRequest {
    pub target: Position,
}

/// Current position and position algebra; performs no I/O
#[derive(Debug, Clone, Default)]
pub struct MotionModel {
    position: Position,
}

impl MotionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_position(&self) -> Position {
        self.position
    }

    /// Overwrite only the axes present in `offsets`
    pub fn set_position(&mut self, offsets: &PartialPosition) {
        for axis in Axis::ALL {
            if let Some(steps) = offsets.get(axis) {
                self.position[axis] = steps;
            }
        }
    }

    /// Overlay the axis words in `tokens` onto the current position
    pub fn compute_target<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) -> MotionRequest {
        self.overlay(&AxisWords::parse(tokens).to_steps())
    }

    fn overlay(&self, offsets: &PartialPosition) -> MotionRequest {
        let mut target = self.position;
        for axis in Axis::ALL {
            if let Some(steps) = offsets.get(axis) {
                target[axis] = steps;
            }
        }
        MotionRequest { target }
    }

    /// Target relative to the current position; deltas are already in steps
    pub fn jog(&self, delta: [f64; 3]) -> MotionRequest {
        let mut target = self.position;
        for axis in Axis::ALL {
            target[axis] = target[axis].saturating_add(truncate_steps(delta[axis.index()]));
        }
        MotionRequest { target }
    }

    pub fn commit(&mut self, request: MotionRequest) {
        self.position = request.target;
    }

    pub fn reset(&mut self) {
        self.position = Position::ORIGIN;
    }
}
