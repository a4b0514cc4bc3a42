// Turns motion lines into axis moves
//
// Moves for one line run X, then Y, then Z, each to completion, and the target
// is committed only after every axis returned.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::{Axis, MotionModel, MotionRequest, PartialPosition, Position};
use crate::motor::{AxisDriver, Direction, DriverError};

/// How the axes of one move are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMode {
    /// One axis at a time, in X, Y, Z order
    #[default]
    Sequential,
    /// One thread per moving axis, all joined before the commit
    Parallel,
}

pub struct CommandDispatcher<A: AxisDriver> {
    axes: [A; 3],
    model: MotionModel,
    mode: MotionMode,
}

impl<A: AxisDriver> CommandDispatcher<A> {
    /// `axes` in X, Y, Z order
    pub fn new(axes: [A; 3]) -> Self {
        Self::with_mode(axes, MotionMode::default())
    }

    pub fn with_mode(axes: [A; 3], mode: MotionMode) -> Self {
        Self {
            axes,
            model: MotionModel::new(),
            mode,
        }
    }

    pub fn position(&self) -> Position {
        self.model.current_position()
    }

    pub fn axis_mut(&mut self, axis: Axis) -> &mut A {
        &mut self.axes[axis.index()]
    }

    /// Execute a `G0`/`G1` line; anything else is accepted and ignored
    pub fn parse_line(&mut self, line: &str) -> Result<(), DriverError> {
        let line = line.trim().to_uppercase();
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("G0") | Some("G1") => {}
            _ => return Ok(()),
        }

        let request = self.model.compute_target(tokens);
        self.execute(request)
    }

    pub fn set_position(&mut self, offsets: &PartialPosition) {
        debug!("Setting position {:?}", offsets);
        self.model.set_position(offsets);
    }

    /// Relative move; deltas are in steps. The caller checks the jog is in relative mode.
    pub fn jog(&mut self, dx: f64, dy: f64, dz: f64) -> Result<(), DriverError> {
        let request = self.model.jog([dx, dy, dz]);
        self.execute(request)
    }

    /// Back to the origin; modal state is fixed and needs no reset
    pub fn reset_state(&mut self) {
        self.model.reset();
    }

    fn execute(&mut self, request: MotionRequest) -> Result<(), DriverError> {
        let current = self.model.current_position();
        let moves = Axis::ALL.map(|axis| {
            let delta = request.target[axis].saturating_sub(current[axis]);
            Direction::of(delta).map(|direction| (delta.unsigned_abs(), direction))
        });
        debug!("Move {:?} -> {:?}", current, request.target);

        match self.mode {
            MotionMode::Sequential => self.run_sequential(moves)?,
            MotionMode::Parallel => self.run_parallel(moves)?,
        }

        self.model.commit(request);
        Ok(())
    }

    fn run_sequential(&mut self, moves: [Option<(u64, Direction)>; 3]) -> Result<(), DriverError> {
        for axis in Axis::ALL {
            if let Some((steps, direction)) = moves[axis.index()] {
                let report = self.axes[axis.index()].move_steps(steps, direction)?;
                if report.stopped_by_limit {
                    warn!("{} stopped at limit after {} of {} steps", axis, report.steps_completed, steps);
                }
            }
        }
        Ok(())
    }

    fn run_parallel(&mut self, moves: [Option<(u64, Direction)>; 3]) -> Result<(), DriverError> {
        let results = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .axes
                .iter_mut()
                .zip(Axis::ALL)
                .filter_map(|(driver, axis)| {
                    let (steps, direction) = moves[axis.index()]?;
                    Some((axis, steps, scope.spawn(move || driver.move_steps(steps, direction))))
                })
                .collect();

            handles
                .into_iter()
                .map(|(axis, steps, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                    (axis, steps, result)
                })
                .collect::<Vec<_>>()
        });

        let mut first_error = None;
        for (axis, steps, result) in results {
            match result {
                Ok(report) if report.stopped_by_limit => {
                    warn!("{} stopped at limit after {} of {} steps", axis, report.steps_completed, steps);
                }
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::StepReport;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<(Axis, u64, Direction)>>>;

    struct RecordingAxis {
        axis: Axis,
        calls: CallLog,
        fail: bool,
    }

    impl AxisDriver for RecordingAxis {
        fn move_steps(&mut self, steps: u64, direction: Direction) -> Result<StepReport, DriverError> {
            self.calls.lock().unwrap().push((self.axis, steps, direction));
            if self.fail {
                return Err(DriverError::Coil {
                    coil: 0,
                    kind: embedded_hal::digital::ErrorKind::Other,
                });
            }
            Ok(StepReport {
                steps_completed: steps,
                ..StepReport::default()
            })
        }

        fn is_endstop_triggered(&mut self) -> bool {
            false
        }

        fn stop(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn dispatcher(mode: MotionMode, failing: Option<Axis>) -> (CommandDispatcher<RecordingAxis>, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let axes = Axis::ALL.map(|axis| RecordingAxis {
            axis,
            calls: calls.clone(),
            fail: failing == Some(axis),
        });
        (CommandDispatcher::with_mode(axes, mode), calls)
    }

    #[test]
    fn test_moves_in_fixed_order_and_skips_zero_delta() {
        let (mut gcode, calls) = dispatcher(MotionMode::Sequential, None);
        gcode.parse_line("G0 Z1 Y5 X10").unwrap();
        gcode.parse_line("G0 X10 Y5 Z3").unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                (Axis::X, 10, Direction::Positive),
                (Axis::Y, 5, Direction::Positive),
                (Axis::Z, 1, Direction::Positive),
                (Axis::Z, 2, Direction::Positive),
            ]
        );
        assert_eq!(gcode.position(), Position::new(10, 5, 3));
    }

    #[test]
    fn test_truncation_drives_exact_deltas() {
        let (mut gcode, calls) = dispatcher(MotionMode::Sequential, None);
        gcode.parse_line("G0 X2.9").unwrap();
        gcode.parse_line("G0 X0").unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![(Axis::X, 2, Direction::Positive), (Axis::X, 2, Direction::Negative)]
        );
        assert_eq!(gcode.position(), Position::ORIGIN);
    }

    #[test]
    fn test_lowercase_motion_accepted() {
        let (mut gcode, _calls) = dispatcher(MotionMode::Sequential, None);
        gcode.parse_line("  g1 x4 y-2 ").unwrap();
        assert_eq!(gcode.position(), Position::new(4, -2, 0));
    }

    #[test]
    fn test_other_commands_are_no_ops() {
        let (mut gcode, calls) = dispatcher(MotionMode::Sequential, None);
        for line in ["G2 X5", "G00 X5", "M3 S1000", "", "G28", "X5"] {
            gcode.parse_line(line).unwrap();
        }
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(gcode.position(), Position::ORIGIN);
    }

    #[test]
    fn test_failed_move_not_committed() {
        let (mut gcode, calls) = dispatcher(MotionMode::Sequential, Some(Axis::Y));
        let err = gcode.parse_line("G1 X3 Y3 Z3").unwrap_err();
        assert!(matches!(err, DriverError::Coil { .. }));
        // Z is never reached once Y fails
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(gcode.position(), Position::ORIGIN);
    }

    #[test]
    fn test_jog_and_reset() {
        let (mut gcode, calls) = dispatcher(MotionMode::Sequential, None);
        gcode.jog(50.0, 0.0, -7.9).unwrap();
        assert_eq!(gcode.position(), Position::new(50, 0, -7));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(Axis::X, 50, Direction::Positive), (Axis::Z, 7, Direction::Negative)]
        );

        gcode.reset_state();
        assert_eq!(gcode.position(), Position::ORIGIN);
    }

    #[test]
    fn test_set_position_does_not_move() {
        let (mut gcode, calls) = dispatcher(MotionMode::Sequential, None);
        gcode.set_position(&PartialPosition::default().with(Axis::X, 40));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(gcode.position(), Position::new(40, 0, 0));
    }

    #[test]
    fn test_parallel_mode_moves_every_axis_then_commits() {
        let (mut gcode, calls) = dispatcher(MotionMode::Parallel, None);
        gcode.parse_line("G0 X3 Y-4").unwrap();

        let mut seen = calls.lock().unwrap().clone();
        seen.sort_by_key(|(axis, _, _)| axis.index());
        assert_eq!(
            seen,
            vec![(Axis::X, 3, Direction::Positive), (Axis::Y, 4, Direction::Negative)]
        );
        assert_eq!(gcode.position(), Position::new(3, -4, 0));
    }

    #[test]
    fn test_parallel_mode_reports_failure() {
        let (mut gcode, calls) = dispatcher(MotionMode::Parallel, Some(Axis::X));
        assert!(gcode.parse_line("G0 X3 Y3").is_err());
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(gcode.position(), Position::ORIGIN);
    }
}
