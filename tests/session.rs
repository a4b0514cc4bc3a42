// End-to-end protocol tests: a scripted host against a session with recording axes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::digital::ErrorKind;
use grbl_stepper_runtime::messages::{self, BANNER, OK, UNLOCK_HINT};
use grbl_stepper_runtime::motion::{Axis, CommandDispatcher, Position};
use grbl_stepper_runtime::motor::{AxisDriver, Direction, DriverError, StepReport};
use grbl_stepper_runtime::runtime::{
    ManualClock, ProtocolSession, SessionPhase, SessionSettings, Tick,
};
use grbl_stepper_runtime::transport::MemoryTransport;

type CallLog = Arc<Mutex<Vec<(Axis, u64, Direction)>>>;

struct RecordingAxis {
    axis: Axis,
    calls: CallLog,
    broken: Arc<AtomicBool>,
}

impl AxisDriver for RecordingAxis {
    fn move_steps(&mut self, steps: u64, direction: Direction) -> Result<StepReport, DriverError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DriverError::Coil {
                coil: 2,
                kind: ErrorKind::Other,
            });
        }
        self.calls.lock().unwrap().push((self.axis, steps, direction));
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

struct Harness {
    session: ProtocolSession<MemoryTransport, ManualClock, RecordingAxis>,
    host: MemoryTransport,
    clock: ManualClock,
    calls: CallLog,
    broken: Arc<AtomicBool>,
}

impl Harness {
    fn new() -> Self {
        let host = MemoryTransport::connected();
        let clock = ManualClock::new();
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let broken = Arc::new(AtomicBool::new(false));
        let axes = Axis::ALL.map(|axis| RecordingAxis {
            axis,
            calls: calls.clone(),
            broken: broken.clone(),
        });
        let session = ProtocolSession::new(
            host.clone(),
            clock.clone(),
            CommandDispatcher::new(axes),
            SessionSettings::default(),
        );
        Self {
            session,
            host,
            clock,
            calls,
            broken,
        }
    }

    /// Connected harness with the startup banner already consumed
    fn started() -> Self {
        let mut harness = Self::new();
        assert_eq!(harness.session.poll().unwrap(), Tick::Idle);
        harness.host.take_output();
        harness
    }

    /// Send one line and run a single loop pass
    fn send(&mut self, line: &str) -> String {
        self.host.push_line(line);
        assert_eq!(self.session.poll().unwrap(), Tick::Handled);
        self.host.take_output()
    }

    fn calls(&self) -> Vec<(Axis, u64, Direction)> {
        self.calls.lock().unwrap().clone()
    }

    fn position(&self) -> Position {
        self.session.dispatcher().position()
    }
}

fn status(x: i64, y: i64, z: i64) -> String {
    messages::status_report(&Position::new(x, y, z))
}

fn full_banner(x: i64, y: i64, z: i64) -> String {
    format!("{}{}{}", BANNER, UNLOCK_HINT, status(x, y, z).repeat(3))
}

#[test]
fn test_banner_on_connect() {
    let mut h = Harness::new();
    assert_eq!(h.session.state().phase, SessionPhase::Disconnected);

    h.session.poll().unwrap();
    assert_eq!(
        h.host.take_output(),
        "Grbl 1.1f ['$' for help]\r\n\
         [MSG:'$H'|'$X' to unlock]\r\n\
         <Idle|MPos:0.000,0.000,0.000|FS:0,0>\r\n\
         <Idle|MPos:0.000,0.000,0.000|FS:0,0>\r\n\
         <Idle|MPos:0.000,0.000,0.000|FS:0,0>\r\n"
    );
    assert_eq!(h.session.state().phase, SessionPhase::ConnectedActive);

    // Sent once only
    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), "");
}

#[test]
fn test_unknown_lines_are_acknowledged_without_motion() {
    let mut h = Harness::started();
    for line in ["M3 S1000", "G2 X1 Y1 I1", "hello", "G28"] {
        assert_eq!(h.send(line), OK);
    }
    assert!(h.calls().is_empty());
    assert_eq!(h.position(), Position::ORIGIN);
}

#[test]
fn test_motion_moves_x_then_y_and_skips_z() {
    let mut h = Harness::started();
    assert_eq!(h.send("G0 X10 Y5"), OK);
    assert_eq!(
        h.calls(),
        vec![(Axis::X, 10, Direction::Positive), (Axis::Y, 5, Direction::Positive)]
    );
    assert_eq!(h.position(), Position::new(10, 5, 0));
}

#[test]
fn test_truncation_toward_zero() {
    let mut h = Harness::started();
    h.send("G0 X2.9");
    h.send("G0 X0");
    assert_eq!(
        h.calls(),
        vec![(Axis::X, 2, Direction::Positive), (Axis::X, 2, Direction::Negative)]
    );
}

#[test]
fn test_status_query_reflects_committed_move() {
    let mut h = Harness::started();
    h.send("G0 X10");
    assert_eq!(h.send("?"), "<Idle|MPos:10.000,0.000,0.000|FS:0,0>\r\n");
}

#[test]
fn test_status_query_without_terminator() {
    let mut h = Harness::started();
    h.host.push_bytes(b"?");
    assert_eq!(h.session.poll().unwrap(), Tick::Handled);
    assert_eq!(h.host.take_output(), status(0, 0, 0));
}

#[test]
fn test_g92_sets_only_named_axes() {
    let mut h = Harness::started();
    h.send("G0 X5 Y7 Z3");
    assert_eq!(h.send("G92 X0 Y0"), OK);
    assert_eq!(h.position(), Position::new(0, 0, 3));
    // Offsets never move anything
    assert_eq!(h.calls().len(), 3);
}

#[test]
fn test_g92_skips_bad_values() {
    let mut h = Harness::started();
    h.send("G0 X5 Y7");
    assert_eq!(h.send("G92 Xoops Y1.8"), OK);
    assert_eq!(h.position(), Position::new(5, 1, 0));
}

#[test]
fn test_relative_jog_scaled_to_steps() {
    let mut h = Harness::started();
    assert_eq!(h.send("$J=G91 X5"), OK);
    assert_eq!(h.calls(), vec![(Axis::X, 50, Direction::Positive)]);
    assert_eq!(h.position(), Position::new(50, 0, 0));

    h.send("$J=G91 G21 Y-0.5 F500");
    assert_eq!(h.calls()[1], (Axis::Y, 5, Direction::Negative));
    assert_eq!(h.position(), Position::new(50, -5, 0));
}

#[test]
fn test_absolute_jog_rejected() {
    let mut h = Harness::started();
    assert_eq!(h.send("$J=G90 X5"), messages::JOG_REJECTED);
    assert!(h.calls().is_empty());

    // The session keeps going
    assert_eq!(h.send("$X"), OK);
}

#[test]
fn test_soft_reset_rebanners_at_origin() {
    let mut h = Harness::started();
    h.send("G0 X4 Y4 Z4");

    assert_eq!(h.send("\x18"), "");
    assert_eq!(h.session.state().phase, SessionPhase::ConnectedAwaitingBanner);
    assert_eq!(h.position(), Position::ORIGIN);

    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), full_banner(0, 0, 0));
    assert_eq!(h.session.state().phase, SessionPhase::ConnectedActive);
}

#[test]
fn test_build_info_rebanners_without_reset() {
    let mut h = Harness::started();
    h.send("G0 X3");

    assert_eq!(
        h.send("$I"),
        "[VER:MicroPythonGRBL:1.1]\r\n[OPT:RS,USB,3AXIS]\r\nok\r\n"
    );
    assert_eq!(h.session.state().phase, SessionPhase::ConnectedAwaitingBanner);

    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), full_banner(3, 0, 0));
    assert_eq!(h.position(), Position::new(3, 0, 0));
}

#[test]
fn test_fixed_settings_responses() {
    let mut h = Harness::started();
    assert_eq!(h.send("$X"), "ok\r\n");
    assert_eq!(h.send("$"), "$$=not_implemented\r\nok\r\n");
    assert_eq!(h.send("$$"), "$$=not_implemented\r\nok\r\n");
    assert_eq!(h.send("$G"), "[G91 G21 G94]\r\nok\r\n");
}

#[test]
fn test_heartbeat_after_interval() {
    let mut h = Harness::started();

    h.clock.advance(Duration::from_millis(2000));
    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), "");

    h.clock.advance(Duration::from_millis(1));
    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), status(0, 0, 0));

    // Timer restarted
    h.clock.advance(Duration::from_millis(1000));
    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), "");
}

#[test]
fn test_heartbeat_sent_alongside_command() {
    let mut h = Harness::started();
    h.clock.advance(Duration::from_millis(2500));
    assert_eq!(h.send("$X"), format!("{}{}", status(0, 0, 0), OK));
}

#[test]
fn test_status_query_restarts_heartbeat() {
    let mut h = Harness::started();
    h.clock.advance(Duration::from_millis(1500));
    h.send("?");
    h.clock.advance(Duration::from_millis(1500));
    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), "");
}

#[test]
fn test_disconnect_and_reconnect() {
    let mut h = Harness::started();
    h.send("G0 Z9");

    h.host.set_connected(false);
    assert_eq!(h.session.poll().unwrap(), Tick::Disconnected);
    assert_eq!(h.session.state().phase, SessionPhase::Disconnected);

    h.host.set_connected(true);
    h.session.poll().unwrap();
    assert_eq!(h.host.take_output(), full_banner(0, 0, 9));
}

#[test]
fn test_motor_fault_reported_and_session_continues() {
    let mut h = Harness::started();
    h.broken.store(true, Ordering::SeqCst);
    assert_eq!(h.send("G1 X5"), "error: Failed to drive coil 2: Other\r\n");
    assert_eq!(h.position(), Position::ORIGIN);

    h.broken.store(false, Ordering::SeqCst);
    assert_eq!(h.send("G1 X5"), OK);
    assert_eq!(h.position(), Position::new(5, 0, 0));
}

#[test]
fn test_blank_lines_ignored() {
    let mut h = Harness::started();
    h.host.push_line("   ");
    assert_eq!(h.session.poll().unwrap(), Tick::Handled);
    assert_eq!(h.host.take_output(), "");
}

#[test]
fn test_run_until_input_ends() {
    let mut h = Harness::new();
    h.host.push_line("G0 X3");
    h.host.push_line("?");
    h.host.close();

    h.session.run(&AtomicBool::new(false));

    let expected = format!("{}{}{}", full_banner(0, 0, 0), OK, status(3, 0, 0));
    assert_eq!(h.host.take_output(), expected);
}
