// Host session replay: feed a G-code program through the controller and print the exchange
//
// No hardware needed - the motors use simulated pins.
//
// Usage: cargo run --example host_session -- [program.gcode]
// Without a file a short built-in program runs (square, jog, offset, soft reset).

use grbl_stepper_runtime::config::MachineConfig;
use grbl_stepper_runtime::motion::CommandDispatcher;
use grbl_stepper_runtime::motor::{SimulatedPin, StdDelay, StepperMotor, StepperSettings};
use grbl_stepper_runtime::runtime::{MonotonicClock, ProtocolSession, SessionSettings, Tick};
use grbl_stepper_runtime::transport::MemoryTransport;

const BUILTIN_PROGRAM: &[&str] = &[
    "$I", "$G", "G0 X20", "G1 Y20", "G1 X0", "G1 Y0", "$J=G91 X1.5 Z0.5", "?", "$J=G90 X0",
    "G92 X0 Y0 Z0", "?", "\x18", "?",
];

// Short hold so the replay finishes quickly
const DEMO_STEP_DELAY_US: u32 = 50;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let program: Vec<String> = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)?
            .lines()
            .map(str::to_string)
            .collect(),
        None => BUILTIN_PROGRAM.iter().map(|line| line.to_string()).collect(),
    };

    let config = MachineConfig::default();
    let motors = std::array::from_fn(|i| {
        let axis = &config.axes[i];
        StepperMotor::new(
            ["X", "Y", "Z"][i],
            axis.coil_pins.map(SimulatedPin::new),
            StepperSettings {
                mode: axis.step_mode,
                step_delay_us: DEMO_STEP_DELAY_US,
                timing_policy: config.timing_failure,
            },
            StdDelay,
        )
    });

    let host = MemoryTransport::connected();
    let mut session = ProtocolSession::new(
        host.clone(),
        MonotonicClock::new(),
        CommandDispatcher::new(motors),
        SessionSettings::from(&config),
    );

    println!("Steps per mm: {}", config.steps_per_mm);
    println!();

    // Startup banner
    session.poll()?;
    print_replies(&host.take_output());

    for line in &program {
        println!(">> {}", line.escape_debug());
        host.push_line(line);
        // The idle pass after the line also sends any banner a reset left owing
        while session.poll()? == Tick::Handled {}
        print_replies(&host.take_output());
    }

    println!();
    println!("Final position (steps): {:?}", session.dispatcher().position());
    Ok(())
}

fn print_replies(output: &str) {
    for reply in output.lines() {
        println!("<< {}", reply);
    }
}
