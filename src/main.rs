use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use grbl_stepper_runtime::config::{DEFAULT_BAUDRATE, MachineConfig};
use grbl_stepper_runtime::motion::{CommandDispatcher, MotionMode};
use grbl_stepper_runtime::motor::{
    SimulatedLimit, SimulatedPin, StdDelay, StepperMotor, StepperSettings, TimingFailurePolicy,
};
use grbl_stepper_runtime::runtime::{MonotonicClock, ProtocolSession, SessionSettings};
use grbl_stepper_runtime::transport::{SerialTransport, StdioTransport, Transport};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Motor = StepperMotor<SimulatedPin, StdDelay, SimulatedLimit>;

/// GRBL-compatible controller for three simulated four-coil steppers
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial port the host sender connects to; stdin/stdout when omitted
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    /// Machine config (JSON); built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Move all axes of a command at once instead of X, then Y, then Z
    #[arg(long)]
    parallel_axes: bool,

    /// Fail a move when a step delay fails instead of stepping on
    #[arg(long)]
    abort_on_timing_fault: bool,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout may be the protocol link (set RUST_LOG=debug for more)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let mut config = match &args.config {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    if args.parallel_axes {
        config.motion_mode = MotionMode::Parallel;
    }
    if args.abort_on_timing_fault {
        config.timing_failure = TimingFailurePolicy::Abort;
    }

    let gcode = CommandDispatcher::with_mode(build_motors(&config), config.motion_mode);
    let settings = SessionSettings::from(&config);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut worker = match args.port.as_deref() {
        Some(port) => {
            let transport = SerialTransport::open(port, args.baud)?;
            spawn_session(transport, gcode, settings, shutdown.clone())
        }
        None => {
            info!("Using stdin/stdout as the host link");
            spawn_session(StdioTransport::new(), gcode, settings, shutdown.clone())
        }
    };

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            true
        }
        joined = &mut worker => {
            joined?;
            false
        }
    };

    if interrupted {
        info!("Shutting down");
        shutdown.store(true, Ordering::SeqCst);
        // Motors de-energize when the session is dropped
        worker.await?;
    }
    Ok(())
}

fn build_motors(config: &MachineConfig) -> [Motor; 3] {
    let labels = ["X", "Y", "Z"];
    std::array::from_fn(|i| {
        let axis = &config.axes[i];
        info!(
            "Axis {}: coils {:?}, {:?} step, {}us delay, limit {:?}",
            labels[i], axis.coil_pins, axis.step_mode, axis.step_delay_us, axis.limit_pin
        );
        StepperMotor::with_limit(
            labels[i],
            axis.coil_pins.map(SimulatedPin::new),
            StepperSettings {
                mode: axis.step_mode,
                step_delay_us: axis.step_delay_us,
                timing_policy: config.timing_failure,
            },
            StdDelay,
            axis.limit_pin.map(SimulatedLimit::new),
        )
    })
}

/// The session loop blocks on motion, so it lives on the blocking pool
fn spawn_session<T>(
    transport: T,
    gcode: CommandDispatcher<Motor>,
    settings: SessionSettings,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    T: Transport + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut session = ProtocolSession::new(transport, MonotonicClock::new(), gcode, settings);
        session.run(&shutdown);
    })
}
