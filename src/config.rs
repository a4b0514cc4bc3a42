// Timing constants, default wiring, and the machine configuration file
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motion::MotionMode;
use crate::motor::{StepMode, TimingFailurePolicy};

// Status line pushed to the host when nothing else was reported for this long
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);

// Status lines emitted right after the version banner
pub const BANNER_STATUS_REPEAT: usize = 3;

// Jog distances arrive in millimeters; positions are tracked in steps
pub const DEFAULT_STEPS_PER_MM: f64 = 10.0;

// Hold time after each coil pattern
pub const DEFAULT_STEP_DELAY_US: u32 = 1500;

// Sleep while the host is not connected
pub const DISCONNECTED_POLL: Duration = Duration::from_millis(100);

// Sleep after a loop pass that read no input
pub const IDLE_POLL: Duration = Duration::from_millis(1);

// Serial link
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

// Coil pins per axis (in1..in4)
pub const X_COIL_PINS: [u8; 4] = [14, 15, 18, 23];
pub const Y_COIL_PINS: [u8; 4] = [2, 3, 4, 5];
pub const Z_COIL_PINS: [u8; 4] = [6, 7, 8, 9];

/// Option flags reported in the `[OPT:...]` build-info line
pub const DEFAULT_BUILD_OPTIONS: &str = "RS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Wiring and timing for one stepper axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub coil_pins: [u8; 4],
    pub step_delay_us: u32,
    pub step_mode: StepMode,
    pub limit_pin: Option<u8>,
}

impl AxisConfig {
    pub fn with_pins(coil_pins: [u8; 4]) -> Self {
        Self {
            coil_pins,
            ..Self::default()
        }
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            coil_pins: [0, 0, 0, 0],
            step_delay_us: DEFAULT_STEP_DELAY_US,
            step_mode: StepMode::Full,
            limit_pin: None,
        }
    }
}

/// Everything the runtime needs to know about the machine it drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// X, Y, Z in that order
    pub axes: [AxisConfig; 3],
    pub steps_per_mm: f64,
    pub heartbeat_interval_ms: u64,
    pub banner_status_repeat: usize,
    pub build_options: String,
    pub timing_failure: TimingFailurePolicy,
    pub motion_mode: MotionMode,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            axes: [
                AxisConfig::with_pins(X_COIL_PINS),
                AxisConfig::with_pins(Y_COIL_PINS),
                AxisConfig::with_pins(Z_COIL_PINS),
            ],
            steps_per_mm: DEFAULT_STEPS_PER_MM,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
            banner_status_repeat: BANNER_STATUS_REPEAT,
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
            timing_failure: TimingFailurePolicy::Continue,
            motion_mode: MotionMode::Sequential,
        }
    }
}

impl MachineConfig {
    /// Load a JSON config file; missing fields fall back to defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.steps_per_mm.is_finite() || self.steps_per_mm <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "steps_per_mm must be positive, got {}",
                self.steps_per_mm
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
