// Response lines sent to the host sender
//
// Hosts match these byte for byte, so every line carries its own CRLF.

use crate::motion::Position;

pub const BANNER: &str = "Grbl 1.1f ['$' for help]\r\n";
pub const UNLOCK_HINT: &str = "[MSG:'$H'|'$X' to unlock]\r\n";
pub const VERSION: &str = "[VER:MicroPythonGRBL:1.1]\r\n";
pub const SETTINGS_PLACEHOLDER: &str = "$$=not_implemented\r\n";
pub const PARSER_STATE: &str = "[G91 G21 G94]\r\n";
pub const OK: &str = "ok\r\n";
pub const JOG_REJECTED: &str = "error: Only G91 (relative) jogs supported\r\n";

/// Control byte a host sends to request a soft reset (Ctrl-X)
pub const SOFT_RESET: u8 = 0x18;

/// Real-time status report, positions in steps
pub fn status_report(position: &Position) -> String {
    let [x, y, z] = position.0;
    format!(
        "<Idle|MPos:{:.3},{:.3},{:.3}|FS:0,0>\r\n",
        x as f64, y as f64, z as f64
    )
}

/// `[OPT:...]` line with the configured option flags
pub fn build_options(flags: &str) -> String {
    format!("[OPT:{},USB,3AXIS]\r\n", flags)
}

/// Error line for a failure while handling one command
pub fn runtime_error(message: impl std::fmt::Display) -> String {
    format!("error: {}\r\n", message)
}
