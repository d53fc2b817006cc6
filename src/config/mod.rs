//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

pub use defaults::{DEFAULT_ENGINE_CMD, DEFAULT_EXIT_CLOSE_GRACE_MS, DEFAULT_OUTPUT_MARKER};
pub use validation::split_command;

/// CLI options for one party of a Viaduct computation. Validated values keep the
/// spawned engine and driver invocations well-formed.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "Viaduct player: bridges a secure-computation engine and a per-party driver",
    author,
    version
)]
pub struct AppConfig {
    /// Party number forwarded to the engine and used to pick the `player_<N>` driver
    #[arg(value_name = "PARTY")]
    pub party: u32,

    /// Program identifier forwarded to the engine; also the default driver directory
    #[arg(value_name = "PROGRAM")]
    pub program: PathBuf,

    /// Path to the engine binary
    #[arg(long = "engine", env = "VIADUCT_ENGINE", default_value = DEFAULT_ENGINE_CMD)]
    pub engine_cmd: String,

    /// Extra arguments placed before `<party> <program>` on the engine command line (repeatable)
    #[arg(
        long = "engine-arg",
        action = ArgAction::Append,
        value_name = "ARG",
        allow_hyphen_values = true
    )]
    pub engine_args: Vec<String>,

    /// Directory holding the `player_<N>` driver files (defaults to PROGRAM)
    #[arg(long = "driver-dir")]
    pub driver_dir: Option<PathBuf>,

    /// Interpreter command used to run the driver file, e.g. "python3 -u"
    #[arg(long = "driver-cmd", env = "VIADUCT_DRIVER_CMD")]
    pub driver_cmd: Option<String>,

    /// Marker token identifying protocol lines on the engine's stdout
    #[arg(long, default_value = DEFAULT_OUTPUT_MARKER)]
    pub marker: String,

    /// Give up waiting for an engine value after this many milliseconds
    #[arg(long = "receive-timeout-ms")]
    pub receive_timeout_ms: Option<u64>,

    /// Terminate the engine if its output is still open this long after the driver finishes
    #[arg(long = "shutdown-grace-ms")]
    pub shutdown_grace_ms: Option<u64>,

    /// Time the drainer gets to reach end-of-stream after the engine exits (milliseconds)
    #[arg(long = "exit-close-grace-ms", default_value_t = DEFAULT_EXIT_CLOSE_GRACE_MS)]
    pub exit_close_grace_ms: u64,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VIADUCT_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VIADUCT_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging protocol values and operator text (debug log only)
    #[arg(
        long = "log-content",
        env = "VIADUCT_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}
