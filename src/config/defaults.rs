/// Engine binary launched when `--engine` is not given.
pub const DEFAULT_ENGINE_CMD: &str = "./Player.x";

/// Token that marks an engine stdout line as carrying a protocol value.
pub const DEFAULT_OUTPUT_MARKER: &str = "VIADUCT_OUTPUT";

/// How long the exit monitor lets the drainer catch up after the engine exits.
pub const DEFAULT_EXIT_CLOSE_GRACE_MS: u64 = 1_000;

pub(super) const MAX_ENGINE_ARGS: usize = 64;
pub(super) const MAX_ENGINE_ARG_BYTES: usize = 8 * 1024;
pub(super) const MAX_MARKER_BYTES: usize = 128;

pub(super) const MAX_RECEIVE_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1_000;
pub(super) const MAX_GRACE_MS: u64 = 10 * 60 * 1_000;
/// One exit-monitor poll; a shorter grace lets the monitor close the queue
/// before the drainer has read the engine's last lines.
pub(super) const MIN_EXIT_CLOSE_GRACE_MS: u64 = 50;
