use super::defaults::{
    MAX_ENGINE_ARGS, MAX_ENGINE_ARG_BYTES, MAX_GRACE_MS, MAX_MARKER_BYTES, MAX_RECEIVE_TIMEOUT_MS,
    MIN_EXIT_CLOSE_GRACE_MS,
};
use super::AppConfig;
use crate::engine::EngineCommand;
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::{path::Path, time::Duration};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the ones passed to subprocesses.
    pub fn validate(&mut self) -> Result<()> {
        self.engine_cmd = self.engine_cmd.trim().to_string();
        if self.engine_cmd.is_empty() {
            bail!("--engine cannot be empty");
        }

        if self.program.as_os_str().is_empty() {
            bail!("PROGRAM cannot be empty");
        }
        if self.program.to_str().is_none() {
            bail!("PROGRAM must be valid UTF-8");
        }

        // Keep argv small; the engine gets these verbatim.
        if self.engine_args.len() > MAX_ENGINE_ARGS {
            bail!(
                "--engine-arg repeated too many times (max {MAX_ENGINE_ARGS}, got {})",
                self.engine_args.len()
            );
        }
        let total_arg_bytes: usize = self.engine_args.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_ENGINE_ARG_BYTES {
            bail!("combined --engine-arg length exceeds {MAX_ENGINE_ARG_BYTES} bytes");
        }

        if self.marker.is_empty() {
            bail!("--marker must not be empty");
        }
        if self.marker.len() > MAX_MARKER_BYTES {
            bail!("--marker must be at most {MAX_MARKER_BYTES} bytes");
        }
        if self
            .marker
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
        {
            bail!("--marker must not contain whitespace or control characters");
        }

        if let Some(raw) = &self.driver_cmd {
            split_command(raw).map_err(|err| anyhow!("--driver-cmd is invalid: {err}"))?;
        }

        if let Some(ms) = self.receive_timeout_ms {
            if !(1..=MAX_RECEIVE_TIMEOUT_MS).contains(&ms) {
                bail!("--receive-timeout-ms must be between 1 and {MAX_RECEIVE_TIMEOUT_MS}, got {ms}");
            }
        }
        if let Some(ms) = self.shutdown_grace_ms {
            if !(1..=MAX_GRACE_MS).contains(&ms) {
                bail!("--shutdown-grace-ms must be between 1 and {MAX_GRACE_MS}, got {ms}");
            }
        }
        if !(MIN_EXIT_CLOSE_GRACE_MS..=MAX_GRACE_MS).contains(&self.exit_close_grace_ms) {
            bail!(
                "--exit-close-grace-ms must be between {MIN_EXIT_CLOSE_GRACE_MS} and {MAX_GRACE_MS}, got {}",
                self.exit_close_grace_ms
            );
        }

        Ok(())
    }

    /// Full engine invocation: `<engine> [engine-args...] <party> <program>`.
    pub fn engine_command(&self) -> EngineCommand {
        EngineCommand::for_party(
            &self.engine_cmd,
            &self.engine_args,
            self.party,
            &self.program.to_string_lossy(),
        )
    }

    /// Directory searched for the `player_<N>` driver.
    pub fn driver_dir(&self) -> &Path {
        self.driver_dir.as_deref().unwrap_or(self.program.as_path())
    }

    /// Interpreter argv for the driver file, if one was configured.
    pub fn driver_command(&self) -> Result<Option<Vec<String>>> {
        self.driver_cmd
            .as_deref()
            .map(split_command)
            .transpose()
            .map_err(|err| anyhow!("--driver-cmd is invalid: {err}"))
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Option<Duration> {
        self.shutdown_grace_ms.map(Duration::from_millis)
    }

    pub fn exit_close_grace(&self) -> Duration {
        Duration::from_millis(self.exit_close_grace_ms)
    }

    /// True when any file logging should happen for this run.
    pub fn logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }
}

/// Split a command line using shell quoting rules; the result is never empty.
pub fn split_command(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("command is empty");
    }
    let parts = shell_words::split(trimmed).map_err(|err| anyhow!("{err}"))?;
    if parts.is_empty() {
        bail!("command is empty");
    }
    Ok(parts)
}
