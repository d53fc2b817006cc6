//! Lifecycle coordination for one party's session.
//!
//! The sequence is fixed: launch the engine, start the output drainer, run the
//! driver on the caller's thread, then wait for the drainer before reporting.
//! A [`Session`] is the explicit context that owns the engine handle, the
//! handoff queue and the bridge the driver is given.

#[cfg(test)]
mod tests;

use crate::bridge::{BridgeStats, Operator, SessionBridge};
use crate::config::{AppConfig, DEFAULT_EXIT_CLOSE_GRACE_MS, DEFAULT_OUTPUT_MARKER};
use crate::drain::{spawn_output_drainer, spawn_stderr_logger, DrainStats, DrainerHandle};
use crate::driver::Driver;
use crate::engine::{
    spawn_engine_monitor, EngineCommand, EngineExit, EngineMonitor, EngineProcess, LaunchError,
};
use crate::handoff::HandoffQueue;
use crate::log_debug;
use anyhow::Context;
use std::{
    fmt,
    io::BufReader,
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// How long a drainer gets to finish once the engine's process group has been
/// told to terminate (covers the SIGKILL escalation).
const DRAINER_STOP_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    EngineRunning,
    DrainerRunning,
    DriverExecuting,
    DriverDone,
    AwaitingDrainerJoin,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::EngineRunning => "engine_running",
            Self::DrainerRunning => "drainer_running",
            Self::DriverExecuting => "driver_executing",
            Self::DriverDone => "driver_done",
            Self::AwaitingDrainerJoin => "awaiting_drainer_join",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub marker: String,
    /// `None` lets `receive_from_engine` block indefinitely.
    pub receive_timeout: Option<Duration>,
    /// `None` waits for the engine's output to close however long it takes.
    pub shutdown_grace: Option<Duration>,
    pub exit_close_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_OUTPUT_MARKER.to_string(),
            receive_timeout: None,
            shutdown_grace: None,
            exit_close_grace: Duration::from_millis(DEFAULT_EXIT_CLOSE_GRACE_MS),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            marker: config.marker.clone(),
            receive_timeout: config.receive_timeout(),
            shutdown_grace: config.shutdown_grace(),
            exit_close_grace: config.exit_close_grace(),
        }
    }
}

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub drain: DrainStats,
    pub bridge: BridgeStats,
    /// `None` if the engine could not be reaped.
    pub engine_exit: Option<EngineExit>,
    /// The output stream was still held open after termination, so the drainer
    /// was abandoned and `drain` is empty.
    pub drainer_detached: bool,
    pub history: Vec<SessionState>,
}

pub struct Session {
    state: SessionState,
    history: Vec<SessionState>,
    started_at: Instant,
    bridge: SessionBridge,
    drainer: DrainerHandle,
    stderr_logger: JoinHandle<u64>,
    monitor: EngineMonitor,
    shutdown_grace: Option<Duration>,
}

impl Session {
    /// Launch the engine and start draining its output.
    ///
    /// Fails before any thread is started if the engine cannot be spawned.
    pub fn launch(
        command: &EngineCommand,
        operator: Operator,
        options: SessionOptions,
    ) -> Result<Self, LaunchError> {
        let started_at = Instant::now();
        let mut process = EngineProcess::launch(command)?;
        let missing = |pipe| LaunchError::MissingPipe {
            command: command.to_string(),
            pipe,
        };
        let stdin = process.take_stdin().ok_or_else(|| missing("stdin"))?;
        let stdout = process.take_stdout().ok_or_else(|| missing("stdout"))?;
        let stderr = process.take_stderr().ok_or_else(|| missing("stderr"))?;
        let pid = process.pid();
        tracing::info!(pid, command = %command, "engine launched");

        let queue = Arc::new(HandoffQueue::new());
        let drainer = spawn_output_drainer(BufReader::new(stdout), options.marker, Arc::clone(&queue));
        let stderr_logger = spawn_stderr_logger(BufReader::new(stderr));
        let monitor = spawn_engine_monitor(
            process.into_child(),
            Arc::clone(&queue),
            options.exit_close_grace,
        );
        let bridge = SessionBridge::new(Box::new(stdin), queue, operator)
            .with_receive_timeout(options.receive_timeout);

        let mut session = Self {
            state: SessionState::NotStarted,
            history: vec![SessionState::NotStarted],
            started_at,
            bridge,
            drainer,
            stderr_logger,
            monitor,
            shutdown_grace: options.shutdown_grace,
        };
        session.transition(SessionState::EngineRunning);
        session.transition(SessionState::DrainerRunning);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn engine_pid(&self) -> u32 {
        self.monitor.pid()
    }

    fn transition(&mut self, next: SessionState) {
        log_debug(&format!("Session state: {} -> {next}", self.state));
        tracing::info!(from = %self.state, to = %next, "session state");
        self.state = next;
        self.history.push(next);
    }

    /// Run `driver` to completion on this thread with the session's bridge.
    pub fn run_driver(&mut self, driver: &mut dyn Driver) -> anyhow::Result<()> {
        self.transition(SessionState::DriverExecuting);
        let name = driver.describe();
        let result = driver
            .run(&mut self.bridge)
            .with_context(|| format!("driver {name} failed"));
        if let Err(err) = &result {
            log_debug(&format!("Driver failed: {err:#}"));
            tracing::warn!(driver = %name, error = %format!("{err:#}"), "driver failed");
        }
        self.transition(SessionState::DriverDone);
        result
    }

    /// Close the engine's stdin, wait for the drainer, reap the engine.
    pub fn finish(mut self) -> anyhow::Result<SessionReport> {
        self.bridge.close_engine_input();
        self.transition(SessionState::AwaitingDrainerJoin);

        let mut drainer_stuck = false;
        if let Some(grace) = self.shutdown_grace {
            if !self.drainer.wait_timeout(grace) {
                log_debug(&format!(
                    "Engine output still open {}ms after the driver finished; terminating engine",
                    grace.as_millis()
                ));
                self.monitor.terminate();
                self.drainer.shutdown();
                drainer_stuck = !self.drainer.wait_timeout(DRAINER_STOP_WAIT);
            }
        }

        let Self {
            mut state,
            mut history,
            started_at,
            bridge,
            drainer,
            stderr_logger,
            monitor,
            ..
        } = self;

        let drain = if drainer_stuck {
            log_debug("Engine output still held open by another process; not waiting for it");
            tracing::warn!("output drainer detached after shutdown grace");
            drainer.detach();
            DrainStats::default()
        } else {
            drainer.join().context("output drainer did not finish cleanly")?
        };
        let engine_exit = monitor.stop();
        // Whoever holds stdout open probably holds stderr too.
        if (!drainer_stuck || stderr_logger.is_finished()) && stderr_logger.join().is_err() {
            log_debug("Engine stderr logger panicked");
        }

        log_debug(&format!("Session state: {state} -> {}", SessionState::Terminated));
        tracing::info!(from = %state, to = %SessionState::Terminated, "session state");
        state = SessionState::Terminated;
        history.push(state);

        let report = SessionReport {
            drain,
            bridge: bridge.stats(),
            engine_exit,
            drainer_detached: drainer_stuck,
            history,
        };
        let exit = report
            .engine_exit
            .map_or_else(|| "unknown".to_string(), |exit| exit.to_string());
        log_debug(&format!(
            "Session finished in {}ms: values={} received={} sent={} engine={exit}",
            started_at.elapsed().as_millis(),
            report.drain.values,
            report.bridge.received,
            report.bridge.sent
        ));
        tracing::info!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            values = report.drain.values,
            malformed = report.drain.malformed,
            received = report.bridge.received,
            sent = report.bridge.sent,
            engine_exit = %exit,
            "session finished"
        );
        Ok(report)
    }
}

/// Run one complete session: launch, drive, then always wait for the drainer.
///
/// A driver failure is returned after shutdown completes. Launch failures are
/// returned as [`LaunchError`] inside the `anyhow::Error` and the driver never runs.
pub fn run_session(
    command: &EngineCommand,
    operator: Operator,
    options: SessionOptions,
    driver: &mut dyn Driver,
) -> anyhow::Result<SessionReport> {
    let mut session = Session::launch(command, operator, options)?;
    let outcome = session.run_driver(driver);
    let report = session.finish();
    match outcome {
        Ok(()) => report,
        Err(err) => {
            if let Err(finish_err) = report {
                log_debug(&format!("Session shutdown also failed: {finish_err:#}"));
            }
            Err(err)
        }
    }
}
