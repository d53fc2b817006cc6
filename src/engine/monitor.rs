use super::signal::{send_signal, should_send_sigkill, Signal};
use super::EngineExit;
use crate::handoff::{CloseReason, HandoffQueue};
use crate::log_debug;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::{
    process::Child,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum MonitorCommand {
    Terminate,
}

/// Handle to the thread watching the engine's exit status.
///
/// Dropping the command channel (via [`EngineMonitor::stop`]) terminates an
/// engine that is still running, so the monitor thread always ends.
pub struct EngineMonitor {
    pid: u32,
    commands: Option<Sender<MonitorCommand>>,
    handle: Option<JoinHandle<Option<EngineExit>>>,
}

impl EngineMonitor {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the monitor to SIGTERM the engine, escalating to SIGKILL if needed.
    pub fn terminate(&self) {
        if let Some(commands) = &self.commands {
            let _ = commands.try_send(MonitorCommand::Terminate);
        }
    }

    /// True once the engine has been reaped.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop monitoring, terminating the engine if it is still alive, and report its exit.
    pub fn stop(mut self) -> Option<EngineExit> {
        self.commands.take();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(exit) => exit,
            Err(_) => {
                log_debug("Engine monitor thread panicked");
                None
            }
        }
    }
}

impl Drop for EngineMonitor {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Watch `child` on a background thread.
///
/// When the engine exits on its own, the drainer gets `close_grace` to reach
/// end-of-stream; if the output is still open after that (a descendant kept the
/// pipe), the monitor closes `queue` so a blocked receiver is released.
pub fn spawn_engine_monitor(
    child: Child,
    queue: Arc<HandoffQueue>,
    close_grace: Duration,
) -> EngineMonitor {
    let pid = child.id();
    let (tx, rx) = bounded(1);
    let handle = thread::spawn(move || {
        let mut child = child;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let exit = EngineExit::from(status);
                    log_debug(&format!("Engine (pid {pid}) exited: {exit}"));
                    let _ = rx.recv_timeout(close_grace);
                    if queue.close(CloseReason::EngineExited(exit)) {
                        log_debug("Engine output still open after exit; closed handoff queue");
                    }
                    return Some(exit);
                }
                Ok(None) => {}
                Err(err) => {
                    log_debug(&format!("Engine (pid {pid}) wait failed: {err}"));
                    return None;
                }
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(MonitorCommand::Terminate) | Err(RecvTimeoutError::Disconnected) => {
                    let exit = terminate_child(&mut child, pid);
                    if let Some(exit) = exit {
                        queue.close(CloseReason::EngineExited(exit));
                    }
                    return exit;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    });

    EngineMonitor {
        pid,
        commands: Some(tx),
        handle: Some(handle),
    }
}

fn terminate_child(child: &mut Child, pid: u32) -> Option<EngineExit> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status.into());
    }

    log_debug(&format!("Engine (pid {pid}) still running; sending SIGTERM"));
    send_signal(pid, Signal::Term);
    let term_requested_at = Some(Instant::now());
    let mut sigkill_sent = false;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let exit = EngineExit::from(status);
                log_debug(&format!("Engine (pid {pid}) terminated: {exit}"));
                return Some(exit);
            }
            Ok(None) => {}
            Err(err) => {
                log_debug(&format!("Engine (pid {pid}) wait failed: {err}"));
                return None;
            }
        }
        if should_send_sigkill(sigkill_sent, term_requested_at, Instant::now()) {
            log_debug(&format!("Engine (pid {pid}) ignored SIGTERM; escalating to SIGKILL"));
            if !send_signal(pid, Signal::Kill) {
                if let Err(err) = child.kill() {
                    log_debug(&format!("Engine (pid {pid}) kill failed: {err}"));
                }
            }
            sigkill_sent = true;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
