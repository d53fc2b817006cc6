use crate::log_debug;
#[cfg(unix)]
use std::io;
use std::time::{Duration, Instant};

/// Time between SIGTERM and the SIGKILL that follows if the engine ignores it.
pub(super) const TERM_ESCALATION: Duration = Duration::from_millis(500);

pub(super) fn should_send_sigkill(
    sigkill_sent: bool,
    term_requested_at: Option<Instant>,
    now: Instant,
) -> bool {
    if sigkill_sent {
        return false;
    }
    match term_requested_at {
        Some(start) => now.duration_since(start) >= TERM_ESCALATION,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Signal {
    Term,
    Kill,
}

/// Deliver `signal` to the process group led by `pid`; returns false (and
/// logs) when delivery failed.
pub(super) fn send_signal(pid: u32, signal: Signal) -> bool {
    #[cfg(unix)]
    {
        let signo = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        // pid 0 would address our own group.
        let Some(raw_pid) = i32::try_from(pid).ok().filter(|raw| *raw > 0) else {
            log_debug(&format!("Engine pid {pid} out of range for kill()"));
            return false;
        };
        // SAFETY: kill() only reads its integer arguments.
        if unsafe { libc::kill(-raw_pid, signo) } != 0 {
            log_debug(&format!(
                "Engine: failed to send signal {signo} to process group {pid}: {}",
                io::Error::last_os_error()
            ));
            return false;
        }
        true
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
        log_debug("Engine: signals unsupported on this platform");
        false
    }
}
