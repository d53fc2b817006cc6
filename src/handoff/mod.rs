//! FIFO handing protocol values from the output drainer to the driver.
//!
//! One producer (the drainer) pushes without ever blocking; one consumer (the
//! driver, through the bridge) pops and waits while the queue is empty. The
//! queue can be closed with a [`CloseReason`]: values pushed before the close
//! are still delivered, after which every pop reports the reason instead of
//! blocking forever.


use crate::engine::EngineExit;
use crate::lock::{lock_or_recover, wait_or_recover, wait_timeout_or_recover};
use std::{
    collections::VecDeque,
    fmt,
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};
use thiserror::Error;

/// Integer carried by a tagged engine output line.
pub type ProtocolValue = i64;

/// Why no further values will arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The engine's stdout reached end-of-stream.
    OutputClosed,
    /// The engine exited and its output did not close in time.
    EngineExited(EngineExit),
    /// The session shut the drainer down.
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::OutputClosed => write!(f, "engine output closed"),
            CloseReason::EngineExited(exit) => write!(f, "engine exited with {exit}"),
            CloseReason::Cancelled => write!(f, "session cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReceiveError {
    #[error("no more engine values: {0}")]
    Closed(CloseReason),

    #[error("timed out after {0:?} waiting for an engine value")]
    TimedOut(Duration),
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<ProtocolValue>,
    closed: Option<CloseReason>,
}

impl QueueState {
    fn take(&mut self) -> Option<Result<ProtocolValue, ReceiveError>> {
        if let Some(value) = self.items.pop_front() {
            return Some(Ok(value));
        }
        self.closed.map(|reason| Err(ReceiveError::Closed(reason)))
    }
}

#[derive(Default)]
pub struct HandoffQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Never blocks; returns false if the queue was already
    /// closed and the value was dropped.
    pub fn push(&self, value: ProtocolValue) -> bool {
        let mut state = lock_or_recover(&self.state, "HandoffQueue::push");
        if state.closed.is_some() {
            return false;
        }
        state.items.push_back(value);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Remove the head, waiting while the queue is empty and still open.
    pub fn pop_blocking(&self) -> Result<ProtocolValue, ReceiveError> {
        let mut state = lock_or_recover(&self.state, "HandoffQueue::pop_blocking");
        loop {
            if let Some(result) = state.take() {
                return result;
            }
            state = wait_or_recover(&self.ready, state, "HandoffQueue::pop_blocking");
        }
    }

    /// Like [`pop_blocking`](Self::pop_blocking) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<ProtocolValue, ReceiveError> {
        let deadline = Instant::now() + timeout;
        let mut state = lock_or_recover(&self.state, "HandoffQueue::pop_timeout");
        loop {
            if let Some(result) = state.take() {
                return result;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReceiveError::TimedOut(timeout));
            }
            let (next, _) =
                wait_timeout_or_recover(&self.ready, state, remaining, "HandoffQueue::pop_timeout");
            state = next;
        }
    }

    /// Pop without waiting; `None` when nothing is queued right now.
    pub fn try_pop(&self) -> Option<ProtocolValue> {
        lock_or_recover(&self.state, "HandoffQueue::try_pop")
            .items
            .pop_front()
    }

    /// Close the queue and wake every waiter. The first close wins; returns
    /// whether this call was it.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut state = lock_or_recover(&self.state, "HandoffQueue::close");
        if state.closed.is_some() {
            return false;
        }
        state.closed = Some(reason);
        drop(state);
        self.ready.notify_all();
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        lock_or_recover(&self.state, "HandoffQueue::close_reason").closed
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.state, "HandoffQueue::len").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
