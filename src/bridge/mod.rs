//! The four primitives driver logic uses to talk to the engine and the operator.

#[cfg(test)]
mod tests;

use crate::handoff::{CloseReason, HandoffQueue, ProtocolValue, ReceiveError};
use crate::{log_debug, log_debug_content};
use std::{
    fmt,
    io::{self, BufRead, Write},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("operator input closed while reading '{0}'")]
    InputClosed(String),

    #[error("operator terminal I/O failed: {0}")]
    Operator(#[source] io::Error),

    #[error("failed to write to engine input: {0}")]
    EngineInput(#[source] io::Error),

    #[error("engine input is already closed")]
    EngineInputClosed,

    #[error("engine terminated before producing a value ({0})")]
    EngineTerminated(CloseReason),

    #[error("timed out after {0:?} waiting for an engine value")]
    ReceiveTimeout(Duration),
}

impl From<ReceiveError> for BridgeError {
    fn from(err: ReceiveError) -> Self {
        match err {
            ReceiveError::Closed(reason) => BridgeError::EngineTerminated(reason),
            ReceiveError::TimedOut(after) => BridgeError::ReceiveTimeout(after),
        }
    }
}

/// Capabilities handed to driver logic. Every call is synchronous on the
/// driver's thread.
pub trait DriverBridge {
    /// Prompt the operator and return the raw line they typed (newline stripped).
    fn request_user_input(&mut self, label: &str) -> Result<String, BridgeError>;

    /// Write `value` and a newline to the engine's stdin.
    fn send_to_engine(&mut self, value: &dyn fmt::Display) -> Result<(), BridgeError>;

    /// Next value the engine emitted, waiting until the drainer produces one.
    fn receive_from_engine(&mut self) -> Result<ProtocolValue, BridgeError>;

    /// Show `value` to the operator.
    fn emit_user_output(&mut self, value: &dyn fmt::Display) -> Result<(), BridgeError>;
}

/// The human side of the session: prompts are written to `output`, answers
/// read from `input`.
pub struct Operator {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Operator {
    pub fn new(input: Box<dyn BufRead>, output: Box<dyn Write>) -> Self {
        Self { input, output }
    }

    /// The controlling terminal via the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdin().lock()), Box::new(io::stdout()))
    }

    fn prompt(&mut self, label: &str) -> Result<String, BridgeError> {
        write!(self.output, "input {label} : ").map_err(BridgeError::Operator)?;
        self.output.flush().map_err(BridgeError::Operator)?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(BridgeError::Operator)?;
        if read == 0 {
            return Err(BridgeError::InputClosed(label.to_string()));
        }
        let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed_len);
        Ok(line)
    }

    fn show(&mut self, value: &dyn fmt::Display) -> Result<(), BridgeError> {
        writeln!(self.output, "output: {value}").map_err(BridgeError::Operator)?;
        self.output.flush().map_err(BridgeError::Operator)
    }
}

/// Call counters reported at the end of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub inputs: u64,
    pub sent: u64,
    pub received: u64,
    pub outputs: u64,
}

/// Bridge backed by a live engine: its stdin pipe, the handoff queue fed by
/// the drainer, and the operator terminal.
pub struct SessionBridge {
    engine_input: Option<Box<dyn Write>>,
    queue: Arc<HandoffQueue>,
    operator: Operator,
    receive_timeout: Option<Duration>,
    stats: BridgeStats,
}

impl SessionBridge {
    pub fn new(
        engine_input: Box<dyn Write>,
        queue: Arc<HandoffQueue>,
        operator: Operator,
    ) -> Self {
        Self {
            engine_input: Some(engine_input),
            queue,
            operator,
            receive_timeout: None,
            stats: BridgeStats::default(),
        }
    }

    /// Bound every `receive_from_engine` call; `None` waits indefinitely.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Drop the engine's stdin so it sees end-of-input. Idempotent.
    pub fn close_engine_input(&mut self) {
        if let Some(mut input) = self.engine_input.take() {
            let _ = input.flush();
            log_debug("Engine stdin closed");
        }
    }
}

impl DriverBridge for SessionBridge {
    fn request_user_input(&mut self, label: &str) -> Result<String, BridgeError> {
        let answer = self.operator.prompt(label)?;
        self.stats.inputs += 1;
        log_debug_content(&format!("Operator input for '{label}': {answer}"));
        Ok(answer)
    }

    fn send_to_engine(&mut self, value: &dyn fmt::Display) -> Result<(), BridgeError> {
        let input = self
            .engine_input
            .as_mut()
            .ok_or(BridgeError::EngineInputClosed)?;
        // Value and newline go out in a single write.
        let line = format!("{value}\n");
        input
            .write_all(line.as_bytes())
            .map_err(BridgeError::EngineInput)?;
        input.flush().map_err(BridgeError::EngineInput)?;
        self.stats.sent += 1;
        log_debug_content(&format!("Sent to engine: {value}"));
        Ok(())
    }

    fn receive_from_engine(&mut self) -> Result<ProtocolValue, BridgeError> {
        let value = match self.receive_timeout {
            Some(timeout) => self.queue.pop_timeout(timeout),
            None => self.queue.pop_blocking(),
        }?;
        self.stats.received += 1;
        log_debug_content(&format!("Received from engine: {value}"));
        Ok(value)
    }

    fn emit_user_output(&mut self, value: &dyn fmt::Display) -> Result<(), BridgeError> {
        self.operator.show(value)?;
        self.stats.outputs += 1;
        Ok(())
    }
}
