//! Engine process plumbing: launching the secure-computation binary with piped
//! stdio, and a monitor thread that watches its exit status while the output
//! drainer runs.

mod monitor;
mod signal;

pub use monitor::{spawn_engine_monitor, EngineMonitor};

use crate::log_debug;
use std::{
    fmt, io,
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio},
};
use thiserror::Error;

/// Fully assembled engine argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `<engine> [extra...] <party> <program>`, the shape every engine build expects.
    pub fn for_party(engine: &str, extra_args: &[String], party: u32, program: &str) -> Self {
        let mut args = extra_args.to_vec();
        args.push(party.to_string());
        args.push(program.to_string());
        Self::new(engine, args)
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Raised when the engine cannot be started; always fatal.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("engine executable '{0}' not found")]
    NotFound(String),

    #[error("failed to spawn engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("engine '{command}' did not expose its {pipe} pipe")]
    MissingPipe {
        command: String,
        pipe: &'static str,
    },
}

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl EngineExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for EngineExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for EngineExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// A live engine process. The three pipes are handed out once each to the
/// components that own them; the child itself goes to the exit monitor.
pub struct EngineProcess {
    child: Child,
    command: String,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl EngineProcess {
    /// Spawn the engine with stdin, stdout and stderr all piped, leading a new
    /// process group whose id is its pid.
    pub fn launch(command: &EngineCommand) -> Result<Self, LaunchError> {
        let display = command.to_string();
        let mut builder = Command::new(&command.program);
        builder
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so termination also reaches whatever the engine spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            builder.process_group(0);
        }
        let mut child = builder
            .spawn()
            .map_err(|source| {
                if source.kind() == io::ErrorKind::NotFound {
                    LaunchError::NotFound(command.program.clone())
                } else {
                    LaunchError::Spawn {
                        command: display.clone(),
                        source,
                    }
                }
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let missing = match (&stdin, &stdout, &stderr) {
            (None, _, _) => Some("stdin"),
            (_, None, _) => Some("stdout"),
            (_, _, None) => Some("stderr"),
            _ => None,
        };
        if let Some(pipe) = missing {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LaunchError::MissingPipe {
                command: display,
                pipe,
            });
        }

        log_debug(&format!("Engine launched (pid {}): {display}", child.id()));
        Ok(Self {
            child,
            command: display,
            stdin,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Give up ownership of the child, typically to the exit monitor.
    pub fn into_child(self) -> Child {
        self.child
    }
}
