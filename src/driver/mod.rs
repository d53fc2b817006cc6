//! Per-party driver logic and how it is located.
//!
//! A [`Driver`] receives the bridge primitives as an explicit argument and runs
//! to completion on the caller's thread. Drivers on disk (`player_<N>` files)
//! run as child processes through [`ScriptDriver`].

pub mod protocol;
mod script;

pub use script::ScriptDriver;

use crate::bridge::{BridgeError, DriverBridge};
use crate::log_debug;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Entry point every driver implements.
pub trait Driver {
    /// Short human-readable name used in logs and errors.
    fn describe(&self) -> String;

    fn run(&mut self, bridge: &mut dyn DriverBridge) -> anyhow::Result<()>;
}

impl<F> Driver for F
where
    F: FnMut(&mut dyn DriverBridge) -> anyhow::Result<()>,
{
    fn describe(&self) -> String {
        "inline driver".to_string()
    }

    fn run(&mut self, bridge: &mut dyn DriverBridge) -> anyhow::Result<()> {
        self(bridge)
    }
}

/// Pin a closure's signature so it can be used as a [`Driver`].
pub fn driver_fn<F>(f: F) -> F
where
    F: FnMut(&mut dyn DriverBridge) -> anyhow::Result<()>,
{
    f
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no driver named {stem} in '{}'", dir.display())]
    NotFound { stem: String, dir: PathBuf },

    #[error("driver command is invalid: {0}")]
    InvalidCommand(String),

    #[error("failed to start driver '{}': {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("driver protocol error: {0}")]
    Protocol(String),

    #[error("driver '{}' exited with {status}", path.display())]
    Exited { path: PathBuf, status: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("driver I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// File stem of the driver for `party`.
pub fn driver_stem(party: u32) -> String {
    format!("player_{party}")
}

/// Finds `player_<N>` drivers in one directory and prepares them to run.
#[derive(Debug, Clone)]
pub struct DriverLoader {
    dir: PathBuf,
    command: Option<Vec<String>>,
}

impl DriverLoader {
    /// `command` is the interpreter argv the driver path is appended to; `None`
    /// executes the driver file directly.
    pub fn new(dir: impl Into<PathBuf>, command: Option<Vec<String>>) -> Result<Self, DriverError> {
        if let Some(command) = &command {
            if command.first().map_or(true, |program| program.is_empty()) {
                return Err(DriverError::InvalidCommand(
                    "interpreter command is empty".to_string(),
                ));
            }
        }
        Ok(Self {
            dir: dir.into(),
            command,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/player_<N>` if it exists, else the first regular file (by name)
    /// whose stem is `player_<N>`, e.g. `player_0.py`.
    pub fn locate(&self, party: u32) -> Result<PathBuf, DriverError> {
        let stem = driver_stem(party);
        let exact = self.dir.join(&stem);
        if exact.is_file() {
            return Ok(exact);
        }

        let not_found = || DriverError::NotFound {
            stem: stem.clone(),
            dir: self.dir.clone(),
        };
        let entries = fs::read_dir(&self.dir).map_err(|_| not_found())?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()))
            .collect();
        candidates.sort();
        candidates.into_iter().next().ok_or_else(not_found)
    }

    /// Locate the driver for `party` and bind it to the session's identity.
    pub fn load(&self, party: u32, program: &str) -> Result<ScriptDriver, DriverError> {
        let path = self.locate(party)?;
        log_debug(&format!("Driver for party {party}: {}", path.display()));
        Ok(ScriptDriver::new(
            path,
            self.command.clone(),
            party,
            program.to_string(),
        ))
    }
}
