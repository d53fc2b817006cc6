use super::protocol::{scalar_text, DriverReply, DriverRequest};
use super::{Driver, DriverError};
use crate::bridge::DriverBridge;
use crate::{log_debug, log_debug_content};
use std::{
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

/// A `player_<N>` file run as a child process that calls the bridge over
/// newline-delimited JSON (see [`super::protocol`]).
#[derive(Debug, Clone)]
pub struct ScriptDriver {
    path: PathBuf,
    command: Option<Vec<String>>,
    party: u32,
    program: String,
}

impl ScriptDriver {
    pub fn new(path: PathBuf, command: Option<Vec<String>>, party: u32, program: String) -> Self {
        Self {
            path,
            command,
            party,
            program,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn spawn(&self) -> Result<Child, DriverError> {
        let mut command = match self.command.as_deref() {
            Some([interpreter, args @ ..]) => {
                let mut command = Command::new(interpreter);
                command.args(args).arg(&self.path);
                command
            }
            _ => Command::new(&self.path),
        };
        command
            .arg(self.party.to_string())
            .arg(&self.program)
            .env("VIADUCT_PARTY", self.party.to_string())
            .env("VIADUCT_PROGRAM", &self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DriverError::Spawn {
                path: self.path.clone(),
                source,
            })
    }

    /// Answer requests until the driver closes its stdout.
    fn serve(&self, child: &mut Child, bridge: &mut dyn DriverBridge) -> Result<(), DriverError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Protocol("driver stdout unavailable".to_string()))?;
        let mut stdin = child.stdin.take();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let request: DriverRequest = serde_json::from_str(trimmed).map_err(|err| {
                DriverError::Protocol(format!("invalid request from driver: {err}"))
            })?;
            let Some(input) = stdin.as_mut() else {
                return Err(DriverError::Protocol(
                    "driver sent a request after closing its input".to_string(),
                ));
            };

            let reply = match handle_request(request, bridge) {
                Ok(reply) => reply,
                Err(err) => {
                    let _ = write_reply(
                        input,
                        &DriverReply::Error {
                            message: err.to_string(),
                        },
                    );
                    return Err(err);
                }
            };
            match write_reply(input, &reply) {
                Ok(()) => {}
                Err(DriverError::Io(err)) if err.kind() == io::ErrorKind::BrokenPipe => {
                    log_debug("Driver closed its input; no further replies possible");
                    stdin = None;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn handle_request(
    request: DriverRequest,
    bridge: &mut dyn DriverBridge,
) -> Result<DriverReply, DriverError> {
    match request {
        DriverRequest::UserInput { label } => {
            let value = bridge.request_user_input(&label)?;
            Ok(DriverReply::Input { value })
        }
        DriverRequest::SendToEngine { value } => {
            let text = scalar_text(&value).ok_or_else(|| {
                DriverError::Protocol(format!("send_to_engine needs a scalar value, got {value}"))
            })?;
            bridge.send_to_engine(&text)?;
            Ok(DriverReply::Ack)
        }
        DriverRequest::ReceiveFromEngine => {
            let value = bridge.receive_from_engine()?;
            Ok(DriverReply::Value { value })
        }
        DriverRequest::UserOutput { value } => {
            let text = scalar_text(&value).ok_or_else(|| {
                DriverError::Protocol(format!("user_output needs a scalar value, got {value}"))
            })?;
            bridge.emit_user_output(&text)?;
            Ok(DriverReply::Ack)
        }
    }
}

fn write_reply(stdin: &mut ChildStdin, reply: &DriverReply) -> Result<(), DriverError> {
    let json = serde_json::to_string(reply)
        .map_err(|err| DriverError::Protocol(format!("failed to encode reply: {err}")))?;
    log_debug_content(&format!("Driver reply: {json}"));
    stdin.write_all(format!("{json}\n").as_bytes())?;
    stdin.flush()?;
    Ok(())
}

impl Driver for ScriptDriver {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn run(&mut self, bridge: &mut dyn DriverBridge) -> anyhow::Result<()> {
        let mut child = self.spawn()?;
        log_debug(&format!(
            "Driver started (pid {}): {}",
            child.id(),
            self.path.display()
        ));

        let served = self.serve(&mut child, bridge);
        if served.is_err() {
            let _ = child.kill();
        }
        let status = child.wait().map_err(DriverError::Io)?;
        served?;

        if !status.success() {
            return Err(DriverError::Exited {
                path: self.path.clone(),
                status: status.to_string(),
            }
            .into());
        }
        log_debug("Driver finished");
        Ok(())
    }
}
