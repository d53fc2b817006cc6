//! Helpers shared by unit tests.

use crate::bridge::Operator;
use crate::engine::EngineCommand;
use std::{
    env, fs,
    io::{self, Cursor, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{SystemTime, UNIX_EPOCH},
};

/// Cloneable in-memory writer so a test can inspect what a component wrote.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Operator whose answers come from `input`; returns the buffer capturing prompts.
pub(crate) fn scripted_operator(input: &str) -> (Operator, SharedBuffer) {
    let output = SharedBuffer::default();
    let operator = Operator::new(
        Box::new(Cursor::new(input.as_bytes().to_vec())),
        Box::new(output.clone()),
    );
    (operator, output)
}

/// Fake engine: `sh -c <script> engine <party> <program>`.
pub(crate) fn sh_engine(script: &str) -> EngineCommand {
    EngineCommand::for_party(
        "sh",
        &["-c".to_string(), script.to_string(), "engine".to_string()],
        0,
        "demo",
    )
}

/// Fresh, empty directory under the system temp dir.
pub(crate) fn unique_temp_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = env::temp_dir().join(format!(
        "viaduct_player_{label}_{}_{nanos}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}
