//! Background readers for the engine's output pipes.
//!
//! The output drainer turns tagged stdout lines into protocol values on the
//! handoff queue; the stderr logger keeps the engine's diagnostic pipe from
//! filling up by copying it into the debug log.


use crate::handoff::{CloseReason, HandoffQueue, ProtocolValue};
use crate::{log_debug, log_debug_content};
use anyhow::anyhow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::{
    io::{self, BufRead},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Classification of one engine stdout line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Tagged line whose second field parsed as an integer.
    Value(ProtocolValue),
    /// Tagged line whose second field is missing or not a base-10 `i64`.
    Malformed,
    /// Line without the marker.
    Untagged,
}

/// Tagged lines carry their payload in the second whitespace-delimited field,
/// wherever the marker itself appears.
pub fn classify_line(line: &str, marker: &str) -> LineKind {
    if !line.contains(marker) {
        return LineKind::Untagged;
    }
    match line.split_whitespace().nth(1).map(str::parse::<ProtocolValue>) {
        Some(Ok(value)) => LineKind::Value(value),
        _ => LineKind::Malformed,
    }
}

/// Counters reported when a drainer finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub lines: u64,
    pub values: u64,
    pub malformed: u64,
    pub untagged: u64,
    /// Values parsed after the queue had already been closed.
    pub dropped: u64,
}

/// Reads an engine's stdout until end-of-stream, feeding the handoff queue.
pub struct OutputDrainer<R> {
    reader: R,
    marker: String,
    queue: Arc<HandoffQueue>,
    stop: Arc<AtomicBool>,
}

impl<R: BufRead> OutputDrainer<R> {
    pub fn new(reader: R, marker: impl Into<String>, queue: Arc<HandoffQueue>) -> Self {
        Self {
            reader,
            marker: marker.into(),
            queue,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Drain until end-of-stream (or a shutdown request), then close the queue.
    pub fn run(mut self) -> DrainStats {
        let mut stats = DrainStats::default();
        let mut buf = Vec::with_capacity(256);
        let reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break CloseReason::Cancelled;
            }
            buf.clear();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => break CloseReason::OutputClosed,
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log_debug(&format!("Engine stdout read failed: {err}"));
                    break CloseReason::OutputClosed;
                }
            }
            stats.lines += 1;
            // Engine output is not guaranteed to be UTF-8.
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\n', '\r']);
            match classify_line(line, &self.marker) {
                LineKind::Value(value) => {
                    if self.queue.push(value) {
                        stats.values += 1;
                        log_debug_content(&format!("Engine value queued: {value}"));
                    } else {
                        stats.dropped += 1;
                        log_debug_content(&format!("Engine value dropped after close: {value}"));
                    }
                }
                LineKind::Malformed => {
                    stats.malformed += 1;
                    log_debug("Skipping tagged engine line with a non-integer payload");
                    log_debug_content(&format!("Malformed engine line: {line}"));
                }
                LineKind::Untagged => stats.untagged += 1,
            }
        };

        if self.queue.close(reason) {
            log_debug(&format!("Handoff queue closed: {reason}"));
        }
        log_debug(&format!(
            "Output drainer finished: lines={} values={} malformed={} untagged={} dropped={}",
            stats.lines, stats.values, stats.malformed, stats.untagged, stats.dropped
        ));
        stats
    }
}

/// Handle to a drainer running on its own thread.
pub struct DrainerHandle {
    handle: Option<JoinHandle<DrainStats>>,
    done_rx: Receiver<()>,
    stop: Arc<AtomicBool>,
    queue: Arc<HandoffQueue>,
}

impl DrainerHandle {
    /// Signal the drainer to stop and release any receiver blocked on the queue.
    ///
    /// A read already in progress still has to return (a line or end-of-stream)
    /// before the thread notices; terminating the engine guarantees that.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.queue.close(CloseReason::Cancelled) {
            log_debug("Output drainer shutdown requested; handoff queue cancelled");
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.done_rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }

    /// Wait up to `timeout` for the drainer to finish; true if it did.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Stop tracking a drainer stuck on a read nobody will satisfy. Its thread
    /// ends with the process; the stats it would have returned are lost.
    pub fn detach(mut self) {
        if self.handle.take().is_some() {
            log_debug("Output drainer detached while still reading");
        }
    }

    /// Block until the drainer reaches its terminal state.
    pub fn join(mut self) -> anyhow::Result<DrainStats> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("output drainer already joined"))?;
        handle
            .join()
            .map_err(|_| anyhow!("output drainer thread panicked"))
    }
}

/// Start an [`OutputDrainer`] on a dedicated thread.
pub fn spawn_output_drainer<R>(
    reader: R,
    marker: impl Into<String>,
    queue: Arc<HandoffQueue>,
) -> DrainerHandle
where
    R: BufRead + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    // The sender is never used; dropping it when the thread ends is the "done" signal.
    let (done_tx, done_rx): (Sender<()>, Receiver<()>) = bounded(0);
    let drainer = OutputDrainer::new(reader, marker, Arc::clone(&queue))
        .with_stop_flag(Arc::clone(&stop));
    let handle = thread::spawn(move || {
        let _done = done_tx;
        drainer.run()
    });
    DrainerHandle {
        handle: Some(handle),
        done_rx,
        stop,
        queue,
    }
}

/// Copy the engine's stderr into the debug log; returns the number of lines seen.
pub fn spawn_stderr_logger<R>(reader: R) -> JoinHandle<u64>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut lines = 0u64;
        for line in reader.split(b'\n').map_while(|line| line.ok()) {
            lines += 1;
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim_end();
            if !trimmed.is_empty() {
                log_debug_content(&format!("[engine stderr] {trimmed}"));
            }
        }
        log_debug(&format!("Engine stderr closed after {lines} lines"));
        lines
    })
}
