//! Viaduct player: runs one party of a secure multiparty computation by
//! bridging the engine process and that party's driver logic.

mod app;
pub mod bridge;
pub mod config;
pub mod drain;
pub mod driver;
pub mod engine;
pub mod handoff;
mod lock;
pub mod session;
pub mod telemetry;
#[cfg(test)]
mod test_support;

pub use app::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use session::{run_session, Session, SessionOptions, SessionReport, SessionState};
