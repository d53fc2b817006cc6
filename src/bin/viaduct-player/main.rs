//! Viaduct player entrypoint: one party of a secure multiparty computation.
//!
//! Launches the engine as `<engine> <party> <program>`, drains its tagged
//! output on a background thread, and runs the party's `player_<N>` driver on
//! the main thread with prompts and results on this terminal.

use anyhow::{Context, Result};
use std::panic;
use viaduct_player::bridge::Operator;
use viaduct_player::config::AppConfig;
use viaduct_player::driver::{Driver, DriverLoader};
use viaduct_player::telemetry::init_tracing;
use viaduct_player::{init_logging, log_debug, log_debug_content, log_file_path, log_panic};
use viaduct_player::{run_session, SessionOptions};

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        log_debug(&format!("panic at {location}"));
        log_debug_content(&format!("panic: {info}"));
        previous(info);
    }));
}

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== Viaduct Player Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    // Resolve the driver first so a missing one fails before the engine starts.
    let loader = DriverLoader::new(config.driver_dir(), config.driver_command()?)?;
    let program = config.program.to_string_lossy();
    let mut driver = loader
        .load(config.party, &program)
        .with_context(|| format!("cannot load driver for party {}", config.party))?;
    log_debug(&format!("Driver: {}", driver.describe()));

    let command = config.engine_command();
    let report = run_session(
        &command,
        Operator::stdio(),
        SessionOptions::from_config(&config),
        &mut driver,
    )?;

    log_debug(&format!(
        "=== Viaduct Player Finished: drained {} values ({} malformed), engine {} ===",
        report.drain.values,
        report.drain.malformed,
        report
            .engine_exit
            .map_or_else(|| "not reaped".to_string(), |exit| exit.to_string())
    ));
    Ok(())
}
