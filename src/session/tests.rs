use super::{run_session, Session, SessionOptions, SessionState};
use crate::bridge::{BridgeError, DriverBridge};
use crate::driver::driver_fn;
use crate::engine::{EngineCommand, LaunchError};
use crate::test_support::{scripted_operator, sh_engine};
use std::time::{Duration, Instant};

fn full_history() -> Vec<SessionState> {
    vec![
        SessionState::NotStarted,
        SessionState::EngineRunning,
        SessionState::DrainerRunning,
        SessionState::DriverExecuting,
        SessionState::DriverDone,
        SessionState::AwaitingDrainerJoin,
        SessionState::Terminated,
    ]
}

#[test]
fn values_reach_driver_in_emitted_order() {
    let engine = sh_engine(
        "echo 'VIADUCT_OUTPUT 1'; echo 'progress 50%'; echo 'VIADUCT_OUTPUT abc'; echo 'VIADUCT_OUTPUT 2 extra'",
    );
    let (operator, terminal) = scripted_operator("");
    let mut seen = Vec::new();
    let mut driver = driver_fn(|bridge: &mut dyn DriverBridge| {
        seen.push(bridge.receive_from_engine()?);
        seen.push(bridge.receive_from_engine()?);
        bridge.emit_user_output(&(seen[0] + seen[1]))?;
        Ok(())
    });
    let report = run_session(&engine, operator, SessionOptions::default(), &mut driver).unwrap();

    assert_eq!(seen, vec![1, 2]);
    assert_eq!(terminal.contents(), "output: 3\n");
    assert_eq!(report.drain.values, 2);
    assert_eq!(report.drain.malformed, 1);
    assert_eq!(report.drain.untagged, 1);
    assert_eq!(report.bridge.received, 2);
    assert_eq!(report.history, full_history());
    assert!(report.engine_exit.is_some_and(|exit| exit.success()));
}

#[test]
fn engine_sees_values_sent_by_driver() {
    let engine = sh_engine("read a; read b; echo \"VIADUCT_OUTPUT $((a + b))\"");
    let (operator, terminal) = scripted_operator("3\n4\n");
    let mut driver = driver_fn(|bridge: &mut dyn DriverBridge| {
        let a = bridge.request_user_input("a")?;
        let b = bridge.request_user_input("b")?;
        bridge.send_to_engine(&a)?;
        bridge.send_to_engine(&b)?;
        let sum = bridge.receive_from_engine()?;
        bridge.emit_user_output(&sum)?;
        Ok(())
    });
    let report = run_session(&engine, operator, SessionOptions::default(), &mut driver).unwrap();

    assert_eq!(terminal.contents(), "input a : input b : output: 7\n");
    assert_eq!(report.bridge.sent, 2);
}

#[test]
fn engine_crash_releases_waiting_driver() {
    let engine = sh_engine("echo 'VIADUCT_OUTPUT 5'; exit 4");
    let (operator, _) = scripted_operator("");
    let mut received = Vec::new();
    let mut driver = driver_fn(|bridge: &mut dyn DriverBridge| {
        received.push(bridge.receive_from_engine()?);
        received.push(bridge.receive_from_engine()?);
        Ok(())
    });
    let err = run_session(&engine, operator, SessionOptions::default(), &mut driver).unwrap_err();

    assert_eq!(received, vec![5]);
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::EngineTerminated(_))
    ));
}

#[test]
fn missing_engine_fails_before_driver_runs() {
    let engine = EngineCommand::new("/nonexistent/viaduct-engine", vec!["0".to_string()]);
    let (operator, _) = scripted_operator("");
    let mut called = false;
    let mut driver = driver_fn(|_: &mut dyn DriverBridge| {
        called = true;
        Ok(())
    });
    let err = run_session(&engine, operator, SessionOptions::default(), &mut driver).unwrap_err();

    assert!(!called);
    assert!(matches!(
        err.downcast_ref::<LaunchError>(),
        Some(LaunchError::NotFound(path)) if path == "/nonexistent/viaduct-engine"
    ));
}

#[test]
fn finish_waits_for_drainer_after_driver_returns() {
    let engine = sh_engine("echo 'VIADUCT_OUTPUT 1'; sleep 0.2; echo 'VIADUCT_OUTPUT 2'");
    let (operator, _) = scripted_operator("");
    let mut session = Session::launch(&engine, operator, SessionOptions::default()).unwrap();
    assert_eq!(session.state(), SessionState::DrainerRunning);

    session
        .run_driver(&mut driver_fn(|_: &mut dyn DriverBridge| Ok(())))
        .unwrap();
    assert_eq!(session.state(), SessionState::DriverDone);

    let report = session.finish().unwrap();
    assert_eq!(report.drain.values, 2);
    assert_eq!(report.bridge.received, 0);
    assert_eq!(report.history.last(), Some(&SessionState::Terminated));
}

#[test]
fn driver_failure_still_waits_for_drainer() {
    let engine = sh_engine("echo 'VIADUCT_OUTPUT 1'");
    let (operator, _) = scripted_operator("");
    let mut session = Session::launch(&engine, operator, SessionOptions::default()).unwrap();
    let result = session.run_driver(&mut driver_fn(|_: &mut dyn DriverBridge| {
        Err(anyhow::anyhow!("driver gave up"))
    }));

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("driver gave up"));
    let report = session.finish().unwrap();
    assert_eq!(report.drain.values, 1);
    assert_eq!(report.history, full_history());
}

#[test]
fn shutdown_grace_terminates_lingering_engine() {
    let engine = sh_engine("exec sleep 30");
    let (operator, _) = scripted_operator("");
    let options = SessionOptions {
        shutdown_grace: Some(Duration::from_millis(100)),
        ..SessionOptions::default()
    };
    let started = Instant::now();
    let report = run_session(
        &engine,
        operator,
        options,
        &mut driver_fn(|_: &mut dyn DriverBridge| Ok(())),
    )
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let exit = report.engine_exit.unwrap();
    assert!(!exit.success());
    assert!(exit.signal.is_some());
}

#[test]
fn shutdown_grace_reaches_engine_descendants() {
    // The background sleep inherits stdout and would keep the drainer reading.
    let engine = sh_engine("sleep 5 & exec sleep 30");
    let (operator, _) = scripted_operator("");
    let options = SessionOptions {
        shutdown_grace: Some(Duration::from_millis(100)),
        ..SessionOptions::default()
    };
    let started = Instant::now();
    let report = run_session(
        &engine,
        operator,
        options,
        &mut driver_fn(|_: &mut dyn DriverBridge| Ok(())),
    )
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!report.drainer_detached);
    assert_eq!(report.history.last(), Some(&SessionState::Terminated));
}

#[test]
fn shutdown_detaches_drainer_when_output_outlives_termination() {
    // This descendant ignores SIGTERM and outlives the engine, holding stdout open.
    let engine = sh_engine("(trap '' TERM; sleep 6) & exec sleep 30");
    let (operator, _) = scripted_operator("");
    let options = SessionOptions {
        shutdown_grace: Some(Duration::from_millis(100)),
        ..SessionOptions::default()
    };
    let started = Instant::now();
    let report = run_session(
        &engine,
        operator,
        options,
        &mut driver_fn(|_: &mut dyn DriverBridge| Ok(())),
    )
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.drainer_detached);
    assert!(report.engine_exit.is_some_and(|exit| !exit.success()));
}

#[test]
fn receive_timeout_surfaces_to_driver() {
    let engine = sh_engine("exec sleep 30");
    let (operator, _) = scripted_operator("");
    let options = SessionOptions {
        receive_timeout: Some(Duration::from_millis(50)),
        shutdown_grace: Some(Duration::from_millis(50)),
        ..SessionOptions::default()
    };
    let err = run_session(
        &engine,
        operator,
        options,
        &mut driver_fn(|bridge: &mut dyn DriverBridge| {
            bridge.receive_from_engine()?;
            Ok(())
        }),
    )
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::ReceiveTimeout(_))
    ));
}

#[test]
fn custom_marker_selects_protocol_lines() {
    let engine = sh_engine("echo 'VIADUCT_OUTPUT 1'; echo 'RESULT 9'");
    let (operator, _) = scripted_operator("");
    let options = SessionOptions {
        marker: "RESULT".to_string(),
        ..SessionOptions::default()
    };
    let mut value = None;
    run_session(
        &engine,
        operator,
        options,
        &mut driver_fn(|bridge: &mut dyn DriverBridge| {
            value = Some(bridge.receive_from_engine()?);
            Ok(())
        }),
    )
    .unwrap();
    assert_eq!(value, Some(9));
}
