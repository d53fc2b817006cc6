use super::{BridgeError, BridgeStats, DriverBridge, SessionBridge};
use crate::handoff::{CloseReason, HandoffQueue};
use crate::test_support::{scripted_operator, SharedBuffer};
use std::{
    io::{self, Write},
    sync::Arc,
    thread,
    time::Duration,
};

fn bridge_with(operator_input: &str) -> (SessionBridge, SharedBuffer, SharedBuffer, Arc<HandoffQueue>) {
    let engine_stdin = SharedBuffer::default();
    let queue = Arc::new(HandoffQueue::new());
    let (operator, terminal) = scripted_operator(operator_input);
    let bridge = SessionBridge::new(Box::new(engine_stdin.clone()), Arc::clone(&queue), operator);
    (bridge, engine_stdin, terminal, queue)
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn send_writes_value_and_newline() {
    let (mut bridge, engine_stdin, _, _) = bridge_with("");
    bridge.send_to_engine(&7).unwrap();
    assert_eq!(engine_stdin.contents(), "7\n");
    bridge.send_to_engine(&"abc").unwrap();
    assert_eq!(engine_stdin.contents(), "7\nabc\n");
}

#[test]
fn send_after_close_is_rejected() {
    let (mut bridge, engine_stdin, _, _) = bridge_with("");
    bridge.close_engine_input();
    bridge.close_engine_input();
    assert!(matches!(
        bridge.send_to_engine(&1),
        Err(BridgeError::EngineInputClosed)
    ));
    assert_eq!(engine_stdin.contents(), "");
}

#[test]
fn send_surfaces_pipe_errors() {
    let queue = Arc::new(HandoffQueue::new());
    let (operator, _) = scripted_operator("");
    let mut bridge = SessionBridge::new(Box::new(BrokenPipe), queue, operator);
    assert!(matches!(
        bridge.send_to_engine(&1),
        Err(BridgeError::EngineInput(err)) if err.kind() == io::ErrorKind::BrokenPipe
    ));
}

#[test]
fn request_input_prompts_and_strips_newline() {
    let (mut bridge, _, terminal, _) = bridge_with("12\r\nsecond\n");
    assert_eq!(bridge.request_user_input("a").unwrap(), "12");
    assert_eq!(bridge.request_user_input("b").unwrap(), "second");
    assert_eq!(terminal.contents(), "input a : input b : ");
}

#[test]
fn request_input_returns_raw_text() {
    let (mut bridge, _, _, _) = bridge_with("  not a number \n");
    assert_eq!(bridge.request_user_input("x").unwrap(), "  not a number ");
}

#[test]
fn request_input_reports_closed_terminal() {
    let (mut bridge, _, _, _) = bridge_with("");
    assert!(matches!(
        bridge.request_user_input("x"),
        Err(BridgeError::InputClosed(label)) if label == "x"
    ));
}

#[test]
fn emit_output_uses_output_prefix() {
    let (mut bridge, _, terminal, _) = bridge_with("");
    bridge.emit_user_output(&42).unwrap();
    bridge.emit_user_output(&"done").unwrap();
    assert_eq!(terminal.contents(), "output: 42\noutput: done\n");
}

#[test]
fn receive_pops_queue_in_order() {
    let (mut bridge, _, _, queue) = bridge_with("");
    queue.push(1);
    queue.push(2);
    assert_eq!(bridge.receive_from_engine().unwrap(), 1);
    assert_eq!(bridge.receive_from_engine().unwrap(), 2);
}

#[test]
fn receive_blocks_until_producer_pushes() {
    let (mut bridge, _, _, queue) = bridge_with("");
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        queue.push(99);
    });
    assert_eq!(bridge.receive_from_engine().unwrap(), 99);
    producer.join().unwrap();
}

#[test]
fn receive_reports_engine_termination() {
    let (mut bridge, _, _, queue) = bridge_with("");
    queue.close(CloseReason::OutputClosed);
    assert!(matches!(
        bridge.receive_from_engine(),
        Err(BridgeError::EngineTerminated(CloseReason::OutputClosed))
    ));
}

#[test]
fn receive_honours_timeout() {
    let (bridge, _, _, _) = bridge_with("");
    let mut bridge = bridge.with_receive_timeout(Some(Duration::from_millis(30)));
    assert!(matches!(
        bridge.receive_from_engine(),
        Err(BridgeError::ReceiveTimeout(after)) if after == Duration::from_millis(30)
    ));
}

#[test]
fn stats_count_successful_calls() {
    let (mut bridge, _, _, queue) = bridge_with("v\n");
    queue.push(5);
    bridge.request_user_input("x").unwrap();
    bridge.send_to_engine(&5).unwrap();
    bridge.receive_from_engine().unwrap();
    bridge.emit_user_output(&5).unwrap();
    let _ = bridge.request_user_input("y");
    assert_eq!(
        bridge.stats(),
        BridgeStats {
            inputs: 1,
            sent: 1,
            received: 1,
            outputs: 1,
        }
    );
}
