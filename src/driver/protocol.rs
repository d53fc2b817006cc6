//! Newline-delimited JSON spoken between the player and a script driver.
//!
//! The driver writes one request per line on its stdout; the player answers
//! each with exactly one reply line on the driver's stdin.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Requests (driver → player)
// ============================================================================

/// Bridge primitive invoked by a script driver.
///
/// Serialized as JSON with a `"cmd"` tag field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd")]
pub enum DriverRequest {
    /// Prompt the operator for a value
    #[serde(rename = "user_input")]
    UserInput { label: String },

    /// Write a value line to the engine's stdin
    #[serde(rename = "send_to_engine")]
    SendToEngine { value: Value },

    /// Block until the engine emits its next protocol value
    #[serde(rename = "receive_from_engine")]
    ReceiveFromEngine,

    /// Show a value to the operator
    #[serde(rename = "user_output")]
    UserOutput { value: Value },
}

// ============================================================================
// Replies (player → driver)
// ============================================================================

/// Serialized as JSON with an `"event"` tag field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum DriverReply {
    /// Raw text the operator typed
    #[serde(rename = "input")]
    Input { value: String },

    /// Send or output completed
    #[serde(rename = "ack")]
    Ack,

    /// Protocol value from the engine
    #[serde(rename = "value")]
    Value { value: i64 },

    /// The request failed; the player stops the driver after sending this
    #[serde(rename = "error")]
    Error { message: String },
}

/// Text form of a scalar JSON value: strings verbatim, numbers and booleans as printed.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
