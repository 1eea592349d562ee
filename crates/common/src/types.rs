//! Core types for Momos

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::schema::ActionScript;

/// Action name used for the synthetic step recorded when a run fails
pub const ERROR_STEP_ACTION: &str = "error";

/// One captured step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Position of the originating action, or the synthetic final index
    pub index: usize,
    /// Action type, or `"error"` for the synthetic failure step
    pub action: String,
    /// URL, selector, duration or error message
    pub details: String,
    /// Completion time in milliseconds since the epoch
    pub timestamp: i64,
    /// Base64 encoded JPEG
    pub screenshot: String,
    /// Page URL at capture time
    pub url: String,
}

impl TraceStep {
    pub fn is_error_step(&self) -> bool {
        self.action == ERROR_STEP_ACTION
    }
}

/// Timeline and outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceData {
    pub start_time: i64,
    pub end_time: i64,
    /// Milliseconds between `start_time` and `end_time`
    pub duration: i64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
}

impl TraceData {
    /// Whether the trace is internally consistent for a script of
    /// `action_count` actions.
    pub fn is_consistent(&self, action_count: usize) -> bool {
        self.steps.len() <= action_count + 1
            && self.duration >= 0
            && self.end_time - self.start_time == self.duration
    }

    /// The synthetic failure step, if one was captured.
    pub fn error_step(&self) -> Option<&TraceStep> {
        self.steps.last().filter(|s| s.is_error_step())
    }
}

/// A telemetry envelope captured from the page under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotlightEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: i64,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl SpotlightEvent {
    pub fn is_error(&self) -> bool {
        self.event_type.contains("error")
    }

    pub fn is_transaction(&self) -> bool {
        self.event_type.contains("transaction")
    }
}

pub type SpotlightData = Vec<SpotlightEvent>;

/// Verbatim output of the program executed in the sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Everything a caller gets back from a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// Program output with the framed payloads removed
    pub stdout: String,
    pub stderr: String,
    pub trace: Option<TraceData>,
    pub spotlight: Option<SpotlightData>,
}

/// Request to the generation agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub url: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_script: Option<ActionScript>,
}

/// Answer from the generation agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub message: String,
    pub script: ActionScript,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(index: usize, action: &str) -> TraceStep {
        TraceStep {
            index,
            action: action.to_string(),
            details: String::new(),
            timestamp: 1_700_000_000_000,
            screenshot: String::new(),
            url: "about:blank".to_string(),
        }
    }

    #[test]
    fn test_trace_wire_format() {
        let trace: TraceData = serde_json::from_value(json!({
            "startTime": 1000,
            "endTime": 1600,
            "duration": 600,
            "success": false,
            "error": "Timeout 30000ms exceeded",
            "steps": [
                { "index": 0, "action": "goto", "details": "https://example.com",
                  "timestamp": 1300, "screenshot": "/9j/", "url": "https://example.com/" },
                { "index": 1, "action": "error", "details": "Timeout 30000ms exceeded",
                  "timestamp": 1590, "screenshot": "/9j/", "url": "https://example.com/" }
            ]
        }))
        .unwrap();

        assert!(!trace.success);
        assert!(trace.is_consistent(2));
        assert_eq!(trace.error_step().map(|s| s.index), Some(1));
    }

    #[test]
    fn test_null_error_round_trips() {
        let trace = TraceData {
            start_time: 10,
            end_time: 10,
            duration: 0,
            success: true,
            error: None,
            steps: vec![],
        };
        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value["error"], serde_json::Value::Null);
        assert_eq!(serde_json::from_value::<TraceData>(value).unwrap(), trace);
    }

    #[test]
    fn test_consistency_bounds() {
        let mut trace = TraceData {
            start_time: 0,
            end_time: 5,
            duration: 5,
            success: true,
            error: None,
            steps: vec![step(0, "goto"), step(1, "error")],
        };
        assert!(trace.is_consistent(1));
        assert!(!trace.is_consistent(0));

        trace.duration = 4;
        assert!(!trace.is_consistent(1));
    }

    #[test]
    fn test_spotlight_event_type_field() {
        let event: SpotlightEvent = serde_json::from_value(json!({
            "envelopeId": "4f1c",
            "type": "transaction,profile",
            "timestamp": 1,
            "data": { "header": {} }
        }))
        .unwrap();
        assert!(event.is_transaction());
        assert!(!event.is_error());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "transaction,profile");
        assert!(value.get("headers").is_none());
    }

    #[test]
    fn test_execution_result_camel_case() {
        let result = ExecutionResult {
            exit_code: 1,
            stdout: "hello".into(),
            stderr: String::new(),
            trace: None,
            spotlight: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["exitCode"], 1);
        assert_eq!(value["trace"], serde_json::Value::Null);
        assert_eq!(value["spotlight"], serde_json::Value::Null);
    }
}
