//! Telemetry record types
//!
//! Completed CLI invocations, RPC calls, and contract events as reported by
//! producers. Records are immutable once ingested; timestamps are Unix
//! milliseconds internally, with RFC 3339 strings accepted on the wire.

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Outcome of a completed command or RPC call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One completed CLI invocation and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Producer-assigned identifier, unique within the command stream
    pub id: u64,

    /// Command text as typed (e.g., "contract deploy --wasm hello.wasm")
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,

    pub status: RecordStatus,

    /// Start time (Unix milliseconds)
    #[serde(deserialize_with = "de_timestamp_ms")]
    pub timestamp: u64,

    pub duration_ms: u64,

    /// Free-text output captured from the invocation
    #[serde(default)]
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// One completed remote-procedure call and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRecord {
    /// Producer-assigned identifier, unique within the RPC stream
    pub id: u64,

    pub rpc_method: String,

    #[serde(default)]
    pub parameters: serde_json::Value,

    pub status: RecordStatus,

    /// Start time (Unix milliseconds)
    #[serde(deserialize_with = "de_timestamp_ms")]
    pub timestamp: u64,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Explicit causal link to the CLI command that issued this call.
    /// Authoritative for trace correlation when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_command_id: Option<u64>,
}

/// One emitted contract event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEvent {
    pub id: u64,

    pub contract_id: String,

    pub event_type: String,

    /// Emission time (Unix milliseconds)
    #[serde(deserialize_with = "de_timestamp_ms")]
    pub timestamp: u64,

    #[serde(default)]
    pub data: serde_json::Value,
}

/// Rejection reasons for malformed records at ingest
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("command text must not be empty")]
    EmptyCommand,

    #[error("rpc method must not be empty")]
    EmptyMethod,

    #[error("contract id must not be empty")]
    EmptyContractId,

    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("timestamp must not be zero")]
    ZeroTimestamp,
}

impl CommandRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.command.trim().is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        if self.timestamp == 0 {
            return Err(ValidationError::ZeroTimestamp);
        }
        Ok(())
    }

    /// Time window covered by this invocation, inclusive on both ends
    pub fn window(&self) -> (u64, u64) {
        (self.timestamp, self.timestamp.saturating_add(self.duration_ms))
    }
}

impl RpcRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rpc_method.trim().is_empty() {
            return Err(ValidationError::EmptyMethod);
        }
        if self.timestamp == 0 {
            return Err(ValidationError::ZeroTimestamp);
        }
        Ok(())
    }
}

impl ContractEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contract_id.trim().is_empty() {
            return Err(ValidationError::EmptyContractId);
        }
        if self.event_type.trim().is_empty() {
            return Err(ValidationError::EmptyEventType);
        }
        if self.timestamp == 0 {
            return Err(ValidationError::ZeroTimestamp);
        }
        Ok(())
    }
}

/// Get current time as Unix milliseconds
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Accept either Unix milliseconds or an RFC 3339 string for timestamps.
///
/// CLI producers report integer milliseconds; the event relay reports
/// RFC 3339. Both normalize to Unix milliseconds.
fn de_timestamp_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Millis(ms) => Ok(ms),
        Repr::Text(s) => {
            let parsed = DateTime::parse_from_rfc3339(&s)
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", s, e)))?;
            Ok(parsed.timestamp_millis().max(0) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(RecordStatus::parse("success"), Some(RecordStatus::Success));
        assert_eq!(RecordStatus::parse("error"), Some(RecordStatus::Error));
        assert_eq!(RecordStatus::parse("pending"), None);
        assert_eq!(RecordStatus::Success.as_str(), "success");
    }

    #[test]
    fn test_command_validation() {
        let record = CommandRecord {
            id: 1,
            command: "contract deploy".to_string(),
            parameters: None,
            status: RecordStatus::Success,
            timestamp: 1_700_000_000_000,
            duration_ms: 2300,
            output: String::new(),
            user: None,
        };
        assert!(record.validate().is_ok());

        let mut empty = record.clone();
        empty.command = "   ".to_string();
        assert_eq!(empty.validate(), Err(ValidationError::EmptyCommand));
    }

    #[test]
    fn test_command_window_saturates() {
        let record = CommandRecord {
            id: 1,
            command: "x".to_string(),
            parameters: None,
            status: RecordStatus::Success,
            timestamp: u64::MAX - 10,
            duration_ms: 100,
            output: String::new(),
            user: None,
        };
        assert_eq!(record.window(), (u64::MAX - 10, u64::MAX));
    }

    #[test]
    fn test_timestamp_accepts_millis_and_rfc3339() {
        let from_millis: CommandRecord = serde_json::from_str(
            r#"{"id":1,"command":"c","status":"success","timestamp":1700000000000,"duration_ms":5}"#,
        )
        .unwrap();
        assert_eq!(from_millis.timestamp, 1_700_000_000_000);

        let from_text: ContractEvent = serde_json::from_str(
            r#"{"id":1,"contract_id":"CCR6","event_type":"transfer","timestamp":"2023-11-14T22:13:20Z","data":{}}"#,
        )
        .unwrap();
        assert_eq!(from_text.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_invalid_status_rejected_by_serde() {
        let parsed: Result<CommandRecord, _> = serde_json::from_str(
            r#"{"id":1,"command":"c","status":"running","timestamp":1,"duration_ms":5}"#,
        );
        assert!(parsed.is_err());
    }
}
