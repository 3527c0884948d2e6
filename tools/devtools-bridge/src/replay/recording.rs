//! Serializable types for session recording.
//!
//! A recording is a JSONL file where each line is a `RecordEntry` JSON object.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

pub const RECORDING_SCHEMA_VERSION: u32 = 1;

// ── RecordEntry ───────────────────────────────────────────────────────────────

/// The top-level tagged enum that is read back from a single JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordEntry {
    SessionStart(SessionStartRecord),
    Outbound(OutboundRecord),
    Inbound(InboundRecord),
    Evicted(OutboundRecord),
}

// ── Concrete record types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStartRecord {
    pub schema_version: u32,
    pub recorded_at_unix_ms: u64,
    pub bridge_version: String,
    pub protocol_version: String,
    pub store_mutations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub seq: u64,
    pub timestamp_ms: u64,
    /// The envelope exactly as the debugger received it.
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundRecord {
    pub seq: u64,
    pub timestamp_ms: u64,
    /// Parsed signal, or the raw text as a string when it was not JSON.
    pub signal: Value,
}

/// Write-side twin of `RecordEntry::Outbound` and `RecordEntry::Evicted` that
/// splices the already serialized envelope in without parsing it.
#[derive(Debug, Serialize)]
pub(crate) struct OutboundLine<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub seq: u64,
    pub timestamp_ms: u64,
    pub message: &'a RawValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_line_reads_back_as_outbound_entry() {
        let raw: &RawValue =
            serde_json::from_str(r#"{"type":"ping"}"#).expect("raw envelope");
        let line = serde_json::to_string(&OutboundLine {
            kind: "outbound",
            seq: 3,
            timestamp_ms: 10,
            message: raw,
        })
        .expect("serialize");
        let entry: RecordEntry = serde_json::from_str(&line).expect("deserialize");
        let RecordEntry::Outbound(outbound) = entry else {
            panic!("expected outbound entry, got {line}");
        };
        assert_eq!(outbound.seq, 3);
        assert_eq!(outbound.message["type"], "ping");
    }

    #[test]
    fn evicted_line_reads_back_as_evicted_entry() {
        let raw: &RawValue =
            serde_json::from_str(r#"{"type":"execution"}"#).expect("raw envelope");
        let line = serde_json::to_string(&OutboundLine {
            kind: "evicted",
            seq: 1,
            timestamp_ms: 0,
            message: raw,
        })
        .expect("serialize");
        let entry: RecordEntry = serde_json::from_str(&line).expect("deserialize");
        assert!(matches!(entry, RecordEntry::Evicted(record) if record.message["type"] == "execution"));
    }

    #[test]
    fn unknown_entry_type_is_rejected() {
        let err = serde_json::from_str::<RecordEntry>(r#"{"type":"telemetry"}"#);
        assert!(err.is_err());
    }
}
