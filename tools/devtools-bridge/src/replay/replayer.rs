//! Offline time travel: load a recording and rebuild the model at any
//! recorded execution.

use crate::encoder::is_mutation;
use crate::errors::BridgeError;
use crate::mutation_log::{MutationLog, MutationRecord};
use crate::protocol::{ExecutionId, MessageType};
use crate::remember::{remember, ReplayReport};
use crate::replay::recording::{InboundRecord, RecordEntry, SessionStartRecord};
use crate::snapshot::Snapshot;
use crate::state::{JsonModel, StateContainer};
use serde_json::Value;
use std::path::Path;

/// One execution as it appears in a recording, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub name: String,
    pub datetime: i64,
    pub steps: usize,
    pub mutations: usize,
}

// ── SessionRecording ──────────────────────────────────────────────────────────

/// A parsed recording file, ready for replay.
#[derive(Debug, Clone)]
pub struct SessionRecording {
    pub header: SessionStartRecord,
    pub entries: Vec<RecordEntry>,
}

impl SessionRecording {
    /// Load and parse a JSONL recording file.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| BridgeError::Io(e.to_string()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let mut header: Option<SessionStartRecord> = None;
        let mut entries: Vec<RecordEntry> = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: RecordEntry = serde_json::from_str(line).map_err(|e| {
                BridgeError::Recording(format!("recording line {}: {e}", idx + 1))
            })?;
            if let RecordEntry::SessionStart(start) = &entry {
                if header.is_none() {
                    header = Some(start.clone());
                }
            }
            entries.push(entry);
        }
        let header = header.ok_or_else(|| {
            BridgeError::Recording("recording has no session_start entry".to_string())
        })?;
        Ok(Self { header, entries })
    }

    /// Envelopes delivered to the debugger, in delivery order.
    pub fn outbound_messages(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|entry| match entry {
            RecordEntry::Outbound(record) => Some(&record.message),
            _ => None,
        })
    }

    /// Envelopes the live bridge dropped from its backlog before delivery.
    pub fn evicted_messages(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|entry| match entry {
            RecordEntry::Evicted(record) => Some(&record.message),
            _ => None,
        })
    }

    pub fn inbound_signals(&self) -> impl Iterator<Item = &InboundRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            RecordEntry::Inbound(record) => Some(record),
            _ => None,
        })
    }

    /// Model carried by the first `init` envelope.
    pub fn initial_model(&self) -> Option<&Value> {
        self.outbound_messages()
            .find(|message| message_type(message) == Some(MessageType::Init.as_str()))
            .and_then(|message| message.pointer("/data/initialModel"))
    }

    /// Snapshot rebuilt from the recorded initial model. Only recordings made
    /// with mutation storage enabled can be replayed.
    pub fn snapshot(&self) -> Result<Snapshot, BridgeError> {
        if !self.header.store_mutations {
            return Err(BridgeError::Recording(
                "recording was made with mutation storage disabled".to_string(),
            ));
        }
        let model = self.initial_model().ok_or_else(|| {
            BridgeError::Recording("recording has no init message".to_string())
        })?;
        Snapshot::capture(model)
    }

    pub fn snapshot_fingerprint(&self) -> Result<String, BridgeError> {
        Ok(self.snapshot()?.fingerprint().to_string())
    }

    /// Mutation log rebuilt from the recorded `execution` envelopes, delivered
    /// or evicted. Malformed descriptors keep their place and are skipped at
    /// replay time, as in the live bridge.
    pub fn mutation_log(&self) -> Result<MutationLog, BridgeError> {
        let mut log = MutationLog::new();
        for record in self.execution_records() {
            let data = record.get("data");
            let Some(descriptor) = data.filter(|_| is_mutation(data)) else {
                continue;
            };
            let execution_id = execution_id_of(record)?;
            let serialized = serde_json::to_string(descriptor)
                .map_err(|e| BridgeError::Serialization(e.to_string()))?;
            log.append(MutationRecord::from_descriptor(
                execution_id,
                descriptor,
                serialized,
            ));
        }
        Ok(log)
    }

    pub fn executions(&self) -> Result<Vec<ExecutionSummary>, BridgeError> {
        let mut summaries: Vec<ExecutionSummary> = Vec::new();
        for record in self.execution_records() {
            let execution_id = execution_id_of(record)?;
            let existing = summaries
                .iter()
                .position(|summary| summary.execution_id == execution_id);
            let index = match existing {
                Some(index) => index,
                None => {
                    summaries.push(ExecutionSummary {
                        execution_id,
                        name: record
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        datetime: record.get("datetime").and_then(Value::as_i64).unwrap_or(0),
                        steps: 0,
                        mutations: 0,
                    });
                    summaries.len() - 1
                }
            };
            summaries[index].steps += 1;
        }
        let log = self.mutation_log()?;
        for summary in &mut summaries {
            summary.mutations = log.count_for(&summary.execution_id);
        }
        Ok(summaries)
    }

    /// The model as it was right after `execution_id` last mutated it.
    pub fn remember(&self, execution_id: &ExecutionId) -> Result<(Value, ReplayReport), BridgeError> {
        let snapshot = self.snapshot()?;
        let log = self.mutation_log()?;
        let mut model = JsonModel::new(snapshot.restore()?);
        let report = remember(Some(&snapshot), &log, &mut model, execution_id)?;
        Ok((model.get(), report))
    }

    /// Execution records in production order. Evicted envelopes are always
    /// written before the backlog flush that follows them.
    fn execution_records(&self) -> impl Iterator<Item = &Value> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                RecordEntry::Outbound(record) | RecordEntry::Evicted(record) => {
                    Some(&record.message)
                }
                _ => None,
            })
            .filter(|message| message_type(message) == Some(MessageType::Execution.as_str()))
            .filter_map(|message| message.pointer("/data/executions"))
            .filter_map(Value::as_array)
            .flatten()
    }
}

fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

fn execution_id_of(record: &Value) -> Result<ExecutionId, BridgeError> {
    match record.get("executionId") {
        Some(Value::String(id)) => Ok(ExecutionId::new(id.clone())),
        Some(Value::Number(id)) => Ok(ExecutionId::new(id.to_string())),
        _ => Err(BridgeError::Recording(
            "execution record has no executionId".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recording(store_mutations: bool, messages: &[Value]) -> String {
        let entries = messages
            .iter()
            .map(|message| ("outbound", message.clone()))
            .collect::<Vec<_>>();
        recording_of(store_mutations, &entries)
    }

    fn recording_of(store_mutations: bool, entries: &[(&str, Value)]) -> String {
        let mut lines = vec![json!({
            "type": "session_start",
            "schema_version": 1,
            "recorded_at_unix_ms": 0,
            "bridge_version": "0.1.0",
            "protocol_version": "v1",
            "store_mutations": store_mutations,
        })];
        for (seq, (kind, message)) in entries.iter().enumerate() {
            lines.push(json!({
                "type": kind,
                "seq": seq + 1,
                "timestamp_ms": 0,
                "message": message,
            }));
        }
        lines
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn execution(id: &str, name: &str, data: Option<Value>) -> Value {
        json!({
            "type": "execution",
            "version": "v1",
            "data": {"executions": [{
                "name": name,
                "executionId": id,
                "functionIndex": 0,
                "staticTree": null,
                "payload": {},
                "datetime": 7,
                "data": data,
            }]},
        })
    }

    fn set_count(value: i64) -> Option<Value> {
        Some(json!({"type": "mutation", "method": "set", "args": [["count"], value]}))
    }

    fn counter_session() -> SessionRecording {
        SessionRecording::parse(&recording(
            true,
            &[
                json!({"type": "ping"}),
                json!({"type": "init", "version": "v1", "data": {"initialModel": {"count": 0}, "executions": []}}),
                execution("A", "incremented", None),
                execution("A", "incremented", set_count(1)),
                execution("B", "incremented", set_count(2)),
            ],
        ))
        .expect("parse")
    }

    #[test]
    fn rebuilds_the_model_at_each_execution() {
        let session = counter_session();
        let (model, report) = session.remember(&ExecutionId::from("A")).expect("A");
        assert_eq!(model, json!({"count": 1}));
        assert_eq!(report.cutoff, Some(0));

        let (model, _) = session.remember(&ExecutionId::from("B")).expect("B");
        assert_eq!(model, json!({"count": 2}));

        let (model, report) = session.remember(&ExecutionId::from("missing")).expect("miss");
        assert_eq!(model, json!({"count": 0}));
        assert_eq!(report.replayed, 0);
    }

    #[test]
    fn summarizes_executions_in_first_appearance_order() {
        let summaries = counter_session().executions().expect("executions");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].execution_id, ExecutionId::from("A"));
        assert_eq!(summaries[0].steps, 2);
        assert_eq!(summaries[0].mutations, 1);
        assert_eq!(summaries[1].execution_id, ExecutionId::from("B"));
        assert_eq!(summaries[1].datetime, 7);
    }

    #[test]
    fn fingerprint_matches_a_live_capture_of_the_same_model() {
        let live = Snapshot::capture(&json!({"count": 0})).expect("capture");
        assert_eq!(
            counter_session().snapshot_fingerprint().expect("fingerprint"),
            live.fingerprint()
        );
    }

    #[test]
    fn recordings_without_mutation_storage_cannot_be_replayed() {
        let session = SessionRecording::parse(&recording(
            false,
            &[json!({"type": "init", "version": "v1", "data": {"initialModel": {}, "executions": []}})],
        ))
        .expect("parse");
        let err = session.remember(&ExecutionId::from("A")).expect_err("disabled");
        assert!(matches!(err, BridgeError::Recording(message) if message.contains("disabled")));
    }

    #[test]
    fn evicted_mutations_are_replayed_in_production_order() {
        let push = |id: &str, item: &str| {
            execution(
                id,
                "added",
                Some(json!({"type": "mutation", "method": "push", "args": [["log"], item]})),
            )
        };
        let session = SessionRecording::parse(&recording_of(
            true,
            &[
                ("outbound", json!({"type": "ping"})),
                ("evicted", push("A", "a")),
                ("outbound", json!({"type": "init", "version": "v1", "data": {"initialModel": {"log": []}, "executions": []}})),
                ("outbound", push("B", "b")),
            ],
        ))
        .expect("parse");

        assert_eq!(session.evicted_messages().count(), 1);
        assert_eq!(session.mutation_log().expect("log").len(), 2);
        let (model, report) = session.remember(&ExecutionId::from("B")).expect("B");
        assert_eq!(model, json!({"log": ["a", "b"]}));
        assert!(report.skipped.is_empty());
        assert_eq!(session.executions().expect("executions")[0].execution_id, ExecutionId::from("A"));
    }

    #[test]
    fn descriptor_without_method_is_skipped_not_fatal() {
        let session = SessionRecording::parse(&recording(
            true,
            &[
                json!({"type": "init", "version": "v1", "data": {"initialModel": {"count": 0}, "executions": []}}),
                execution("A", "incremented", Some(json!({"type": "mutation", "args": [["count"], 5]}))),
                execution("B", "incremented", set_count(2)),
            ],
        ))
        .expect("parse");

        let (model, report) = session.remember(&ExecutionId::from("B")).expect("B");
        assert_eq!(model, json!({"count": 2}));
        assert_eq!(report.replayed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 0);
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = SessionRecording::parse(r#"{"type":"outbound","seq":1,"timestamp_ms":0,"message":{}}"#)
            .expect_err("no header");
        assert!(matches!(err, BridgeError::Recording(_)));
    }

    #[test]
    fn malformed_line_reports_its_line_number() {
        let raw = format!("{}\n\n{{oops", recording(true, &[]));
        let err = SessionRecording::parse(&raw).expect_err("malformed");
        assert!(matches!(err, BridgeError::Recording(message) if message.contains("line 3")));
    }
}
