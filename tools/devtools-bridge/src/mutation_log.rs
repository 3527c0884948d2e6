use crate::errors::BridgeError;
use crate::protocol::ExecutionId;
use crate::state::MutationOperator;
use serde_json::Value;

/// One state mutation as it was applied to the live model.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub execution_id: ExecutionId,
    pub method: String,
    pub args: Vec<Value>,
    /// The debugging descriptor exactly as it was sent to the debugger.
    pub serialized: String,
    /// Why the descriptor cannot be replayed, when it is malformed. Such a
    /// record still holds its place in the log.
    pub defect: Option<String>,
}

impl MutationRecord {
    /// Build a record from a `{"type": "mutation", "method": ..., "args": [...]}`
    /// descriptor and its serialized form. Malformed descriptors are kept
    /// with a [`defect`](Self::defect) so replay can report them.
    pub fn from_descriptor(execution_id: ExecutionId, descriptor: &Value, serialized: String) -> Self {
        let method = descriptor.get("method").and_then(Value::as_str);
        let (args, args_defect) = match descriptor.get("args") {
            Some(Value::Array(args)) => (args.clone(), None),
            None | Some(Value::Null) => (Vec::new(), None),
            Some(other) => (
                Vec::new(),
                Some(format!("mutation args must be an array, got {other}")),
            ),
        };
        let defect = match method {
            None => Some("mutation descriptor has no method".to_string()),
            Some(_) => args_defect,
        };
        Self {
            execution_id,
            method: method.unwrap_or_default().to_string(),
            args,
            serialized,
            defect,
        }
    }

    pub fn operator(&self) -> Result<MutationOperator, BridgeError> {
        if let Some(defect) = &self.defect {
            return Err(BridgeError::Mutation(defect.clone()));
        }
        MutationOperator::from_call(&self.method, &self.args)
    }
}

/// Append-only, insertion-ordered list of mutations. Insertion order is the
/// replay order.
#[derive(Debug, Clone, Default)]
pub struct MutationLog {
    records: Vec<MutationRecord>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: MutationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MutationRecord] {
        &self.records
    }

    /// Index of the most recent record produced by `execution_id`.
    pub fn last_index_of(&self, execution_id: &ExecutionId) -> Option<usize> {
        self.records
            .iter()
            .rposition(|record| &record.execution_id == execution_id)
    }

    /// Every record up to and including `cutoff`, in insertion order.
    pub fn through(&self, cutoff: usize) -> &[MutationRecord] {
        let end = cutoff.saturating_add(1).min(self.records.len());
        &self.records[..end]
    }

    pub fn count_for(&self, execution_id: &ExecutionId) -> usize {
        self.records
            .iter()
            .filter(|record| &record.execution_id == execution_id)
            .count()
    }
}
