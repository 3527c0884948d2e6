//! Time travel: rebuild the model as it was right after a given execution.
//!
//! The model is reset to the initial [`Snapshot`] and every logged mutation up
//! to and including the last one produced by the requested execution is
//! re-applied in its original order. An execution can mutate more than once,
//! so the cutoff is found by scanning the log from the end.

use crate::errors::BridgeError;
use crate::logging::append_run_log;
use crate::mutation_log::MutationLog;
use crate::protocol::ExecutionId;
use crate::snapshot::Snapshot;
use crate::state::StateContainer;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMutation {
    pub index: usize,
    pub method: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub execution_id: ExecutionId,
    /// Inclusive index of the last replayed record; `None` when the execution
    /// never mutated anything.
    pub cutoff: Option<usize>,
    pub replayed: usize,
    pub skipped: Vec<SkippedMutation>,
    /// Whether the model was reset to a snapshot before replaying.
    pub reset: bool,
}

pub fn remember(
    snapshot: Option<&Snapshot>,
    log: &MutationLog,
    state: &mut dyn StateContainer,
    execution_id: &ExecutionId,
) -> Result<ReplayReport, BridgeError> {
    let reset = match snapshot {
        Some(snapshot) => {
            state.set(snapshot.restore()?);
            true
        }
        None => false,
    };

    let cutoff = log.last_index_of(execution_id);
    let mut report = ReplayReport {
        execution_id: execution_id.clone(),
        cutoff,
        replayed: 0,
        skipped: Vec::new(),
        reset,
    };
    let Some(cutoff) = cutoff else {
        return Ok(report);
    };

    for (index, record) in log.through(cutoff).iter().enumerate() {
        let applied = record
            .operator()
            .and_then(|operator| state.apply(&operator));
        match applied {
            Ok(()) => report.replayed += 1,
            Err(err) => {
                append_run_log(
                    "warn",
                    "devtools.remember.mutation_skipped",
                    json!({
                        "index": index,
                        "execution_id": record.execution_id.as_str(),
                        "method": record.method,
                        "error": err.to_string(),
                    }),
                );
                report.skipped.push(SkippedMutation {
                    index,
                    method: record.method.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}
