use crate::errors::BridgeError;
use crate::host::{ExecutionContext, FunctionDetails};
use crate::logging::append_run_log;
use crate::mutation_log::MutationRecord;
use crate::protocol::{encode_execution, EmbeddedJson, ExecutionRecord};
use serde_json::{json, Value};

pub const MUTATION_KIND: &str = "mutation";

#[derive(Debug, Clone)]
pub struct EncodedStep {
    pub message: String,
    /// Present when the step carried a mutation and storage is enabled.
    pub mutation: Option<MutationRecord>,
}

pub fn is_mutation(debugging_data: Option<&Value>) -> bool {
    debugging_data
        .and_then(|data| data.get("type"))
        .and_then(Value::as_str)
        == Some(MUTATION_KIND)
}

/// Serialize one function-tree step as an `execution` message.
///
/// A stored mutation is serialized once: the same text becomes the mutation
/// record and is embedded verbatim in the outbound message.
pub fn encode_step(
    store_mutations: bool,
    debugging_data: Option<&Value>,
    context: &ExecutionContext,
    function: FunctionDetails,
    payload: &Value,
) -> Result<EncodedStep, BridgeError> {
    let execution = &context.execution;
    let (data, mutation) = match debugging_data {
        Some(descriptor) if store_mutations && is_mutation(debugging_data) => {
            let serialized = serde_json::to_string(descriptor)
                .map_err(|e| BridgeError::Serialization(e.to_string()))?;
            let mutation = MutationRecord::from_descriptor(
                execution.id.clone(),
                descriptor,
                serialized.clone(),
            );
            if let Some(defect) = &mutation.defect {
                append_run_log(
                    "warn",
                    "devtools.mutation.malformed",
                    json!({
                        "execution_id": execution.id.as_str(),
                        "error": defect,
                    }),
                );
            }
            (Some(EmbeddedJson::pre_serialized(serialized)?), Some(mutation))
        }
        Some(other) => (Some(EmbeddedJson::Structured(other.clone())), None),
        None => (None, None),
    };

    let static_tree = if function.function_index == 0 && debugging_data.is_none() {
        execution.static_tree.clone()
    } else {
        None
    };

    let record = ExecutionRecord {
        name: execution.name.clone(),
        execution_id: execution.id.clone(),
        function_index: function.function_index,
        static_tree,
        payload: payload.clone(),
        datetime: execution.datetime,
        data,
    };
    Ok(EncodedStep {
        message: encode_execution(&record)?,
        mutation,
    })
}
