//! What the bridge needs from the instrumented application.

use crate::protocol::ExecutionId;
use crate::state::{JsonModel, StateContainer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub datetime: i64,
    #[serde(default)]
    pub static_tree: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution: Execution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDetails {
    pub function_index: usize,
}

pub trait HostController {
    fn state(&mut self) -> &mut dyn StateContainer;
    /// Publish an event on the host's bus. `force` asks listeners to re-render
    /// even when nothing appears to have changed.
    fn emit(&mut self, event: &str, payload: Value, force: bool);
    /// Surface a diagnostic to the developer.
    fn warn(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub event: String,
    pub payload: Value,
    pub force: bool,
}

/// Host over a [`JsonModel`] that records what the bridge asked of it.
#[derive(Debug, Clone, Default)]
pub struct JsonHost {
    pub model: JsonModel,
    pub emitted: Vec<EmittedEvent>,
    pub warnings: Vec<String>,
}

impl JsonHost {
    pub fn new(state: Value) -> Self {
        Self {
            model: JsonModel::new(state),
            ..Self::default()
        }
    }
}

impl HostController for JsonHost {
    fn state(&mut self) -> &mut dyn StateContainer {
        &mut self.model
    }

    fn emit(&mut self, event: &str, payload: Value, force: bool) {
        self.emitted.push(EmittedEvent {
            event: event.to_string(),
            payload,
            force,
        });
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}
