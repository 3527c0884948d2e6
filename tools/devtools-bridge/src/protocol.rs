use crate::errors::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::fmt;

pub const PROTOCOL_VERSION: &str = "v1";

/// Event name prefix the debugger uses for its notifications.
pub const DEBUGGER_EVENT_PREFIX: &str = "cerebral2.debugger.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Ping,
    Init,
    Execution,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Init => "init",
            Self::Execution => "execution",
        }
    }
}

/// JSON that is either already serialized (written out verbatim) or still a
/// structured value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EmbeddedJson {
    PreSerialized(Box<RawValue>),
    Structured(Value),
}

impl EmbeddedJson {
    pub fn pre_serialized(json: String) -> Result<Self, BridgeError> {
        RawValue::from_string(json)
            .map(Self::PreSerialized)
            .map_err(|e| BridgeError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub name: String,
    pub execution_id: ExecutionId,
    pub function_index: usize,
    pub static_tree: Option<Value>,
    pub payload: Value,
    pub datetime: i64,
    pub data: Option<EmbeddedJson>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T> {
    #[serde(rename = "type")]
    kind: MessageType,
    version: &'a str,
    data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitData<'a> {
    initial_model: &'a EmbeddedJson,
    executions: [ExecutionRecord; 0],
}

#[derive(Debug, Serialize)]
struct ExecutionData<'a> {
    executions: [&'a ExecutionRecord; 1],
}

pub fn encode_ping() -> String {
    json!({"type": MessageType::Ping.as_str()}).to_string()
}

pub fn encode_init(initial_model: &EmbeddedJson) -> Result<String, BridgeError> {
    encode(&Envelope {
        kind: MessageType::Init,
        version: PROTOCOL_VERSION,
        data: InitData {
            initial_model,
            executions: [],
        },
    })
}

pub fn encode_execution(record: &ExecutionRecord) -> Result<String, BridgeError> {
    encode(&Envelope {
        kind: MessageType::Execution,
        version: PROTOCOL_VERSION,
        data: ExecutionData {
            executions: [record],
        },
    })
}

fn encode<T: Serialize>(envelope: &T) -> Result<String, BridgeError> {
    serde_json::to_string(envelope).map_err(|e| BridgeError::Serialization(e.to_string()))
}

/// Notification received from the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerSignal {
    Ping,
    Pong,
    Remember(ExecutionId),
}

impl DebuggerSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Remember(_) => "remember",
        }
    }

    /// Decode a named notification. The name may carry
    /// [`DEBUGGER_EVENT_PREFIX`].
    pub fn from_event(name: &str, detail: Option<&Value>) -> Result<Self, BridgeError> {
        let short = name.strip_prefix(DEBUGGER_EVENT_PREFIX).unwrap_or(name);
        match short {
            "ping" => Ok(Self::Ping),
            "pong" => Ok(Self::Pong),
            "remember" => match detail {
                Some(Value::String(id)) => Ok(Self::Remember(ExecutionId::new(id.clone()))),
                Some(Value::Number(id)) => Ok(Self::Remember(ExecutionId::new(id.to_string()))),
                _ => Err(BridgeError::Protocol(
                    "remember requires an execution id detail".to_string(),
                )),
            },
            other => Err(BridgeError::Protocol(format!(
                "unknown debugger signal `{other}`"
            ))),
        }
    }

    /// Decode the text form `{"type": "...", "detail": ...}`.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| BridgeError::Protocol(format!("invalid signal json: {e}")))?;
        let name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::Protocol("signal is missing `type`".to_string()))?;
        Self::from_event(name, value.get("detail"))
    }

    pub fn to_json(&self) -> String {
        match self {
            Self::Remember(id) => json!({"type": self.name(), "detail": id.as_str()}),
            _ => json!({"type": self.name()}),
        }
        .to_string()
    }
}
