use crate::errors::BridgeError;
use crate::protocol::EmbeddedJson;
use serde_json::value::RawValue;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialized copy of the model taken once at `init`, before any mutation.
/// It is never modified; every replay starts from a fresh copy of it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    serialized: Box<RawValue>,
    fingerprint: String,
}

impl Snapshot {
    pub fn capture(state: &Value) -> Result<Self, BridgeError> {
        let json =
            serde_json::to_string(state).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        Self::from_serialized(json)
    }

    pub fn from_serialized(json: String) -> Result<Self, BridgeError> {
        let fingerprint = fingerprint(json.as_bytes());
        let serialized =
            RawValue::from_string(json).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        Ok(Self {
            serialized,
            fingerprint,
        })
    }

    /// A fresh, independent copy of the captured state.
    pub fn restore(&self) -> Result<Value, BridgeError> {
        serde_json::from_str(self.serialized.get())
            .map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.serialized.get()
    }

    pub fn embedded(&self) -> EmbeddedJson {
        EmbeddedJson::PreSerialized(self.serialized.clone())
    }

    /// `sha256:` followed by the first 16 hex chars of the digest.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    let prefix: String = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{prefix}")
}
