//! `SessionRecorder` and the `RecordingChannel` wrapper.
//!
//! Recording is observational: a failed write is logged and the bridge keeps
//! running.

use crate::channel::MessageChannel;
use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::logging::append_run_log;
use crate::protocol::PROTOCOL_VERSION;
use crate::replay::recording::{
    InboundRecord, OutboundLine, RecordEntry, SessionStartRecord, RECORDING_SCHEMA_VERSION,
};
use crate::runtime::Clock;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ── SessionRecorder ───────────────────────────────────────────────────────────

pub struct SessionRecorder {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    seq: AtomicU64,
    write_lock: Mutex<()>,
}

impl SessionRecorder {
    /// Start a fresh recording at `path`, replacing any previous file.
    pub fn create(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        store_mutations: bool,
    ) -> Result<Self, BridgeError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BridgeError::Io(e.to_string()))?;
        }
        fs::write(&path, "").map_err(|e| BridgeError::Io(e.to_string()))?;

        let recorder = Self {
            path,
            clock,
            seq: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        };
        let header = RecordEntry::SessionStart(SessionStartRecord {
            schema_version: RECORDING_SCHEMA_VERSION,
            recorded_at_unix_ms: recorder.clock.now_unix_ms(),
            bridge_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            store_mutations,
        });
        recorder.write_line(&to_line(&header)?)?;
        Ok(recorder)
    }

    /// Recorder for `recording.path`, or `None` when recording is off.
    pub fn from_config(
        config: &BridgeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Option<Self>, BridgeError> {
        config
            .recording
            .path
            .as_ref()
            .map(|path| Self::create(path, clock, config.devtools.store_mutations))
            .transpose()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_outbound(&self, message: &str) -> Result<(), BridgeError> {
        self.record_envelope("outbound", message)
    }

    /// A message the live bridge dropped from its backlog. Offline replay
    /// still needs the mutations it carried.
    pub fn record_evicted(&self, message: &str) -> Result<(), BridgeError> {
        self.record_envelope("evicted", message)
    }

    fn record_envelope(&self, kind: &'static str, message: &str) -> Result<(), BridgeError> {
        let raw: &RawValue = serde_json::from_str(message)
            .map_err(|e| BridgeError::Recording(format!("{kind} message is not json: {e}")))?;
        let line = to_line(&OutboundLine {
            kind,
            seq: self.next_seq(),
            timestamp_ms: self.clock.now_unix_ms(),
            message: raw,
        })?;
        self.write_line(&line)
    }

    pub fn record_inbound(&self, raw: &str) -> Result<(), BridgeError> {
        let signal = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        let entry = RecordEntry::Inbound(InboundRecord {
            seq: self.next_seq(),
            timestamp_ms: self.clock.now_unix_ms(),
            signal,
        });
        self.write_line(&to_line(&entry)?)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn write_line(&self, line: &str) -> Result<(), BridgeError> {
        let _guard = self.write_lock.lock().expect("recorder write lock");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BridgeError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| BridgeError::Io(e.to_string()))
    }
}

fn to_line<T: serde::Serialize>(entry: &T) -> Result<String, BridgeError> {
    serde_json::to_string(entry).map_err(|e| BridgeError::Serialization(e.to_string()))
}

// ── RecordingChannel ──────────────────────────────────────────────────────────

/// Wraps any `MessageChannel`, recording every delivered envelope, every
/// envelope evicted before delivery and every received signal.
pub struct RecordingChannel<C> {
    inner: C,
    recorder: Arc<SessionRecorder>,
}

impl<C: MessageChannel> RecordingChannel<C> {
    pub fn new(inner: C, recorder: Arc<SessionRecorder>) -> Self {
        Self { inner, recorder }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: MessageChannel> MessageChannel for RecordingChannel<C> {
    fn send(&self, message: &str) -> Result<(), BridgeError> {
        self.inner.send(message)?;
        if let Err(err) = self.recorder.record_outbound(message) {
            warn_recording_failed("outbound", &err);
        }
        Ok(())
    }

    fn try_recv(&self) -> Option<String> {
        let raw = self.inner.try_recv()?;
        if let Err(err) = self.recorder.record_inbound(&raw) {
            warn_recording_failed("inbound", &err);
        }
        Some(raw)
    }

    fn discarded(&self, message: &str) {
        self.inner.discarded(message);
        if let Err(err) = self.recorder.record_evicted(message) {
            warn_recording_failed("evicted", &err);
        }
    }
}

fn warn_recording_failed(direction: &str, err: &BridgeError) {
    append_run_log(
        "warn",
        "devtools.recording.write_failed",
        json!({
            "direction": direction,
            "error": err.to_string(),
        }),
    );
}
