//! The bridge between an instrumented application and the debugger.
//!
//! The debugger may be open before the application starts or be opened
//! later, so the handshake works from both sides:
//!
//! 1. Debugger already open: bridge sends `ping`, debugger answers `pong`,
//!    bridge sends `init`.
//! 2. Debugger opened later: debugger sends `ping`, bridge sends `init`.
//!
//! Until one of those happens every `execution` message is kept in the
//! backlog, which is flushed in order right after `init`.

use crate::backlog::Backlog;
use crate::channel::MessageChannel;
use crate::config::BridgeConfig;
use crate::connection::{Connection, ConnectionState, HandshakeOutcome, HandshakeSignal};
use crate::encoder::encode_step;
use crate::errors::BridgeError;
use crate::host::{ExecutionContext, FunctionDetails, HostController};
use crate::logging::append_run_log;
use crate::mutation_log::MutationLog;
use crate::protocol::{encode_init, encode_ping, DebuggerSignal, EmbeddedJson, ExecutionId};
use crate::remember::{remember, ReplayReport};
use crate::snapshot::Snapshot;
use serde_json::{json, Value};

pub const TIME_TRAVEL_DISABLED_WARNING: &str =
    "Devtools - You tried to time travel, but you have turned off storing of mutations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevtoolsOptions {
    pub store_mutations: bool,
    pub max_backlog: Option<usize>,
}

impl Default for DevtoolsOptions {
    fn default() -> Self {
        Self {
            store_mutations: true,
            max_backlog: None,
        }
    }
}

impl From<&BridgeConfig> for DevtoolsOptions {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            store_mutations: cfg.devtools.store_mutations,
            max_backlog: cfg.backlog.max_entries,
        }
    }
}

pub struct Devtools<C: MessageChannel> {
    options: DevtoolsOptions,
    channel: C,
    connection: Connection,
    backlog: Backlog,
    mutations: MutationLog,
    snapshot: Option<Snapshot>,
    initial_model: Option<Value>,
    initialized: bool,
}

impl<C: MessageChannel> Devtools<C> {
    pub fn new(options: DevtoolsOptions, channel: C) -> Self {
        Self {
            options,
            channel,
            connection: Connection::default(),
            backlog: Backlog::new(options.max_backlog),
            mutations: MutationLog::new(),
            snapshot: None,
            initial_model: None,
            initialized: false,
        }
    }

    /// Wire the bridge to the host. Must run once, after the host model is
    /// populated and before any mutation.
    pub fn init(&mut self, host: &mut dyn HostController) -> Result<(), BridgeError> {
        if self.initialized {
            return Err(BridgeError::AlreadyInitialized);
        }
        let model = host.state().get();
        if self.options.store_mutations {
            let snapshot = Snapshot::capture(&model)?;
            append_run_log(
                "debug",
                "devtools.snapshot.captured",
                json!({
                    "fingerprint": snapshot.fingerprint(),
                    "bytes": snapshot.as_str().len(),
                }),
            );
            self.snapshot = Some(snapshot);
        }
        self.initial_model = Some(model);
        self.initialized = true;

        self.channel.send(&encode_ping())?;
        append_run_log(
            "info",
            "devtools.handshake.ping_sent",
            json!({"store_mutations": self.options.store_mutations}),
        );
        Ok(())
    }

    /// Report one function-tree step. Mutations are logged whether or not a
    /// debugger is attached yet.
    pub fn send(
        &mut self,
        debugging_data: Option<&Value>,
        context: &ExecutionContext,
        function: FunctionDetails,
        payload: &Value,
    ) -> Result<(), BridgeError> {
        let step = encode_step(
            self.options.store_mutations,
            debugging_data,
            context,
            function,
            payload,
        )?;
        if let Some(mutation) = step.mutation {
            self.mutations.append(mutation);
        }
        self.dispatch(step.message)
    }

    pub fn handle_signal(
        &mut self,
        host: &mut dyn HostController,
        signal: DebuggerSignal,
    ) -> Result<Option<ReplayReport>, BridgeError> {
        if !self.initialized {
            append_run_log(
                "debug",
                "devtools.signal.before_init",
                json!({"signal": signal.name()}),
            );
            return Ok(None);
        }
        match signal {
            DebuggerSignal::Ping => self.on_handshake(HandshakeSignal::Ping).map(|_| None),
            DebuggerSignal::Pong => self.on_handshake(HandshakeSignal::Pong).map(|_| None),
            DebuggerSignal::Remember(execution_id) => {
                self.remember(host, &execution_id).map(Some)
            }
        }
    }

    /// Handle every signal waiting on the channel. Malformed signals and
    /// signals whose handling fails are logged and dropped. Returns how many
    /// signals were handled successfully.
    pub fn poll(&mut self, host: &mut dyn HostController) -> Result<usize, BridgeError> {
        let mut handled = 0;
        while let Some(raw) = self.channel.try_recv() {
            match DebuggerSignal::parse(&raw) {
                Ok(signal) => {
                    let name = signal.name();
                    match self.handle_signal(host, signal) {
                        Ok(_) => handled += 1,
                        Err(err) => append_run_log(
                            "warn",
                            "devtools.signal.failed",
                            json!({"signal": name, "error": err.to_string()}),
                        ),
                    }
                }
                Err(err) => append_run_log(
                    "warn",
                    "devtools.signal.rejected",
                    json!({"error": err.to_string()}),
                ),
            }
        }
        Ok(handled)
    }

    /// Time travel to the state right after `execution_id`, then ask the host
    /// to re-render everything.
    pub fn remember(
        &mut self,
        host: &mut dyn HostController,
        execution_id: &ExecutionId,
    ) -> Result<ReplayReport, BridgeError> {
        if !self.options.store_mutations {
            host.warn(TIME_TRAVEL_DISABLED_WARNING);
            append_run_log(
                "warn",
                "devtools.remember.mutations_disabled",
                json!({"execution_id": execution_id.as_str()}),
            );
        }
        let report = remember(
            self.snapshot.as_ref(),
            &self.mutations,
            host.state(),
            execution_id,
        )?;
        host.emit("flush", json!({}), true);
        append_run_log(
            "info",
            "devtools.remember.completed",
            json!({
                "execution_id": execution_id.as_str(),
                "cutoff": report.cutoff,
                "replayed": report.replayed,
                "skipped": report.skipped.len(),
            }),
        );
        Ok(report)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn mutations(&self) -> &MutationLog {
        &self.mutations
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn dispatch(&mut self, message: String) -> Result<(), BridgeError> {
        if self.connection.is_connected() {
            return self.channel.send(&message);
        }
        if let Some(evicted) = self.backlog.push(message) {
            self.channel.discarded(&evicted);
            append_run_log(
                "warn",
                "devtools.backlog.evicted",
                json!({
                    "max_entries": self.options.max_backlog,
                    "dropped": self.backlog.dropped(),
                }),
            );
        }
        Ok(())
    }

    fn on_handshake(&mut self, signal: HandshakeSignal) -> Result<(), BridgeError> {
        match self.connection.on_handshake(signal) {
            HandshakeOutcome::Connected => {
                append_run_log(
                    "info",
                    "devtools.handshake.connected",
                    json!({"via": signal.as_str()}),
                );
                self.send_initial()
            }
            HandshakeOutcome::AlreadyConnected => {
                append_run_log(
                    "debug",
                    "devtools.handshake.redundant",
                    json!({
                        "via": signal.as_str(),
                        "redundant_signals": self.connection.redundant_signals,
                    }),
                );
                Ok(())
            }
        }
    }

    fn send_initial(&mut self) -> Result<(), BridgeError> {
        let initial_model = match &self.snapshot {
            Some(snapshot) => snapshot.embedded(),
            None => EmbeddedJson::Structured(self.initial_model.clone().unwrap_or(Value::Null)),
        };
        let mut first_error = self.channel.send(&encode_init(&initial_model)?).err();

        let drained = self.backlog.drain();
        let total = drained.messages.len();
        let mut failed = 0usize;
        for message in drained.messages {
            if let Err(err) = self.channel.send(&message) {
                failed += 1;
                first_error.get_or_insert(err);
            }
        }
        append_run_log(
            if failed == 0 && drained.dropped == 0 { "info" } else { "warn" },
            "devtools.backlog.flushed",
            json!({
                "messages": total,
                "failed": failed,
                "dropped": drained.dropped,
            }),
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
