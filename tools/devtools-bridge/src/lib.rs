pub mod backlog;
pub mod channel;
pub mod config;
pub mod connection;
pub mod devtools;
pub mod encoder;
pub mod errors;
pub mod host;
pub mod logging;
pub mod mutation_log;
pub mod protocol;
pub mod remember;
pub mod replay;
pub mod runtime;
pub mod snapshot;
pub mod state;

use clap::{error::ErrorKind, Parser};
use config::{load_config, CliOverrides};
use errors::BridgeError;
use logging::{append_run_log, init_run_logger, JsonlLogger};
use protocol::ExecutionId;
use replay::replayer::SessionRecording;
use runtime::ProductionRuntime;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "devtools-bridge")]
#[command(about = "Inspect and time-travel recorded devtools sessions")]
pub struct Cli {
    /// Session recording to read. Falls back to `recording.path` from the config.
    #[arg(long)]
    pub recording: Option<PathBuf>,
    /// List the executions found in the recording.
    #[arg(long, default_value_t = false)]
    pub executions: bool,
    /// Print the model as it was right after this execution.
    #[arg(long)]
    pub remember: Option<String>,
    /// Write the remembered model to this file instead of stdout.
    #[arg(long, requires = "remember")]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub fn run() -> Result<i32, BridgeError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| BridgeError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, BridgeError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                runtime.terminal.write_line(error.to_string().trim_end())?;
                return Ok(0);
            }
            _ => return Err(BridgeError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.as_ref().map(|path| absolutize(cwd, path)),
        log_file: cli.log_file.as_ref().map(|path| absolutize(cwd, path)),
        store_mutations: None,
    };
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
    if let Some(path) = &cfg.logging.path {
        init_run_logger(JsonlLogger {
            path: path.clone(),
            max_payload_bytes: cfg.logging.max_payload_bytes,
        });
    }

    let recording_path = cli
        .recording
        .as_ref()
        .map(|path| absolutize(cwd, path))
        .or_else(|| cfg.recording.path.clone())
        .ok_or_else(|| {
            BridgeError::Cli("--recording <path> is required (or set recording.path)".to_string())
        })?;
    let contents = runtime.file_system.read_to_string(&recording_path)?;
    let session = SessionRecording::parse(&contents)?;
    let evicted = session.evicted_messages().count();
    append_run_log(
        "info",
        "devtools.recording.loaded",
        json!({
            "path": recording_path.display().to_string(),
            "entries": session.entries.len(),
            "evicted": evicted,
            "store_mutations": session.header.store_mutations,
            "age_ms": runtime
                .clock
                .now_unix_ms()
                .saturating_sub(session.header.recorded_at_unix_ms),
        }),
    );

    let terminal = runtime.terminal.as_ref();
    if cli.executions {
        for summary in session.executions()? {
            terminal.write_line(&format!(
                "{}\t{}\tsteps={}\tmutations={}",
                summary.execution_id, summary.name, summary.steps, summary.mutations
            ))?;
        }
    }

    if let Some(id) = &cli.remember {
        let execution_id = ExecutionId::new(id.clone());
        let (model, report) = session.remember(&execution_id)?;
        for skipped in &report.skipped {
            terminal.warn_line(&format!(
                "skipped mutation #{} ({}): {}",
                skipped.index, skipped.method, skipped.reason
            ))?;
        }
        if report.cutoff.is_none() {
            terminal.warn_line(&format!(
                "execution {execution_id} made no recorded mutations; showing the initial model"
            ))?;
        }
        let rendered = serde_json::to_string_pretty(&model)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        match &cli.output {
            Some(path) => {
                let path = absolutize(cwd, path);
                runtime.file_system.write_string(&path, &format!("{rendered}\n"))?;
                terminal.write_line(&format!("wrote {}", path.display()))?;
            }
            None => terminal.write_line(&rendered)?,
        }
        append_run_log(
            "info",
            "devtools.remember.offline",
            json!({
                "execution_id": execution_id.as_str(),
                "replayed": report.replayed,
                "skipped": report.skipped.len(),
            }),
        );
    }

    if !cli.executions && cli.remember.is_none() {
        let executions = session.executions()?.len();
        let fingerprint = session
            .snapshot_fingerprint()
            .unwrap_or_else(|_| "unavailable".to_string());
        terminal.write_line(&format!(
            "recording {} (protocol {}, bridge {}): {executions} executions, snapshot {fingerprint}",
            recording_path.display(),
            session.header.protocol_version,
            session.header.bridge_version,
        ))?;
        if evicted > 0 {
            terminal.warn_line(&format!(
                "{evicted} messages were evicted from the backlog before the debugger connected"
            ))?;
        }
    }

    Ok(0)
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
