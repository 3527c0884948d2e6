use crate::errors::BridgeError;
use crate::logging::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_LOG_PAYLOAD_BYTES: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub store_mutations: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    pub devtools: DevtoolsConfig,
    pub backlog: BacklogConfig,
    pub logging: LoggingConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DevtoolsConfig {
    pub store_mutations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BacklogConfig {
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    pub path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            devtools: DevtoolsConfig {
                store_mutations: true,
            },
            backlog: BacklogConfig { max_entries: None },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            },
            recording: RecordingConfig { path: None },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialBridgeConfig {
    devtools: Option<PartialDevtoolsConfig>,
    backlog: Option<PartialBacklogConfig>,
    logging: Option<PartialLoggingConfig>,
    recording: Option<PartialRecordingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDevtoolsConfig {
    store_mutations: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialBacklogConfig {
    max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecordingConfig {
    path: Option<PathBuf>,
}

/// Defaults, then the TOML file (if any), then CLI overrides. Relative paths
/// in the file resolve against `base_dir`.
pub fn load_config(
    overrides: &CliOverrides,
    base_dir: &Path,
    fs: &dyn FileSystem,
) -> Result<BridgeConfig, BridgeError> {
    let mut cfg = BridgeConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        cfg = parse_config(&file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    absolutize_paths(&mut cfg, base_dir);
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn parse_config(text: &str) -> Result<BridgeConfig, BridgeError> {
    let partial: PartialBridgeConfig =
        toml::from_str(text).map_err(|e| BridgeError::ConfigParse(e.to_string()))?;
    let mut cfg = BridgeConfig::default();
    merge_partial_config(&mut cfg, partial);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut BridgeConfig, partial: PartialBridgeConfig) {
    if let Some(devtools) = partial.devtools {
        if let Some(store_mutations) = devtools.store_mutations {
            cfg.devtools.store_mutations = store_mutations;
        }
    }

    if let Some(backlog) = partial.backlog {
        cfg.backlog.max_entries = backlog.max_entries;
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }

    if let Some(recording) = partial.recording {
        cfg.recording.path = recording.path;
    }
}

fn apply_cli_overrides(cfg: &mut BridgeConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.log_file {
        cfg.logging.path = Some(path.clone());
    }
    if let Some(store_mutations) = overrides.store_mutations {
        cfg.devtools.store_mutations = store_mutations;
    }
}

fn absolutize_paths(cfg: &mut BridgeConfig, base: &Path) {
    for slot in [&mut cfg.logging.path, &mut cfg.recording.path] {
        if let Some(path) = slot.as_mut() {
            if !path.is_absolute() {
                *path = base.join(&*path);
            }
        }
    }
}

fn validate_config(cfg: &BridgeConfig) -> Result<(), BridgeError> {
    if cfg.backlog.max_entries == Some(0) {
        return Err(BridgeError::InvalidConfig(
            "backlog.max_entries must be greater than zero when set".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes < MIN_LOG_PAYLOAD_BYTES {
        return Err(BridgeError::InvalidConfig(format!(
            "logging.max_payload_bytes must be at least {MIN_LOG_PAYLOAD_BYTES}"
        )));
    }

    Ok(())
}
