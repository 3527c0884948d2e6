use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("mutation error: {0}")]
    Mutation(String),
    #[error("recording error: {0}")]
    Recording(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("devtools already initialized")]
    AlreadyInitialized,
}
