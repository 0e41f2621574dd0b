use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Bridge(#[from] compsoc_identity::BridgeError),

    #[error("Directory error: {0}")]
    Directory(#[from] compsoc_directory::DirectoryError),

    #[error("Token error: {0}")]
    Token(#[from] compsoc_token::TokenError),

    #[error("Configuration error: {0}")]
    Config(#[from] compsoc_config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No configuration found; pass --config or set COMPSOC_CONFIG")]
    NoConfig,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
