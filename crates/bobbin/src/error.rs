use bobbin_thread::ThreadError;

use crate::config::SizeParseError;

#[derive(Debug, thiserror::Error)]
pub enum BobbinError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Size(#[from] SizeParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}

pub type BobbinResult<T> = Result<T, BobbinError>;
