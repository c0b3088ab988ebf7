//! Error types for the mapping engine.

use thiserror::Error;

/// Mapper error type.
#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_yaml::Error> for MapperError {
    fn from(e: serde_yaml::Error) -> Self {
        MapperError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
