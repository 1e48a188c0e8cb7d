//! Error types for the agentdog CLI

use thiserror::Error;

use agentdog_detector::DetectorError;

use crate::ExitCode;

/// Main error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Trace or config parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failure raised by the detector
    #[error(transparent)]
    Detector(#[from] DetectorError),

    /// Serialization error while rendering output
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CliError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    /// Create a file error
    pub fn file_error(msg: impl Into<String>) -> Self {
        CliError::FileError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        match self {
            CliError::InvalidInput(_) | CliError::FileError(_) | CliError::ParseError(_) => true,
            CliError::Detector(err) => err.is_user_error(),
            CliError::SerializationError(_) => false,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::FileError(_) | CliError::Detector(DetectorError::FileError(_)) => ExitCode::FileError,
            CliError::Detector(DetectorError::NoRoot) => ExitCode::NoAnalysis,
            err if err.is_user_error() => ExitCode::InvalidInput,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::ParseError(format!("YAML error: {}", err))
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
