//! Error types for the coordination failure detector
//!
//! Detection findings are never errors; these cover the cases where no
//! analysis can be produced at all, and detector construction failures.

use thiserror::Error;

/// Main error type for detector operations
#[derive(Error, Debug)]
pub enum DetectorError {
    /// The trace has no root span, so there is nothing to analyze
    #[error("No analysis possible: trace has no root span")]
    NoRoot,

    /// Config file access error
    #[error("File error: {0}")]
    FileError(String),

    /// Config or trace parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Unsupported config file format
    #[error("Unsupported file format: {0}. Supported formats: json, yaml, yml, toml")]
    UnsupportedFormat(String),

    /// Config values out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A configured pattern failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl DetectorError {
    /// Create a parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        DetectorError::ParseError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        !matches!(self, DetectorError::NoRoot)
    }
}

impl From<std::io::Error> for DetectorError {
    fn from(err: std::io::Error) -> Self {
        DetectorError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for DetectorError {
    fn from(err: serde_json::Error) -> Self {
        DetectorError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for DetectorError {
    fn from(err: serde_yaml::Error) -> Self {
        DetectorError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for DetectorError {
    fn from(err: toml::de::Error) -> Self {
        DetectorError::ParseError(format!("TOML error: {}", err))
    }
}

/// Result type alias for detector operations
pub type Result<T> = std::result::Result<T, DetectorError>;
