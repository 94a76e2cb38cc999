use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing API access key (set {0})")]
    MissingAccessKey(&'static str),

    #[error("failed to read identifier list at {path}: {message}")]
    EntitySource { path: PathBuf, message: String },

    #[error("identifier column `{0}` not found in identifier list")]
    MissingColumn(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("concurrency limiter closed")]
    LimiterClosed,}
