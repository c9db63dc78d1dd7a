//! Error types for scan-worker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Job row is missing a field required to process it
    #[error("{0}")]
    InvalidJob(String),

    #[error("{context}: {source}")]
    TransferError {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context} failed with HTTP status {status}")]
    HttpStatusError { context: String, status: u16 },

    #[error("Storage API error: {0}")]
    StorageError(String),

    #[error("STL upload verification failed: {file} not found in {bucket}")]
    UploadVerification { file: String, bucket: String },

    #[error("pipeline exited with code {0}")]
    PipelineExit(i32),

    #[error("pipeline timed out after {0} s")]
    PipelineTimeout(u64),

    #[error("mesh conversion exited with code {code}{detail}")]
    ConversionExit { code: i32, detail: String },

    #[error("{0} not created")]
    MissingArtifact(String),

    #[error("Failed to start {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid zip bundle: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Background task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("File system error: {0}")]
    FsError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
