//! Error types for sf-jobs.
//!
//! Every kind has a stable machine-readable [`ErrorKind::name`] so scripts
//! consuming `--json` output can branch on it.

use std::path::PathBuf;

use crate::tracking::Conflict;

/// Result type alias for sf-jobs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for job lifecycle operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Stable name of the error kind.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Structured payload attached to the error, if any.
    pub fn data(&self) -> Option<serde_json::Value> {
        match &self.kind {
            ErrorKind::SourceConflict(conflicts) => serde_json::to_value(conflicts).ok(),
            ErrorKind::InvalidStashFile { quarantined, .. } => Some(serde_json::json!({
                "quarantinedPath": quarantined.display().to_string(),
            })),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("{} conflict(s) detected between local and remote changes", .0.len())]
    SourceConflict(Vec<Conflict>),

    #[error("Stash file {} is corrupt and was moved to {}", path.display(), quarantined.display())]
    InvalidStashFile { path: PathBuf, quarantined: PathBuf },

    #[error("Cancel failed: {0}")]
    CancelFailed(String),

    #[error("No job ID given and none stashed for {0}")]
    MissingJobId(String),

    #[error("No components found: {0}")]
    NoComponentsFound(String),

    #[error("Metadata API error: {0}")]
    MetadataApi(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Polling aborted: {0}")]
    PollAborted(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Zip error: {0}")]
    Zip(String),
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::SourceConflict(_) => "SourceConflictError",
            ErrorKind::InvalidStashFile { .. } => "InvalidStashFile",
            ErrorKind::CancelFailed(_) => "CancelFailed",
            ErrorKind::MissingJobId(_) => "MissingJobId",
            ErrorKind::NoComponentsFound(_) => "NoComponentsFound",
            ErrorKind::MetadataApi(_) => "MetadataApiError",
            ErrorKind::Tracking(_) => "TrackingError",
            ErrorKind::InvalidInput(_) => "InvalidInputError",
            ErrorKind::PollAborted(_) => "PollAbortedError",
            ErrorKind::Io(_) => "IoError",
            ErrorKind::Json(_) => "JsonError",
            ErrorKind::Zip(_) => "ZipError",
        }
    }
}

impl From<busbar_sf_metadata::Error> for Error {
    fn from(err: busbar_sf_metadata::Error) -> Self {
        Error::with_source(ErrorKind::MetadataApi(err.kind.to_string()), err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::with_source(ErrorKind::Zip(err.to_string()), err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}
