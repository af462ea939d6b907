use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Broad classification of a failure, used by callers to decide whether to
/// halt a build or (for I/O) try again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
    Integrity,
    Security,
}

#[derive(Error, Debug, Clone)]
pub enum DepsError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse manifest '{path}': {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Dependency '{name}' has no SHA for os and arch '{platform}'")]
    MissingPlatformDigest { name: String, platform: String },

    #[error("Unknown file extension: {0}")]
    UnknownExtension(String),

    #[error("Invalid template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("Didn't find a dependency named '{0}'")]
    NotFound(String),

    // I/O errors
    #[error("Failed to {action} '{path}': {source}")]
    Io {
        action: String,
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Archive '{path}' is unreadable: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Command '{program}' failed: {reason}")]
    Command { program: String, reason: String },

    #[error("Installation of '{0}' was interrupted")]
    Interrupted(String),

    // Integrity errors
    #[error("Expected SHA256 for file '{path}' to be '{expected}', not '{actual}'")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // Security errors
    #[error("{0}: illegal file path")]
    IllegalPath(String),

    #[error("Can't handle files larger than {limit} bytes: '{entry}' is {size} bytes")]
    FileTooLarge { entry: String, size: u64, limit: u64 },

    #[error("Failed to {operation} dependency '{name}': {source}")]
    Procurement {
        name: String,
        operation: &'static str,
        #[source]
        source: Box<DepsError>,
    },
}

impl DepsError {
    pub fn io(action: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DepsError::Io {
            action: action.into(),
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn procurement(name: &str, operation: &'static str, source: DepsError) -> Self {
        DepsError::Procurement {
            name: name.to_string(),
            operation,
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DepsError::Config(_)
            | DepsError::Manifest { .. }
            | DepsError::MissingPlatformDigest { .. }
            | DepsError::UnknownExtension(_)
            | DepsError::Template { .. }
            | DepsError::NotFound(_) => ErrorKind::Configuration,
            DepsError::Io { .. }
            | DepsError::Download { .. }
            | DepsError::Archive { .. }
            | DepsError::Command { .. }
            | DepsError::Interrupted(_) => ErrorKind::Io,
            DepsError::DigestMismatch { .. } => ErrorKind::Integrity,
            DepsError::IllegalPath(_) | DepsError::FileTooLarge { .. } => ErrorKind::Security,
            DepsError::Procurement { source, .. } => source.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DepsError>;
