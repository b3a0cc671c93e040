use thiserror::Error;

/// Failures surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Source unreachable: {0}")]
    Network(String),

    #[error("Source returned unexpected data: {0}")]
    Parse(String),

    #[error("A file named '{0}' already exists, download stopped")]
    ConflictBlocked(String),

    #[error("Download engine is not running and could not be restarted")]
    EngineUnreachable,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
