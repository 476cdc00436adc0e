use thiserror::Error;

/// Template rendering failures. Each carries the offending name so the
/// operator can fix the template or the spreadsheet column it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("field not found in data: {0}")]
    MissingField(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("malformed operation: {0}")]
    MalformedOperation(String),
}

/// Top-level error taxonomy. `NetworkUnavailable` and `LockedFile` are the
/// only retryable kinds; everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum FilerError {
    #[error("network path is not available: {0}")]
    NetworkUnavailable(String),
    #[error("could not load spreadsheet: {0}")]
    Load(String),
    #[error("no row matches the selected filter values: {0}")]
    NotFound(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("source PDF no longer exists: {0}")]
    SourceMissing(String),
    #[error("file is locked by another process: {0}")]
    LockedFile(String),
    #[error("relocation failed: {0}")]
    Relocation(String),
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("could not save configuration: {0}")]
    Config(String),
    #[error("history database error: {0}")]
    Db(String),
}

impl FilerError {
    /// Retryable errors get bounded exponential backoff; the rest fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FilerError::NetworkUnavailable(_) | FilerError::LockedFile(_))
    }
}

impl From<std::io::Error> for FilerError {
    fn from(e: std::io::Error) -> Self {
        // Windows reports a file held open by another process as PermissionDenied.
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            FilerError::LockedFile(e.to_string())
        } else {
            FilerError::Relocation(e.to_string())
        }
    }
}
