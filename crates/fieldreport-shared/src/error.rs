use thiserror::Error;

/// User-facing failure taxonomy of the report flows.
///
/// Lower layers (`StoreError`, `NetError`) are mapped into one of these at the
/// call site, where the operation that failed is known.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Could not load reports: {0}")]
    Fetch(String),

    #[error("Could not save report: {0}")]
    Insert(String),

    #[error("Could not upload image: {0}")]
    Upload(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl ReportError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short title for the one-shot alert shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            ReportError::NotAuthenticated => "Sign in required",
            ReportError::Validation(_) => "Check your report",
            ReportError::Fetch(_) => "Loading failed",
            ReportError::Insert(_) => "Submission failed",
            ReportError::Upload(_) => "Upload failed",
            ReportError::PermissionDenied(_) => "Permission needed",
        }
    }
}
