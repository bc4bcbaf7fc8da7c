use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpaperError {
    #[error("Failed to fetch source PDF: {0}")]
    SourceFetch(String),

    #[error("Malformed PDF document: {0}")]
    MalformedDocument(String),

    #[error("PDF serialization failed: {0}")]
    Serialization(String),

    #[error("No PDF is available for edition {0}")]
    DownloadUnavailable(String),

    #[error("{0}")]
    Validation(String),

    #[error("Session storage error: {0}")]
    SessionStorage(String),

    #[error("Failed to save download: {0}")]
    Sink(String),

    #[error("Invalid seed data: {0}")]
    Seed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EpaperError {
    /// True for the two failures a download can hit after the asset exists.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            EpaperError::SourceFetch(_)
                | EpaperError::MalformedDocument(_)
                | EpaperError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EpaperError>;
