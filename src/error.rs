use thiserror::Error;

/// Central error type for the track-splitter-core crate.
///
/// A busy separation lock and a catalog miss are not errors; they are
/// reported as [`crate::JobStatus::Busy`] and [`crate::StemLookup::Missing`].
#[derive(Debug, Error)]
pub enum SplitterError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    /// The external decoding tool could not be installed or located.
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// The external separation process failed.
    #[error("Separation error: {0}")]
    Separation(String),

    /// A single stem could not be decoded or reported no duration.
    #[error("Track `{track}` failed to load: {reason}")]
    TrackLoad { track: String, reason: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fetch error: {0}")]
    Fetch(String),
}

impl SplitterError {
    /// No failure is retried automatically; the user retries by hand.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for SplitterError {
    fn from(e: std::io::Error) -> Self {
        SplitterError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for SplitterError {
    fn from(e: serde_json::Error) -> Self {
        SplitterError::Anyhow(e.into())
    }
}

impl From<reqwest::Error> for SplitterError {
    fn from(e: reqwest::Error) -> Self {
        SplitterError::Anyhow(e.into())
    }
}

impl From<hex::FromHexError> for SplitterError {
    fn from(e: hex::FromHexError) -> Self {
        SplitterError::Anyhow(e.into())
    }
}

impl From<symphonia::core::errors::Error> for SplitterError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        SplitterError::Anyhow(e.into())
    }
}

impl From<walkdir::Error> for SplitterError {
    fn from(e: walkdir::Error) -> Self {
        SplitterError::Anyhow(e.into())
    }
}

pub type Result<T> = std::result::Result<T, SplitterError>;
