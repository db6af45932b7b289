use thiserror::Error;
use tracing::{error, warn};

/// Reasons a single image URL could not be turned into a local artifact.
///
/// These never abort a rewrite; the rewriter turns each one into a visible
/// failure marker for the URL that caused it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("URL blocked by security policy: {0}")]
    Blocked(String),

    #[error("Image too large: {size} bytes (limit {limit})")]
    Oversize { size: u64, limit: u64 },

    #[error("Wrong content type: {0}")]
    WrongContentType(String),

    #[error("http status {0}")]
    HttpError(u16),

    #[error("timeout")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("write/verify error: {0}")]
    WriteError(String),
}

impl FetchError {
    /// Rejections are decided by policy before or instead of a download;
    /// everything else is a failure of the transfer itself.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FetchError::MalformedUrl(_)
                | FetchError::UnsupportedExtension(_)
                | FetchError::Blocked(_)
                | FetchError::Oversize { .. }
                | FetchError::WrongContentType(_)
        )
    }

    pub fn log(&self) {
        match self {
            FetchError::MalformedUrl(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            FetchError::UnsupportedExtension(ext) => {
                warn!(extension = %ext, "Unsupported image extension");
            }
            FetchError::Blocked(reason) => {
                warn!(reason = %reason, "URL blocked before fetch");
            }
            FetchError::Oversize { size, limit } => {
                warn!(size = size, limit = limit, "Image exceeds size limit");
            }
            FetchError::WrongContentType(ct) => {
                warn!(content_type = %ct, "Non-image content type received");
            }
            FetchError::HttpError(status) => {
                error!(status = status, "Image download returned error status");
            }
            FetchError::Timeout => {
                error!("Image download timed out");
            }
            FetchError::NetworkError(e) => {
                error!(error = %e, "Image download failed");
            }
            FetchError::WriteError(e) => {
                error!(error = %e, "Image file write or verification failed");
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::HttpError(status.as_u16())
        } else {
            FetchError::NetworkError(e.to_string())
        }
    }
}

/// Faults raised while building or wiring the cleaner, never per message.
#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("URL boundary pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
