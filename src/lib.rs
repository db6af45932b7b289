//! Rewrites outgoing chat-bot messages for transports that will not render
//! image links: image URLs are downloaded and sent as attached images, other
//! URLs are passed through or blocked by policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod artifacts;
mod classifier;
mod config;
mod error;
mod fetcher;
mod logging;
mod rewriter;
mod scanner;
mod security;
mod service;
mod utils;

pub use artifacts::{TempArtifact, TempArtifacts, DEFAULT_TEMP_DIR};
pub use classifier::{classify, url_extension, Classification};
pub use config::{ConfigHandle, RewriterConfig, DEFAULT_IMAGE_EXTENSIONS, DEFAULT_USER_AGENT};
pub use error::{CleanerError, FetchError};
pub use fetcher::{FetchOutcome, FetchedImage, ImageFetcher, MAX_CONCURRENT_FETCHES, MAX_REDIRECTS};
pub use logging::{failure_card_level, log_fetch_failure_card};
#[cfg(feature = "logging")]
pub use logging::{setup_logging, LogConfig, LogLevelGuard};
pub use rewriter::MessageRewriter;
pub use scanner::{UrlMatch, UrlScanner, FALLBACK_PATTERN, URL_BOUNDARY_CHARS};
pub use security::{UrlValidationConfig, UrlValidator};
pub use service::{ServiceConfig, UrlCleanerService};

/// Reference to an image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub path: PathBuf,
}

/// One element of an outgoing message.
///
/// Only `Text` is inspected; everything else is passed through as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageSegment {
    Text(String),
    Media(MediaRef),
    Other(serde_json::Value),
}

impl MessageSegment {
    pub fn text(content: impl Into<String>) -> Self {
        MessageSegment::Text(content.into())
    }

    pub fn media(path: impl Into<PathBuf>) -> Self {
        MessageSegment::Media(MediaRef { path: path.into() })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageSegment::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Downloads one classified image URL into a local file.
///
/// Implementations must not leave a file behind for any outcome other than
/// [`FetchOutcome::Success`].
#[async_trait]
pub trait ImageFetch: Send + Sync {
    async fn fetch(&self, url: &str, config: &RewriterConfig) -> FetchOutcome;
}
