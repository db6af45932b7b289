use crate::error::CleanerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 8] =
    ["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "ico"];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) \
    Chrome/91.0.4472.124 Safari/537.36";

/// Policy for one rewrite call.
///
/// Treated as immutable while a rewrite runs. Reconfiguration goes through
/// [`ConfigHandle`], which swaps in a whole new value.
///
/// # Examples
/// ```
/// use url_cleaner::RewriterConfig;
///
/// let config = RewriterConfig::default()
///     .with_block_non_image_urls(false)
///     .with_max_file_size_bytes(2 * 1024 * 1024);
/// assert!(config.is_allowed_extension("PNG"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    /// Replace or drop URLs that do not point at images
    pub block_non_image_urls: bool,
    /// Emit `blocked_replacement_text` where a URL was blocked
    pub show_blocked_message: bool,
    pub blocked_replacement_text: String,
    /// Label inside the marker for a failed download: `[<label>: <url>]`
    pub failed_marker_label: String,
    pub max_file_size_bytes: u64,
    pub fetch_timeout_seconds: u64,
    pub cleanup_delay_seconds: u64,
    /// Extensions without the leading dot; compared case-insensitively
    pub allowed_extensions: HashSet<String>,
    pub user_agent: String,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            block_non_image_urls: true,
            show_blocked_message: true,
            blocked_replacement_text: "[链接已屏蔽]".to_string(),
            failed_marker_label: "图片下载失败".to_string(),
            max_file_size_bytes: 10 * 1024 * 1024, // 10MB
            fetch_timeout_seconds: 30,
            cleanup_delay_seconds: 60,
            allowed_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RewriterConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, CleanerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_seconds)
    }

    /// Text emitted in place of an image URL that could not be downloaded.
    pub fn failed_marker(&self, url: &str) -> String {
        format!("[{}: {}]", self.failed_marker_label, url)
    }

    pub fn with_block_non_image_urls(mut self, block: bool) -> Self {
        self.block_non_image_urls = block;
        self
    }

    pub fn with_show_blocked_message(mut self, show: bool) -> Self {
        self.show_blocked_message = show;
        self
    }

    pub fn with_blocked_replacement_text(mut self, text: impl Into<String>) -> Self {
        self.blocked_replacement_text = text.into();
        self
    }

    pub fn with_failed_marker_label(mut self, label: impl Into<String>) -> Self {
        self.failed_marker_label = label.into();
        self
    }

    pub fn with_max_file_size_bytes(mut self, max: u64) -> Self {
        self.max_file_size_bytes = max;
        self
    }

    pub fn with_fetch_timeout_seconds(mut self, seconds: u64) -> Self {
        self.fetch_timeout_seconds = seconds;
        self
    }

    pub fn with_cleanup_delay_seconds(mut self, seconds: u64) -> Self {
        self.cleanup_delay_seconds = seconds;
        self
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Shared, swappable configuration.
///
/// Each rewrite takes a snapshot with [`ConfigHandle::current`]; a later
/// [`ConfigHandle::replace`] never changes a snapshot already handed out.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<RewriterConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: RewriterConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn current(&self) -> Arc<RewriterConfig> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, config: RewriterConfig) {
        let config = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// Builds a new configuration from the current one and installs it.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(RewriterConfig) -> RewriterConfig,
    {
        let next = f(RewriterConfig::clone(&self.current()));
        self.replace(next);
    }
}
