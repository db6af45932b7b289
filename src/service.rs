use crate::artifacts::{TempArtifacts, DEFAULT_TEMP_DIR};
use crate::config::ConfigHandle;
use crate::error::CleanerError;
use crate::fetcher::ImageFetcher;
use crate::rewriter::MessageRewriter;
use crate::scanner::UrlScanner;
use crate::security::{UrlValidationConfig, UrlValidator};
use crate::{ImageFetch, MessageSegment, RewriterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Entry point for a bot host: wire it to the host's startup, reply
/// decoration and shutdown hooks.
///
/// # Examples
/// ```no_run
/// use url_cleaner::{MessageSegment, UrlCleanerService};
///
/// # async fn run() -> Result<(), url_cleaner::CleanerError> {
/// let service = UrlCleanerService::new()?;
/// service.initialize().await;
///
/// let reply = vec![MessageSegment::text("看这个 https://x.test/a.png 很可爱")];
/// let reply = service.decorate(reply).await;
/// // hand `reply` to the transport
///
/// service.terminate().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UrlCleanerService {
    rewriter: MessageRewriter,
    artifacts: TempArtifacts,
    config: ConfigHandle,
}

impl UrlCleanerService {
    pub fn new() -> Result<Self, CleanerError> {
        Self::new_with_config(ServiceConfig::default())
    }

    /// Builds the service. An invalid URL pattern or HTTP client setup
    /// fails here rather than on a message.
    pub fn new_with_config(config: ServiceConfig) -> Result<Self, CleanerError> {
        debug!(temp_dir = %config.temp_dir.display(), "Initializing UrlCleanerService");

        let artifacts = TempArtifacts::new(config.temp_dir);
        let fetcher: Arc<dyn ImageFetch> = match config.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                ImageFetcher::new(artifacts.clone())?
                    .with_validator(UrlValidator::new(config.url_validation)),
            ),
        };
        let rewriter =
            MessageRewriter::new(fetcher, artifacts.clone()).with_scanner(UrlScanner::try_new()?);

        Ok(Self {
            rewriter,
            artifacts,
            config: ConfigHandle::new(config.rewriter),
        })
    }

    /// Prepares the temp directory. Call once at startup.
    pub async fn initialize(&self) -> bool {
        self.artifacts.ensure_directory().await
    }

    /// Rewrites one outgoing reply under the configuration current at the
    /// time of the call.
    #[instrument(level = "debug", skip_all)]
    pub async fn decorate(&self, segments: Vec<MessageSegment>) -> Vec<MessageSegment> {
        let config = self.config.current();
        self.rewriter.rewrite(segments, &config).await
    }

    /// In-place form of [`UrlCleanerService::decorate`] for hosts that hand
    /// out a mutable message chain.
    pub async fn decorate_chain(&self, chain: &mut Vec<MessageSegment>) {
        if chain.is_empty() {
            return;
        }
        let segments = std::mem::take(chain);
        *chain = self.decorate(segments).await;
    }

    pub fn config(&self) -> Arc<RewriterConfig> {
        self.config.current()
    }

    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    /// Installs a new configuration. Rewrites already running keep the
    /// configuration they started with.
    pub fn reconfigure(&self, config: RewriterConfig) {
        info!("Rewriter configuration replaced");
        self.config.replace(config);
    }

    pub fn artifacts(&self) -> &TempArtifacts {
        &self.artifacts
    }

    /// Removes every downloaded image and the temp directory. Call once at
    /// shutdown.
    pub async fn terminate(&self) {
        self.artifacts.purge_all().await;
    }
}

/// Construction options for [`UrlCleanerService`].
///
/// # Local image hosts
///
/// `url_validation` defaults to refusing loopback and private-network
/// addresses, including redirect targets and host names that resolve to
/// them. An image served from `localhost` or a LAN address is therefore
/// replaced with the failure marker instead of being attached. Bots that
/// post images from such hosts should pass
/// `UrlValidationConfig::default().allow_local_hosts()` to
/// [`ServiceConfig::with_url_validation`].
pub struct ServiceConfig {
    pub temp_dir: PathBuf,
    pub rewriter: RewriterConfig,
    /// Refuses local and private hosts unless relaxed; see above.
    pub url_validation: UrlValidationConfig,
    pub fetcher: Option<Arc<dyn ImageFetch>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self {
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            rewriter: RewriterConfig::default(),
            url_validation: UrlValidationConfig::default(),
            fetcher: None,
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_rewriter_config(mut self, rewriter: RewriterConfig) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn with_url_validation(mut self, url_validation: UrlValidationConfig) -> Self {
        self.url_validation = url_validation;
        self
    }

    /// Replaces the HTTP fetcher, e.g. with one backed by a host-provided
    /// client.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ImageFetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }
}
