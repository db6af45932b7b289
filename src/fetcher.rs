use crate::artifacts::{remove_artifact, TempArtifacts};
use crate::classifier::{parse_with_host, url_extension};
use crate::error::{CleanerError, FetchError};
use crate::security::UrlValidator;
use crate::{ImageFetch, RewriterConfig};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use url::Url;

/// Upper bound on image downloads in flight through one fetcher.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

/// Redirect hops followed for one image URL.
pub const MAX_REDIRECTS: usize = 10;

/// Content types accepted as image bytes.
const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["image/", "application/octet-stream"];

/// A downloaded image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub path: PathBuf,
    pub size: u64,
}

/// Result of one image download attempt.
///
/// Only `Success` leaves a file behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(FetchedImage),
    Rejected(FetchError),
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Rejected(e) | FetchOutcome::Failed(e) => Some(e),
        }
    }
}

impl From<Result<FetchedImage, FetchError>> for FetchOutcome {
    fn from(result: Result<FetchedImage, FetchError>) -> Self {
        match result {
            Ok(image) => FetchOutcome::Success(image),
            Err(e) if e.is_rejection() => FetchOutcome::Rejected(e),
            Err(e) => FetchOutcome::Failed(e),
        }
    }
}

/// Downloads image URLs into the temp directory.
#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    artifacts: TempArtifacts,
    validator: UrlValidator,
    semaphore: Arc<Semaphore>,
}

impl ImageFetcher {
    pub fn new(artifacts: TempArtifacts) -> Result<Self, CleanerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .redirect(Policy::none())
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| CleanerError::HttpClient(e.to_string()))?;

        debug!("Image fetcher initialized");
        Ok(Self::with_client(client, artifacts))
    }

    /// Uses a caller-built client. Timeouts and the user agent are still
    /// applied per request from the [`RewriterConfig`].
    ///
    /// The fetcher follows redirects itself so that every hop goes through
    /// the [`UrlValidator`]; build the client with `redirect::Policy::none()`.
    pub fn with_client(client: Client, artifacts: TempArtifacts) -> Self {
        Self {
            client,
            artifacts,
            validator: UrlValidator::with_default_config(),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
        }
    }

    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn artifacts(&self) -> &TempArtifacts {
        &self.artifacts
    }

    async fn try_fetch(
        &self,
        url: &str,
        config: &RewriterConfig,
    ) -> Result<FetchedImage, FetchError> {
        let parsed = parse_with_host(url)
            .ok_or_else(|| FetchError::MalformedUrl(url.to_string()))?;

        let ext = url_extension(&parsed).unwrap_or_default();
        if !config.is_allowed_extension(&ext) {
            return Err(FetchError::UnsupportedExtension(ext));
        }

        let target = self.validator.validate(parsed.as_str())?;
        self.validator.check_resolved(&target).await?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::NetworkError("fetcher is shut down".to_string()))?;

        info!("Downloading image");
        let response = self.get_following_redirects(target, config).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError(status.as_u16()));
        }

        let limit = config.max_file_size_bytes;
        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(FetchError::Oversize {
                    size: length,
                    limit,
                });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !ACCEPTED_CONTENT_TYPES
            .iter()
            .any(|accepted| content_type.contains(accepted))
        {
            return Err(FetchError::WrongContentType(content_type));
        }

        let artifact = self.artifacts.allocate(&ext);
        match write_body(response, &artifact.path, limit).await {
            Ok(size) => Ok(FetchedImage {
                path: artifact.path,
                size,
            }),
            Err(e) => {
                remove_artifact(&artifact.path).await;
                Err(e)
            }
        }
    }

    /// Sends the GET and follows redirects by hand, validating each target
    /// before it is requested. All hops share one deadline.
    async fn get_following_redirects(
        &self,
        mut target: Url,
        config: &RewriterConfig,
    ) -> Result<Response, FetchError> {
        let deadline = Instant::now() + config.fetch_timeout();

        for _ in 0..=MAX_REDIRECTS {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::Timeout);
            }

            let response = self
                .client
                .get(target.clone())
                .header(USER_AGENT, config.user_agent.as_str())
                .timeout(remaining)
                .send()
                .await?;

            let status = response.status();
            if !status.is_redirection() {
                return Ok(response);
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(FetchError::HttpError(status.as_u16()))?;

            let next = self.validator.validate_redirect(&target, location)?;
            self.validator.check_resolved(&next).await?;
            debug!(from = %target, to = %next, "Following redirect");
            target = next;
        }

        Err(FetchError::NetworkError(format!(
            "more than {MAX_REDIRECTS} redirects"
        )))
    }
}

#[async_trait]
impl ImageFetch for ImageFetcher {
    #[instrument(level = "debug", skip(self, config))]
    async fn fetch(&self, url: &str, config: &RewriterConfig) -> FetchOutcome {
        let outcome = FetchOutcome::from(self.try_fetch(url, config).await);
        match &outcome {
            FetchOutcome::Success(image) => {
                info!(
                    url = %url,
                    path = %image.path.display(),
                    size = image.size,
                    "Downloaded image"
                );
            }
            FetchOutcome::Rejected(e) | FetchOutcome::Failed(e) => e.log(),
        }
        outcome
    }
}

/// Streams the body into `path` chunk by chunk and checks the result is a
/// non-empty file. The caller removes `path` on error.
async fn write_body(response: Response, path: &Path, limit: u64) -> Result<u64, FetchError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| FetchError::WriteError(format!("create {}: {}", path.display(), e)))?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(FetchError::Oversize {
                size: written,
                limit,
            });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::WriteError(e.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|e| FetchError::WriteError(e.to_string()))?;
    drop(file);

    let size = fs::metadata(path)
        .await
        .map_err(|e| FetchError::WriteError(e.to_string()))?
        .len();
    if size == 0 {
        return Err(FetchError::WriteError("downloaded file is empty".to_string()));
    }
    Ok(size)
}
