use crate::artifacts::TempArtifacts;
use crate::classifier::{classify, Classification};
use crate::fetcher::FetchOutcome;
use crate::logging::log_fetch_failure_card;
use crate::scanner::{UrlMatch, UrlScanner};
use crate::{ImageFetch, MediaRef, MessageSegment, RewriterConfig};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Replaces image URLs in text segments with downloaded images and applies
/// the block policy to every other URL.
#[derive(Clone)]
pub struct MessageRewriter {
    scanner: UrlScanner,
    fetcher: Arc<dyn ImageFetch>,
    artifacts: TempArtifacts,
}

impl MessageRewriter {
    pub fn new(fetcher: Arc<dyn ImageFetch>, artifacts: TempArtifacts) -> Self {
        Self {
            scanner: UrlScanner::new(),
            fetcher,
            artifacts,
        }
    }

    pub fn with_scanner(mut self, scanner: UrlScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn scanner(&self) -> &UrlScanner {
        &self.scanner
    }

    /// Rewrites `segments` and returns the replacement sequence.
    ///
    /// Text without URLs and all non-text segments come back untouched and in
    /// place. Downloaded images get a cleanup scheduled after
    /// `config.cleanup_delay_seconds`; the cleanup runs detached and is never
    /// awaited here.
    #[instrument(level = "debug", skip_all, fields(segments = segments.len()))]
    pub async fn rewrite(
        &self,
        segments: Vec<MessageSegment>,
        config: &RewriterConfig,
    ) -> Vec<MessageSegment> {
        let mut out = Vec::with_capacity(segments.len());
        let mut downloaded = Vec::new();

        for segment in segments {
            match segment {
                MessageSegment::Text(text) => {
                    let matches = self.scanner.scan(&text);
                    if matches.is_empty() {
                        out.push(MessageSegment::Text(text));
                        continue;
                    }
                    self.rewrite_text(&text, &matches, config, &mut out, &mut downloaded)
                        .await;
                }
                other @ (MessageSegment::Media(_) | MessageSegment::Other(_)) => {
                    out.push(other);
                }
            }
        }

        for path in downloaded {
            let _ = self
                .artifacts
                .schedule_cleanup(path, config.cleanup_delay());
        }

        out
    }

    async fn rewrite_text(
        &self,
        text: &str,
        matches: &[UrlMatch],
        config: &RewriterConfig,
        out: &mut Vec<MessageSegment>,
        downloaded: &mut Vec<PathBuf>,
    ) {
        let classes: Vec<Classification> =
            matches.iter().map(|m| classify(&m.raw, config)).collect();

        // Downloads run together; join_all keeps them in match order.
        let fetches = matches
            .iter()
            .zip(&classes)
            .filter(|(_, class)| **class == Classification::Image)
            .map(|(m, _)| self.fetcher.fetch(&m.raw, config));
        let mut outcomes = join_all(fetches).await.into_iter();

        let mut cursor = 0;
        for (m, class) in matches.iter().zip(classes) {
            push_text(out, &text[cursor..m.start]);

            match class {
                Classification::Image => match outcomes.next() {
                    Some(FetchOutcome::Success(image)) => {
                        info!(url = %m.raw, path = %image.path.display(), "Converted URL to image");
                        downloaded.push(image.path.clone());
                        out.push(MessageSegment::Media(MediaRef { path: image.path }));
                    }
                    outcome => {
                        if let Some(e) = outcome.as_ref().and_then(FetchOutcome::error) {
                            log_fetch_failure_card(&m.raw, e);
                        }
                        out.push(MessageSegment::Text(config.failed_marker(&m.raw)));
                    }
                },
                Classification::NonImage | Classification::Malformed => {
                    push_non_image(out, &m.raw, config);
                }
            }

            cursor = m.end;
        }

        push_text(out, &text[cursor..]);
    }
}

fn push_non_image(out: &mut Vec<MessageSegment>, url: &str, config: &RewriterConfig) {
    if config.block_non_image_urls {
        info!(url = %url, "Blocked non-image URL");
        if config.show_blocked_message && !config.blocked_replacement_text.is_empty() {
            out.push(MessageSegment::Text(
                config.blocked_replacement_text.clone(),
            ));
        }
    } else {
        warn!(url = %url, "Sending non-image URL, the transport may reject it");
        out.push(MessageSegment::Text(url.to_string()));
    }
}

/// Whitespace-only runs between URLs are dropped.
fn push_text(out: &mut Vec<MessageSegment>, slice: &str) {
    if slice.trim().is_empty() {
        if !slice.is_empty() {
            debug!(len = slice.len(), "Dropped whitespace between URLs");
        }
        return;
    }
    out.push(MessageSegment::Text(slice.to_string()));
}
