use crate::error::CleanerError;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, error};

/// Punctuation and brackets that end a URL when they follow it directly.
/// An explicit list, not a Unicode punctuation class.
pub const URL_BOUNDARY_CHARS: &str =
    "()<>\"，。！？；：“”‘’（）【】《》〈〉「」『』〔〕［］｛｝";

/// CJK Unified Ideographs, the range Chinese prose falls in.
const CJK_RANGE: &str = r"\x{4e00}-\x{9fa5}";

/// Used only if the boundary pattern cannot be compiled.
pub const FALLBACK_PATTERN: &str = r"https?://[^\s\x{4e00}-\x{9fa5}]+";

/// A URL found in a text segment. Offsets are byte offsets into the scanned
/// text and `raw == text[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatch {
    pub raw: String,
    pub start: usize,
    pub end: usize,
}

/// Finds `http://` and `https://` URLs in free text without swallowing the
/// prose punctuation that follows them.
#[derive(Debug, Clone)]
pub struct UrlScanner {
    pattern: Regex,
    degraded: bool,
}

impl Default for UrlScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlScanner {
    /// Builds the scanner with the standard boundary set.
    pub fn new() -> Self {
        Self::from_pattern(&boundary_pattern(URL_BOUNDARY_CHARS))
    }

    /// Like [`UrlScanner::new`] but surfaces a pattern failure instead of
    /// degrading.
    pub fn try_new() -> Result<Self, CleanerError> {
        Self::try_from_pattern(&boundary_pattern(URL_BOUNDARY_CHARS))
    }

    /// Adds characters to the standard boundary set.
    pub fn with_extra_boundary(extra: &str) -> Result<Self, CleanerError> {
        let chars = format!("{URL_BOUNDARY_CHARS}{extra}");
        Self::try_from_pattern(&boundary_pattern(&chars))
    }

    pub fn try_from_pattern(pattern: &str) -> Result<Self, CleanerError> {
        let pattern = Regex::new(pattern)?;
        Ok(Self {
            pattern,
            degraded: false,
        })
    }

    /// Compiles `pattern`, falling back to [`FALLBACK_PATTERN`] if it is
    /// invalid. The failure is logged once here, at construction.
    pub fn from_pattern(pattern: &str) -> Self {
        match Self::try_from_pattern(pattern) {
            Ok(scanner) => scanner,
            Err(e) => {
                error!(
                    error = %e,
                    pattern = %pattern,
                    "URL boundary pattern is invalid, falling back to whitespace/CJK boundaries"
                );
                Self {
                    pattern: fallback_regex().clone(),
                    degraded: true,
                }
            }
        }
    }

    /// True if the scanner is running on the fallback pattern.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns every URL in `text`, left to right, non-overlapping.
    pub fn scan(&self, text: &str) -> Vec<UrlMatch> {
        let matches: Vec<UrlMatch> = self
            .pattern
            .find_iter(text)
            .map(|m| UrlMatch {
                raw: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
            })
            .collect();

        if !matches.is_empty() {
            debug!(count = matches.len(), "Found URLs in text segment");
        }
        matches
    }
}

fn fallback_regex() -> &'static Regex {
    static FALLBACK: OnceLock<Regex> = OnceLock::new();
    FALLBACK.get_or_init(|| Regex::new(FALLBACK_PATTERN).unwrap())
}

fn boundary_pattern(chars: &str) -> String {
    format!(
        r"https?://[^\s{}{}]+",
        CJK_RANGE,
        regex::escape(chars)
    )
}
