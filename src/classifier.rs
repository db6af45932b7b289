use crate::config::RewriterConfig;
use url::Url;

/// How the rewriter should treat a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Image,
    NonImage,
    Malformed,
}

/// Classifies `url` by the extension of its path. Pure, never touches the
/// network.
pub fn classify(url: &str, config: &RewriterConfig) -> Classification {
    let parsed = match parse_with_host(url) {
        Some(parsed) => parsed,
        None => return Classification::Malformed,
    };

    match url_extension(&parsed) {
        Some(ext) if config.is_allowed_extension(&ext) => Classification::Image,
        _ => Classification::NonImage,
    }
}

/// Parses a URL that has both a scheme and a host.
pub(crate) fn parse_with_host(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(parsed),
        _ => None,
    }
}

/// Lower-cased text after the last `.` of the final path segment.
pub fn url_extension(url: &Url) -> Option<String> {
    let path = url.path().to_lowercase();
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_images() {
        let config = RewriterConfig::default();
        for url in [
            "https://x.test/a.png",
            "https://x.test/dir/b.JPG",
            "http://x.test/c.jpeg?size=large#frag",
            "https://x.test/d.webp",
            "https://x.test/favicon.ico",
        ] {
            assert_eq!(classify(url, &config), Classification::Image, "{url}");
        }
    }

    #[test]
    fn test_classify_non_images() {
        let config = RewriterConfig::default();
        assert_eq!(classify("https://x.test/doc.pdf", &config), Classification::NonImage);
        assert_eq!(classify("https://x.test/index.html", &config), Classification::NonImage);
        assert_eq!(classify("https://x.test/", &config), Classification::NonImage);
        assert_eq!(classify("https://x.test/a.png/view", &config), Classification::NonImage);
        // query strings do not count as the path
        assert_eq!(classify("https://x.test/img?f=a.png", &config), Classification::NonImage);
    }

    #[test]
    fn test_classify_malformed() {
        let config = RewriterConfig::default();
        assert_eq!(classify("not a url", &config), Classification::Malformed);
        assert_eq!(classify("https://", &config), Classification::Malformed);
        assert_eq!(classify("data:image/png;base64,AAAA", &config), Classification::Malformed);
    }

    #[test]
    fn test_custom_extensions() {
        let config = RewriterConfig::default().with_allowed_extensions([".AVIF"]);
        assert_eq!(classify("https://x.test/a.avif", &config), Classification::Image);
        assert_eq!(classify("https://x.test/a.png", &config), Classification::NonImage);
    }

    #[test]
    fn test_url_extension() {
        let url = Url::parse("https://x.test/Path/Photo.PNG").unwrap();
        assert_eq!(url_extension(&url).as_deref(), Some("png"));
        let url = Url::parse("https://x.test/archive.").unwrap();
        assert_eq!(url_extension(&url), None);
    }
}
