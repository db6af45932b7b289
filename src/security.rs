use crate::error::FetchError;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;
use url::{Host, Url};

/// Where image downloads may go.
///
/// The default refuses loopback, private and other internal addresses, so an
/// image URL pointing at a LAN or localhost server ends up as the failure
/// marker. Use [`UrlValidationConfig::allow_local_hosts`] to download those.
#[derive(Debug, Clone)]
pub struct UrlValidationConfig {
    /// Default: `http` and `https`.
    pub allowed_schemes: HashSet<String>,
    /// Refuse private, link-local, CGNAT, multicast and reserved addresses.
    pub block_private_ips: bool,
    /// Refuse `localhost`, `*.localhost` and loopback addresses.
    pub block_localhost: bool,
    /// Also look up host names and refuse them if any address is internal.
    /// Only consulted while `block_private_ips` is set.
    pub resolve_hosts: bool,
    pub blocked_domains: HashSet<String>,
    /// If non-empty, only these domains (and their subdomains) are fetched.
    pub allowed_domains: HashSet<String>,
}

impl Default for UrlValidationConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: ["http", "https"].iter().map(|s| s.to_string()).collect(),
            block_private_ips: true,
            block_localhost: true,
            resolve_hosts: true,
            blocked_domains: HashSet::new(),
            allowed_domains: HashSet::new(),
        }
    }
}

impl UrlValidationConfig {
    /// Lets image URLs on loopback and private networks through.
    pub fn allow_local_hosts(mut self) -> Self {
        self.block_private_ips = false;
        self.block_localhost = false;
        self
    }

    pub fn with_blocked_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains.insert(domain.into());
        self
    }

    pub fn with_allowed_domain(mut self, domain: impl Into<String>) -> Self {
        self.allowed_domains.insert(domain.into());
        self
    }
}

/// Checks every URL the fetcher is about to request: the original image URL
/// and each redirect target.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    config: UrlValidationConfig,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::with_default_config()
    }
}

impl UrlValidator {
    pub fn new(config: UrlValidationConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(UrlValidationConfig::default())
    }

    pub fn config(&self) -> &UrlValidationConfig {
        &self.config
    }

    pub fn validate(&self, url_str: &str) -> Result<Url, FetchError> {
        let url = Url::parse(url_str).map_err(|e| FetchError::MalformedUrl(e.to_string()))?;
        self.check_url(&url)?;
        Ok(url)
    }

    /// Resolves a `Location` header against the URL that sent it and applies
    /// the same policy to the target.
    pub fn validate_redirect(&self, from: &Url, location: &str) -> Result<Url, FetchError> {
        let target = from
            .join(location)
            .map_err(|e| FetchError::MalformedUrl(format!("redirect to {location}: {e}")))?;
        self.check_url(&target).map_err(|e| match e {
            FetchError::Blocked(reason) => {
                FetchError::Blocked(format!("redirect to {target}: {reason}"))
            }
            other => other,
        })?;
        Ok(target)
    }

    /// Looks up a host name and refuses it if any of its addresses is
    /// internal. A failed lookup passes; the request reports it.
    pub async fn check_resolved(&self, url: &Url) -> Result<(), FetchError> {
        if !self.config.block_private_ips || !self.config.resolve_hosts {
            return Ok(());
        }
        let Some(Host::Domain(domain)) = url.host() else {
            return Ok(());
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let addrs = match tokio::net::lookup_host((domain, port)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(host = %domain, error = %e, "Host lookup failed, leaving it to the request");
                return Ok(());
            }
        };
        for addr in addrs {
            if is_internal(addr.ip()) {
                return Err(FetchError::Blocked(format!(
                    "{domain} resolves to internal address {}",
                    addr.ip()
                )));
            }
        }
        Ok(())
    }

    fn check_url(&self, url: &Url) -> Result<(), FetchError> {
        if !self.config.allowed_schemes.contains(url.scheme()) {
            return Err(FetchError::Blocked(format!(
                "scheme '{}' is not allowed",
                url.scheme()
            )));
        }

        let host = url
            .host()
            .ok_or_else(|| FetchError::MalformedUrl("no host in URL".to_string()))?;
        let host_str = url.host_str().unwrap_or_default();

        if !self.config.allowed_domains.is_empty() {
            if !matches_domain(&self.config.allowed_domains, host_str) {
                return Err(FetchError::Blocked(format!("domain {host_str} is not allowed")));
            }
        } else if matches_domain(&self.config.blocked_domains, host_str) {
            return Err(FetchError::Blocked(format!("domain {host_str} is blocked")));
        }

        match host {
            Host::Domain(domain) => {
                if self.config.block_localhost && is_localhost_name(domain) {
                    return Err(FetchError::Blocked(format!("local host name {domain}")));
                }
                Ok(())
            }
            Host::Ipv4(ip) => self.check_ip(IpAddr::V4(ip)),
            Host::Ipv6(ip) => self.check_ip(IpAddr::V6(ip)),
        }
    }

    fn check_ip(&self, ip: IpAddr) -> Result<(), FetchError> {
        if self.config.block_localhost && unmapped(ip).is_loopback() {
            return Err(FetchError::Blocked(format!("loopback address {ip}")));
        }
        if self.config.block_private_ips && is_internal(ip) {
            return Err(FetchError::Blocked(format!("private address {ip}")));
        }
        Ok(())
    }
}

fn matches_domain(domains: &HashSet<String>, host: &str) -> bool {
    domains.iter().any(|d| {
        host == d
            || host
                .strip_suffix(d.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn is_localhost_name(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
}

/// `::ffff:a.b.c.d` is treated as the IPv4 address it carries.
fn unmapped(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    }
}

fn is_internal(ip: IpAddr) -> bool {
    match unmapped(ip) {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => is_internal_v6(v6),
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || a == 0
        // 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
        // 240.0.0.0/4
        || a >= 240
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
        // fc00::/7
        || (first & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(result: Result<Url, FetchError>) -> bool {
        matches!(result, Err(FetchError::Blocked(_)))
    }

    #[test]
    fn test_schemes() {
        let validator = UrlValidator::with_default_config();

        assert!(validator.validate("https://example.com/a.png").is_ok());
        assert!(validator.validate("http://example.com/a.png").is_ok());
        assert!(blocked(validator.validate("ftp://example.com/a.png")));
        assert!(blocked(validator.validate("file:///etc/a.png")));
    }

    #[test]
    fn test_local_hosts_blocked_by_default() {
        let validator = UrlValidator::with_default_config();

        for url in [
            "http://localhost/a.png",
            "http://LOCALHOST./a.png",
            "http://img.localhost/a.png",
            "http://127.0.0.1:8080/a.png",
            "http://127.1.2.3/a.png",
            "http://[::1]/a.png",
            "http://[::ffff:127.0.0.1]/a.png",
            "http://0x7f.1/a.png",
        ] {
            assert!(blocked(validator.validate(url)), "{url} should be blocked");
        }
    }

    #[test]
    fn test_internal_addresses_blocked() {
        let validator = UrlValidator::with_default_config();

        for url in [
            "http://10.0.0.1/a.png",
            "http://192.168.1.1/a.png",
            "http://172.16.0.1/a.png",
            "http://169.254.169.254/a.png",
            "http://100.64.0.1/a.png",
            "http://0.0.0.0/a.png",
            "http://224.0.0.1/a.png",
            "http://[fe80::1]/a.png",
            "http://[fd00::1]/a.png",
            "http://[::ffff:10.0.0.1]/a.png",
        ] {
            assert!(blocked(validator.validate(url)), "{url} should be blocked");
        }
        assert!(validator.validate("http://8.8.8.8/a.png").is_ok());
        assert!(validator.validate("http://100.128.0.1/a.png").is_ok());
        assert!(validator.validate("http://[2001:4860::8888]/a.png").is_ok());
    }

    #[test]
    fn test_domain_lists() {
        let validator =
            UrlValidator::new(UrlValidationConfig::default().with_blocked_domain("evil.com"));

        assert!(validator.validate("http://evil.com/a.png").is_err());
        assert!(validator.validate("http://sub.evil.com/a.png").is_err());
        assert!(validator.validate("http://notevil.com/a.png").is_ok());
        assert!(validator.validate("http://good.com/a.png").is_ok());

        let validator =
            UrlValidator::new(UrlValidationConfig::default().with_allowed_domain("trusted.com"));

        assert!(validator.validate("http://img.trusted.com/a.png").is_ok());
        assert!(validator.validate("http://untrusted.com/a.png").is_err());
    }

    #[test]
    fn test_allow_local_hosts() {
        let validator = UrlValidator::new(UrlValidationConfig::default().allow_local_hosts());
        assert!(validator.validate("http://127.0.0.1:9000/a.png").is_ok());
        assert!(validator.validate("http://localhost:9000/a.png").is_ok());
        assert!(validator.validate("http://192.168.1.1/a.png").is_ok());
    }

    #[test]
    fn test_redirect_targets_checked() {
        let validator = UrlValidator::with_default_config();
        let from = Url::parse("https://cdn.example.com/pics/a.png").unwrap();

        let relative = validator.validate_redirect(&from, "../b.png").unwrap();
        assert_eq!(relative.as_str(), "https://cdn.example.com/b.png");

        let absolute = validator
            .validate_redirect(&from, "https://img.example.org/c.png")
            .unwrap();
        assert_eq!(absolute.host_str(), Some("img.example.org"));

        match validator.validate_redirect(&from, "http://169.254.169.254/latest/meta-data") {
            Err(FetchError::Blocked(reason)) => assert!(reason.starts_with("redirect to")),
            other => panic!("expected blocked redirect, got {other:?}"),
        }
        assert!(validator
            .validate_redirect(&from, "file:///etc/passwd")
            .is_err());
    }

    #[tokio::test]
    async fn test_host_resolving_to_loopback_blocked() {
        let config = UrlValidationConfig {
            block_localhost: false,
            ..UrlValidationConfig::default()
        };
        let validator = UrlValidator::new(config);

        let url = validator.validate("http://localhost:9/a.png").unwrap();
        assert!(matches!(
            validator.check_resolved(&url).await,
            Err(FetchError::Blocked(_))
        ));

        let literal = Url::parse("http://8.8.8.8/a.png").unwrap();
        assert!(validator.check_resolved(&literal).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolution_skipped_when_private_allowed() {
        let validator = UrlValidator::new(UrlValidationConfig::default().allow_local_hosts());
        let url = Url::parse("http://localhost:9/a.png").unwrap();
        assert!(validator.check_resolved(&url).await.is_ok());
    }
}
