use crate::error::PreviewError;
use crate::utils::host_matches_domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::Url;

/// Configuration for URL validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlValidationConfig {
    /// Allowed URL schemes (default: ["http", "https"])
    pub allowed_schemes: BTreeSet<String>,
    /// Reject loopback, private and link-local addresses (default: false)
    pub block_private_addresses: bool,
    /// Domains (and their subdomains) that may never be previewed
    pub blocked_domains: BTreeSet<String>,
}

impl Default for UrlValidationConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            block_private_addresses: false,
            blocked_domains: BTreeSet::new(),
        }
    }
}

/// Validates a URL before any cache or network access happens.
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

    pub fn is_valid(&self, url_str: &str) -> bool {
        self.validate(url_str).is_ok()
    }

    /// Validates a URL string, returning the parsed absolute URL.
    pub fn validate(&self, url_str: &str) -> Result<Url, PreviewError> {
        let url = Url::parse(url_str.trim())?;

        if !self.config.allowed_schemes.contains(url.scheme()) {
            return Err(PreviewError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PreviewError::InvalidUrl("no host in URL".to_string()))?;

        if self
            .config
            .blocked_domains
            .iter()
            .any(|blocked| host_matches_domain(host, blocked))
        {
            return Err(PreviewError::InvalidUrl(format!("domain '{host}' is blocked")));
        }

        if self.config.block_private_addresses {
            if host.eq_ignore_ascii_case("localhost") {
                return Err(PreviewError::InvalidUrl("localhost is not allowed".to_string()));
            }

            // IPv6 hosts come back wrapped in brackets
            let ip_str = host.trim_start_matches('[').trim_end_matches(']');
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                if is_private_ip(&ip) {
                    return Err(PreviewError::InvalidUrl(format!(
                        "private address {ip} is not allowed"
                    )));
                }
            }
        }

        Ok(url)
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_unspecified()
                || is_ipv4_reserved(ipv4)
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || is_ipv6_link_local(ipv6)
                || is_ipv6_unique_local(ipv6)
        }
    }
}

fn is_ipv4_reserved(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();

    // 0.0.0.0/8
    octets[0] == 0
        // 100.64.0.0/10 (Carrier-grade NAT)
        || (octets[0] == 100 && (octets[1] & 0b11000000) == 0b01000000)
        // 224.0.0.0/4 (Multicast) and 240.0.0.0/4 (Reserved)
        || octets[0] >= 224
}

fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    // fe80::/10
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn is_ipv6_unique_local(ip: &Ipv6Addr) -> bool {
    // fc00::/7
    (ip.segments()[0] & 0xfe00) == 0xfc00
}
