//! Syntactic SSRF guard for user-supplied URLs.
//!
//! Every URL the gateway fetches on behalf of a browser goes through
//! [`SsrfProtection::validate_url`] before a socket is opened. The checks are
//! purely syntactic:
//!
//! - scheme must be exactly `https`
//! - no embedded userinfo (`user:pass@`)
//! - no literal IPv4 host (four dot-separated numeric groups)
//! - no bracket-delimited (IPv6 literal) host
//! - host is not `localhost`, `0.0.0.0` or the cloud metadata name, and does
//!   not end in `.local` / `.internal`
//!
//! Hostnames are NOT resolved. A public name that resolves to a private
//! address at request time (DNS rebinding) passes this guard; see DESIGN.md.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::{Host, Url};

/// Maximum accepted URL length in bytes.
pub const MAX_URL_LENGTH: usize = 2048;

/// Hostnames rejected by exact match.
const BLOCKED_HOSTS: &[&str] = &["localhost", "0.0.0.0", "metadata.google.internal"];

/// Hostname suffixes rejected by suffix match.
const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal"];

static IPV4_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("static regex"));

/// Reasons a URL is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsrfError {
    #[error("URL is empty")]
    Empty,

    #[error("URL exceeds {MAX_URL_LENGTH} bytes")]
    TooLong,

    #[error("URL failed to parse: {0}")]
    Parse(String),

    #[error("scheme '{0}' is not allowed")]
    Scheme(String),

    #[error("URL carries embedded credentials")]
    Credentials,

    #[error("URL has no host")]
    MissingHost,

    #[error("literal IP host '{0}' is not allowed")]
    IpLiteral(String),

    #[error("host '{0}' is blocked")]
    BlockedHost(String),
}

/// A URL that passed every check in [`SsrfProtection::validate_url`].
///
/// The only way to obtain one is through the validator, so a function taking
/// `&ValidatedUrl` cannot be handed an unchecked URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Stateless URL validator.
pub struct SsrfProtection;

impl SsrfProtection {
    /// Validate a raw, user-supplied URL string.
    pub fn validate_url(raw: &str) -> Result<ValidatedUrl, SsrfError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SsrfError::Empty);
        }
        if trimmed.len() > MAX_URL_LENGTH {
            return Err(SsrfError::TooLong);
        }

        let url = Url::parse(trimmed).map_err(|e| SsrfError::Parse(e.to_string()))?;

        if url.scheme() != "https" {
            return Err(SsrfError::Scheme(url.scheme().to_string()));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(SsrfError::Credentials);
        }

        let host = match url.host() {
            None => return Err(SsrfError::MissingHost),
            Some(Host::Ipv4(ip)) => return Err(SsrfError::IpLiteral(ip.to_string())),
            Some(Host::Ipv6(ip)) => return Err(SsrfError::IpLiteral(format!("[{ip}]"))),
            Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        };

        Self::check_hostname(&host)?;
        Ok(ValidatedUrl(url))
    }

    /// Hostname denylist checks, applied to an already lower-cased host.
    fn check_hostname(host: &str) -> Result<(), SsrfError> {
        if host.starts_with('[') || IPV4_LITERAL.is_match(host) {
            return Err(SsrfError::IpLiteral(host.to_string()));
        }

        // "localhost." names the same host as "localhost"
        let bare = host.strip_suffix('.').unwrap_or(host);

        if BLOCKED_HOSTS.contains(&bare) {
            return Err(SsrfError::BlockedHost(host.to_string()));
        }
        if BLOCKED_SUFFIXES.iter().any(|suffix| bare.ends_with(suffix)) {
            return Err(SsrfError::BlockedHost(host.to_string()));
        }
        Ok(())
    }
}
