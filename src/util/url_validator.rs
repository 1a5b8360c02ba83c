use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Maximum feed name length accepted before a request is sent.
pub const MAX_FEED_NAME_LENGTH: usize = 200;

/// Errors that can occur during URL and field validation.
///
/// Feed URLs are fetched by the backend, so besides parsing failures they are
/// screened for internal addresses the server should never be pointed at.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
    /// A required field was empty.
    #[error("{0} is required")]
    Missing(&'static str),
    /// A field exceeded its maximum length.
    #[error("{field} too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
}

/// Trim a user-entered feed URL and add `https://` when no scheme is present.
///
/// # Examples
///
/// ```
/// use gator::util::normalize_feed_url;
///
/// assert_eq!(normalize_feed_url("  example.com/rss "), "https://example.com/rss");
/// assert_eq!(normalize_feed_url("http://example.com/rss"), "http://example.com/rss");
/// ```
pub fn normalize_feed_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Normalize and validate a URL for use as a feed source.
///
/// Rejects:
/// - Empty input
/// - Non-HTTP(S) schemes (e.g., `file://`, `ftp://`)
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`)
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6)
///
/// # Examples
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("example.com/feed.xml").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/feed.xml");
///
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    if input.trim().is_empty() {
        return Err(UrlValidationError::Missing("Feed URL"));
    }

    let url = Url::parse(&normalize_feed_url(input))?;
    check_scheme(&url)?;

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

/// Validate the API base URL.
///
/// Unlike feed URLs, the API commonly lives on localhost. Plain HTTP to a
/// non-local host is allowed but logged.
pub fn validate_base_url(input: &str) -> Result<Url, UrlValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlValidationError::Missing("API base URL"));
    }
    let url = Url::parse(trimmed)?;
    check_scheme(&url)?;

    if url.scheme() == "http" {
        let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
        if !is_local {
            tracing::warn!(base_url = %url, "Using non-HTTPS API base URL");
        }
    }

    Ok(url)
}

/// Trim a feed name and check it is present and of sane length.
pub fn validate_feed_name(input: &str) -> Result<&str, UrlValidationError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(UrlValidationError::Missing("Feed name"));
    }
    if name.chars().count() > MAX_FEED_NAME_LENGTH {
        return Err(UrlValidationError::TooLong {
            field: "Feed name",
            max: MAX_FEED_NAME_LENGTH,
        });
    }
    Ok(name)
}

fn check_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
