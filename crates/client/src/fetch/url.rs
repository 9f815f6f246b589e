//! Image URL normalization before fetching.
//!
//! Cache keys keep the URL exactly as the caller passed it; only the request
//! goes through this normalization.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("relative URL without a base: {0}")]
    RelativeWithoutBase(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute image URL.
///
/// Trims whitespace, defaults a missing scheme to https, lowercases the host
/// and drops any fragment. The query string is kept as-is.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    canonicalize_with_base(input, None)
}

/// Canonicalize an image URL, resolving root-relative paths (`/uploads/a.png`)
/// against `base` when one is configured.
pub fn canonicalize_with_base(input: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = if trimmed.starts_with('/') && !trimmed.starts_with("//") {
        let base = base.ok_or_else(|| UrlError::RelativeWithoutBase(trimmed.to_string()))?;
        base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    } else if trimmed.contains("://") {
        Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    } else {
        let rest = trimmed.trim_start_matches("//");
        Url::parse(&format!("https://{rest}")).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed.host_str().map(str::to_lowercase).filter(|h| !h.is_empty());
    match host {
        Some(host) => parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?,
        None => return Err(UrlError::InvalidUrl(format!("missing host: {trimmed}"))),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://cdn.example.com/img/a.png").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("cdn.example.com"));
        assert_eq!(url.path(), "/img/a.png");
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("cdn.example.com/a.png").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("cdn.example.com"));
    }

    #[test]
    fn test_canonicalize_protocol_relative() {
        let url = canonicalize("//cdn.example.com/a.png").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("https://CDN.Example.COM/A.png#x").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
        assert_eq!(url.path(), "/A.png");
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://cdn.example.com/a.png?w=200&h=100").unwrap();
        assert_eq!(url.query(), Some("w=200&h=100"));
    }

    #[test]
    fn test_relative_with_base() {
        let base = Url::parse("https://api.example.com/").unwrap();
        let url = canonicalize_with_base("/uploads/course.jpg", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/uploads/course.jpg");
    }

    #[test]
    fn test_relative_without_base() {
        let result = canonicalize("/uploads/course.jpg");
        assert!(matches!(result, Err(UrlError::RelativeWithoutBase(_))));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("data:image/png;base64,AAAA");
        assert!(matches!(result, Err(UrlError::InvalidUrl(_) | UrlError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_canonicalize_http_allowed() {
        let url = canonicalize("http://a").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("a"));
    }
}
