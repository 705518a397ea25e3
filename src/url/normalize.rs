use crate::{ValidationError, ValidationResult};
use url::Url;

/// Resolves a raw attribute value found in a document against its base URL
///
/// Normalization rules:
/// 1. Protocol-relative references (`//host/path`) are pinned to `https:`
/// 2. References without a scheme are joined onto `base`
/// 3. Scheme-qualified references are taken unchanged
///
/// The result is discarded unless it carries both a scheme and a host, so
/// `mailto:`, `javascript:` and `data:` references never survive.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use kage_recon::url::normalize;
///
/// let base = Url::parse("https://example.com/docs/").unwrap();
/// assert_eq!(
///     normalize(&base, "../login").unwrap().as_str(),
///     "https://example.com/login"
/// );
/// assert!(normalize(&base, "javascript:void(0)").is_none());
/// ```
pub fn normalize(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let resolved = if raw.starts_with("//") {
        Url::parse(&format!("https:{}", raw)).ok()?
    } else {
        match Url::parse(raw) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => base.join(raw).ok()?,
            Err(_) => return None,
        }
    };

    match resolved.host_str() {
        Some(host) if !host.is_empty() => Some(resolved),
        _ => None,
    }
}

/// Builds the canonical URL for a target given as a bare domain or a URL
///
/// Bare domains are reached over HTTPS.
pub fn target_url(target: &str) -> ValidationResult<Url> {
    let target = target.trim();
    let candidate = if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    };

    let url = Url::parse(&candidate).map_err(|e| ValidationError::Parse(format!("{}: {}", target, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::MissingHost(target.to_string()));
    }

    Ok(url)
}

/// Returns the URL text without its `scheme://` prefix
pub fn strip_scheme(url: &Url) -> String {
    let text = url.as_str();
    match text.split_once("://") {
        Some((_, rest)) => rest.trim_end_matches('/').to_string(),
        None => text.to_string(),
    }
}
