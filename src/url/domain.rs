use crate::{ValidationError, ValidationResult};
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use kage_recon::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks the syntax of a target domain
///
/// A valid domain is at least three characters long, does not start or end
/// with a dot, and contains only ASCII alphanumerics, `-` and `.`.
pub fn validate_domain(domain: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidDomain {
        domain: domain.to_string(),
        reason: reason.to_string(),
    };

    if domain.len() < 3 {
        return Err(invalid("shorter than 3 characters"));
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid("starts or ends with '.'"));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(invalid("contains characters other than alphanumerics, '-' and '.'"));
    }

    Ok(())
}

/// Parses a domain list as produced by certificate-transparency lookups
///
/// Accepts a JSON array of strings or free text separated by commas and
/// whitespace. Entries are unquoted, lowercased and deduplicated in order;
/// wildcard entries are dropped. Syntax is not validated here.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    let entries: Vec<String> = match serde_json::from_str::<Vec<String>>(raw.trim()) {
        Ok(list) => list,
        Err(_) => raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::to_string)
            .collect(),
    };

    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .map(|entry| {
            entry
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '[' || c == ']')
                .to_lowercase()
        })
        .filter(|entry| !entry.is_empty() && !entry.contains('*'))
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Api.Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("api.example.com".to_string()));
    }

    #[test]
    fn test_valid_domains() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("sub-1.example.co.uk").is_ok());
        assert!(validate_domain("a.b").is_ok());
        assert!(validate_domain("localhost").is_ok());
    }

    #[test]
    fn test_too_short() {
        assert!(validate_domain("").is_err());
        assert!(validate_domain("ab").is_err());
    }

    #[test]
    fn test_leading_or_trailing_dot() {
        assert!(validate_domain(".example.com").is_err());
        assert!(validate_domain("example.com.").is_err());
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate_domain("exa mple.com").is_err());
        assert!(validate_domain("*.example.com").is_err());
        assert!(validate_domain("example.com:8080").is_err());
        assert!(validate_domain("exämple.com").is_err());
    }

    #[test]
    fn test_invalid_domain_error_names_domain() {
        let err = validate_domain("a_b.com").unwrap_err();
        assert!(err.to_string().contains("a_b.com"));
    }

    #[test]
    fn test_parse_json_list() {
        let raw = r#"["Example.com", "*.example.com", "api.example.com", "example.com"]"#;
        assert_eq!(
            parse_domain_list(raw),
            vec!["example.com".to_string(), "api.example.com".to_string()]
        );
    }

    #[test]
    fn test_parse_free_text_list() {
        let raw = "'a.example.com', b.example.com\nc.example.com\n\n";
        assert_eq!(
            parse_domain_list(raw),
            vec![
                "a.example.com".to_string(),
                "b.example.com".to_string(),
                "c.example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_domain_list("").is_empty());
        assert!(parse_domain_list("[]").is_empty());
    }
}
