// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve a potentially relative URL against a base URL.
///
/// Returns `None` for hrefs that cannot name a page (`#frag`, `mailto:`,
/// `javascript:`) or fail to parse.
///
/// # Examples
/// ```
/// use portfolio_crawler::utils::url::resolve;
///
/// assert_eq!(
///     resolve("https://example.com/path/", "page.html").as_deref(),
///     Some("https://example.com/path/page.html")
/// );
/// ```
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
    {
        return None;
    }
    let joined = Url::parse(base).ok()?.join(href).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

/// Extract the lowercase host from a URL, without a leading `www.`.
///
/// # Examples
/// ```
/// use portfolio_crawler::utils::url::get_domain;
///
/// assert_eq!(
///     get_domain("https://www.Example.com/path"),
///     Some("example.com".to_string())
/// );
/// ```
pub fn get_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Whether `url`'s host equals `domain` or is a subdomain of it.
pub fn host_matches(url: &str, domain: &str) -> bool {
    get_domain(url).is_some_and(|host| host == domain || host.ends_with(&format!(".{domain}")))
}

/// Path plus query, as robots.txt rules see it.
pub fn path_and_query(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    })
}

/// Return `url` with `key=value` set in its query string.
pub fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let mut out = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_url() {
        assert_eq!(
            resolve("https://example.com/path/", "https://other.com/page").as_deref(),
            Some("https://other.com/page")
        );
    }

    #[test]
    fn test_resolve_absolute_path() {
        assert_eq!(
            resolve("https://example.com/path/", "/root.html").as_deref(),
            Some("https://example.com/root.html")
        );
    }

    #[test]
    fn test_resolve_relative_from_file() {
        assert_eq!(
            resolve("https://example.com/path/index.html", "other.html").as_deref(),
            Some("https://example.com/path/other.html")
        );
    }

    #[test]
    fn test_resolve_rejects_non_pages() {
        assert_eq!(resolve("https://example.com/", "#top"), None);
        assert_eq!(resolve("https://example.com/", "mailto:a@b.c"), None);
        assert_eq!(resolve("https://example.com/", "javascript:void(0)"), None);
        assert_eq!(resolve("https://example.com/", "   "), None);
    }

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://Example.COM/path"),
            Some("example.com".to_string())
        );
        assert_eq!(get_domain("invalid-url"), None);
    }

    #[test]
    fn test_host_matches_subdomains() {
        assert!(host_matches("https://www.linkedin.com/company/x", "linkedin.com"));
        assert!(host_matches("https://uk.linkedin.com/in/y", "linkedin.com"));
        assert!(!host_matches("https://notlinkedin.com/", "linkedin.com"));
    }

    #[test]
    fn test_with_query_param_replaces() {
        let url = Url::parse("https://example.com/list/?_paged=2&sort=a").unwrap();
        let next = with_query_param(&url, "_paged", "3");
        assert_eq!(next.as_str(), "https://example.com/list/?sort=a&_paged=3");
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(
            path_and_query("https://example.com/a/b?x=1").as_deref(),
            Some("/a/b?x=1")
        );
    }
}
