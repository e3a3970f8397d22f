use url::Url;

/// Extracts the lowercase host of a URL
///
/// Returns None if the URL cannot be parsed or has no host.
pub fn extract_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Derives the admission-control key of a URL: `scheme://authority/`
///
/// The `url` crate lowercases the host and drops ports that are the default
/// for the scheme, so `HTTPS://Example.COM:443/a` and `https://example.com/b`
/// share the key `https://example.com/`. User info is not part of the key.
///
/// # Arguments
///
/// * `url` - The link URL as stored in the catalog
///
/// # Returns
///
/// * `Some(String)` - The host key
/// * `None` - If the URL does not parse or has no host
///
/// # Examples
///
/// ```
/// use linkwatch::url::host_key;
///
/// assert_eq!(
///     host_key("https://Example.com:8080/path?q=1"),
///     Some("https://example.com:8080/".to_string())
/// );
/// assert_eq!(host_key("not a url"), None);
/// ```
pub fn host_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        return None;
    }

    let key = match parsed.port() {
        Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
        None => format!("{}://{}/", parsed.scheme(), host),
    };
    Some(key)
}
