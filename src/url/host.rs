use url::Url;

/// Extracts the politeness key of a URL
///
/// The key is the lowercase host, followed by `:port` when the URL names a
/// non-default port. Two servers on one machine but different ports are
/// therefore throttled independently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use harvester::url::host_key;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Like [`host_key`], but for raw strings that may not parse
///
/// Used when writing audit entries for targets whose URL is unusable; an
/// empty string is returned rather than failing the bookkeeping.
pub fn host_key_lossy(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| host_key(&u))
        .unwrap_or_default()
}

/// Builds the robots.txt URL for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    let host = host_key(url)?;
    Url::parse(&format!("{}://{}/robots.txt", url.scheme(), host)).ok()
}
