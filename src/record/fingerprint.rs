use sha2::{Digest, Sha256};

/// Field separator; never present in a valid source, so field boundaries
/// cannot shift between inputs.
const SEPARATOR: &[u8] = b"\n";

/// Computes the content fingerprint of a record
///
/// Hex SHA-256 over the source, the trimmed title, and the trimmed URL, in
/// that order, separated by newlines. Pure and stable across restarts.
///
/// # Examples
///
/// ```
/// use harvester::fingerprint;
///
/// let a = fingerprint("arxiv", " Attention ", "https://arxiv.org/abs/1706.03762");
/// let b = fingerprint("arxiv", "Attention", "https://arxiv.org/abs/1706.03762 ");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn fingerprint(source: &str, title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(title.trim().as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(url.trim().as_bytes());
    hex::encode(hasher.finalize())
}
