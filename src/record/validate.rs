/// A candidate record field broke the record rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Source { len: usize },

    SourceChars { source: String },

    Title { len: usize },

    Url { url: String },

    Tag { tag: String },
}

// Written by hand: thiserror treats a field named `source` as the error cause
impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source { len } => write!(f, "source must be 1-64 characters, got {len}"),
            Self::SourceChars { source } => write!(
                f,
                "source must not contain whitespace or control characters: {source:?}"
            ),
            Self::Title { len } => write!(f, "title must be 1-512 characters, got {len}"),
            Self::Url { url } => {
                write!(f, "url must be http(s):// and 8-2048 characters: '{url}'")
            }
            Self::Tag { tag } => write!(
                f,
                "tag must be lowercase kebab-case, at most 32 characters: '{tag}'"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

const MAX_SOURCE: usize = 64;
const MAX_TITLE: usize = 512;
const MIN_URL: usize = 8;
const MAX_URL: usize = 2048;
const MAX_TAG: usize = 32;

/// Checks a source name: 1-64 characters, no whitespace or control characters
pub fn validate_source(source: &str) -> Result<(), ValidationError> {
    let len = source.chars().count();
    if len == 0 || len > MAX_SOURCE {
        return Err(ValidationError::Source { len });
    }
    // Keeps the fingerprint separator out of the first field
    if source.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::SourceChars {
            source: source.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE {
        return Err(ValidationError::Title { len });
    }
    Ok(())
}

/// `^https?://\S+$`, with length bounds
pub(crate) fn validate_url(url: &str) -> Result<(), ValidationError> {
    let len = url.chars().count();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    let ok = (MIN_URL..=MAX_URL).contains(&len)
        && matches!(rest, Some(r) if !r.is_empty() && !r.chars().any(char::is_whitespace));

    if !ok {
        return Err(ValidationError::Url {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Checks a tag against `[a-z0-9][a-z0-9-]{0,31}`
pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    let mut chars = tag.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if !first_ok || !rest_ok || tag.len() > MAX_TAG {
        return Err(ValidationError::Tag {
            tag: tag.to_string(),
        });
    }
    Ok(())
}
