//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Parse,
    AllowAll,
    DenyAll,
}

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's matcher, providing a
/// simplified interface for checking if URLs are allowed. Only allow and
/// disallow rules are honoured.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
    mode: Mode,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            mode: Mode::Parse,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            mode: Mode::AllowAll,
        }
    }

    /// Creates a strict ParsedRobots that allows nothing
    pub fn deny_all() -> Self {
        Self {
            content: String::new(),
            mode: Mode::DenyAll,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL (or path) to check
    /// * `user_agent` - The user agent product token, e.g. `harvester`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.mode {
            Mode::AllowAll => true,
            Mode::DenyAll => false,
            Mode::Parse if self.content.trim().is_empty() => true,
            Mode::Parse => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
            }
        }
    }
}
