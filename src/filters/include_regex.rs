//! Key regex filter shared by `clean`, `size` and `scan`.
//!
//! Passes keys matching the configured `--key-regex`. Without a regex every
//! key passes.

use anyhow::{Context, Result};
use fancy_regex::Regex;
use tracing::debug;

const FILTER_NAME: &str = "KeyRegexFilter";

#[derive(Debug, Clone, Default)]
pub struct KeyRegexFilter {
    regex: Option<Regex>,
}

impl KeyRegexFilter {
    pub fn new(regex: Option<Regex>) -> Self {
        Self { regex }
    }

    pub fn is_active(&self) -> bool {
        self.regex.is_some()
    }

    /// Display form used in prompts and log lines, e.g. `/\.gz$/`.
    pub fn pattern(&self) -> Option<String> {
        self.regex.as_ref().map(|r| format!("/{}/", r.as_str()))
    }

    /// A backtracking limit hit by `fancy_regex` is reported as an error
    /// rather than silently treated as a non-match.
    pub fn is_match(&self, key: &str) -> Result<bool> {
        let Some(regex) = &self.regex else {
            return Ok(true);
        };

        let matched = regex
            .is_match(key)
            .with_context(|| format!("fancy_regex::Regex::is_match() failed. key={key}"))?;

        if !matched {
            debug!(
                name = FILTER_NAME,
                key = key,
                key_regex = regex.as_str(),
                "object filtered."
            );
        }

        Ok(matched)
    }
}
