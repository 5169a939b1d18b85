//! Key filters applied to enumerated objects.

pub mod include_regex;

pub use include_regex::KeyRegexFilter;
