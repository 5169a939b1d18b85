//! Resource locator: turns `s3://bucket/key`, `/bucket/key` or `bucket[/key]`
//! (plus an optional explicit key) into a bucket and an optional key.
//!
//! Leading separators are dropped, a run of trailing separators on a key
//! collapses to a single `/` (so prefixes stay prefixes), and an empty key is
//! treated as absent.

use std::fmt;

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::types::error::S3tkError;

const S3_SCHEME: &str = "s3:";
const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceLocation {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ResourceLocation {
    pub fn new(bucket: impl Into<String>, key: Option<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.filter(|k| !k.is_empty()),
        }
    }

    /// The key used as a listing prefix. Empty means the whole bucket.
    pub fn prefix(&self) -> &str {
        self.key.as_deref().unwrap_or("")
    }

    /// The key, or a Validation error for commands that address one object.
    pub fn require_key(&self) -> Result<&str> {
        self.key.as_deref().ok_or_else(|| {
            anyhow!(S3tkError::Validation(format!(
                "a key is required (got only bucket '{}').",
                self.bucket
            )))
        })
    }

    pub fn uri(&self) -> String {
        format_uri(&self.bucket, self.prefix())
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Resolve a bucket or URI plus an optional explicit key.
///
/// An explicit, non-empty `key` wins over any key embedded in
/// `uri_or_bucket`, and is used verbatim.
///
/// ```
/// use s3tk_rs::locator::resolve;
///
/// let location = resolve("s3://bucket/prefix/key", None).unwrap();
/// assert_eq!(location.bucket, "bucket");
/// assert_eq!(location.key.as_deref(), Some("prefix/key"));
///
/// let location = resolve("bucket", Some("key")).unwrap();
/// assert_eq!(location.key.as_deref(), Some("key"));
/// ```
pub fn resolve(uri_or_bucket: &str, key: Option<&str>) -> Result<ResourceLocation> {
    let parsed = parse_uri(uri_or_bucket)?;
    match key.filter(|k| !k.is_empty()) {
        Some(explicit_key) => Ok(ResourceLocation::new(
            parsed.bucket,
            Some(explicit_key.to_string()),
        )),
        None => Ok(parsed),
    }
}

/// Parse a locator without an explicit key.
pub fn parse_uri(uri: &str) -> Result<ResourceLocation> {
    let rest = uri.strip_prefix(S3_SCHEME).unwrap_or(uri);
    let rest = trim_left(rest, SEPARATOR);

    let (bucket, key) = match rest.find(SEPARATOR) {
        Some(pivot) => (&rest[..pivot], trim_left(&rest[pivot..], SEPARATOR)),
        None => (rest, ""),
    };

    let bucket = trim(bucket, SEPARATOR);
    if bucket.is_empty() {
        return Err(anyhow!(S3tkError::Validation(format!(
            "no bucket in locator '{uri}'."
        ))));
    }

    let key = trim_with_keep(key, SEPARATOR, false, true, 1);
    Ok(ResourceLocation::new(bucket, Some(key.to_string())))
}

/// Format a bucket and key as `s3://bucket/key`.
///
/// ```
/// use s3tk_rs::locator::format_uri;
///
/// assert_eq!(format_uri("//bar//", "/foo/"), "s3://bar/foo/");
/// assert_eq!(format_uri("bar", ""), "s3://bar/");
/// ```
pub fn format_uri(bucket: &str, key: &str) -> String {
    let bucket = trim(bucket, SEPARATOR);
    let key = trim_with_keep(trim_left(key, SEPARATOR), SEPARATOR, false, true, 1);
    format!("s3://{bucket}/{key}")
}

/// The last path segment of a key; `get` uses it as the default file name.
pub fn basename(key: &str) -> &str {
    let trimmed = key.trim_end_matches(SEPARATOR);
    trimmed.rsplit(SEPARATOR).next().unwrap_or(trimmed)
}

pub fn trim(text: &str, delimiter: char) -> &str {
    trim_with_keep(text, delimiter, true, true, 0)
}

pub fn trim_left(text: &str, delimiter: char) -> &str {
    trim_with_keep(text, delimiter, true, false, 0)
}

pub fn trim_right(text: &str, delimiter: char) -> &str {
    trim_with_keep(text, delimiter, false, true, 0)
}

/// Trim runs of `delimiter` from either end, leaving at most `keep`
/// delimiters on each trimmed side.
pub fn trim_with_keep(text: &str, delimiter: char, left: bool, right: bool, keep: usize) -> &str {
    let width = delimiter.len_utf8();

    let mut start = 0;
    if left {
        let removed = text.len() - text.trim_start_matches(delimiter).len();
        start = removed - (removed / width).min(keep) * width;
    }

    let mut end = text.len();
    if right {
        let removed = text.len() - text.trim_end_matches(delimiter).len();
        end = text.len() - removed + (removed / width).min(keep) * width;
    }

    if start >= end {
        return "";
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(bucket: &str, key: Option<&str>) -> ResourceLocation {
        ResourceLocation::new(bucket, key.map(str::to_string))
    }

    #[test]
    fn parse_uri_forms() {
        assert!(parse_uri("s3://").is_err());

        assert_eq!(parse_uri("s3://bkt/key").unwrap(), location("bkt", Some("key")));
        assert_eq!(parse_uri("s3://bkt/k/p").unwrap(), location("bkt", Some("k/p")));
        assert_eq!(parse_uri("s3://bkt/k/p/").unwrap(), location("bkt", Some("k/p/")));
        assert_eq!(parse_uri("s3://bkt/").unwrap(), location("bkt", None));
        assert_eq!(parse_uri("s3://bkt").unwrap(), location("bkt", None));

        assert_eq!(parse_uri("/bkt").unwrap(), location("bkt", None));
        assert_eq!(parse_uri("/bkt/").unwrap(), location("bkt", None));
        assert_eq!(parse_uri("/bkt/k/p").unwrap(), location("bkt", Some("k/p")));
        assert_eq!(parse_uri("/bkt/k/p/").unwrap(), location("bkt", Some("k/p/")));
        assert_eq!(parse_uri("bkt/").unwrap(), location("bkt", None));
        assert_eq!(parse_uri("bkt/key/").unwrap(), location("bkt", Some("key/")));
        assert_eq!(parse_uri("bkt/k/p//").unwrap(), location("bkt", Some("k/p/")));
    }

    #[test]
    fn parse_uri_without_bucket_is_validation_error() {
        let err = parse_uri("///").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<S3tkError>(),
            Some(S3tkError::Validation(_))
        ));
    }

    #[test]
    fn resolve_explicit_key_overrides_embedded_key() {
        assert_eq!(resolve("bkt", Some("key")).unwrap(), location("bkt", Some("key")));
        assert_eq!(resolve("bkt", Some("key/")).unwrap(), location("bkt", Some("key/")));
        assert_eq!(
            resolve("bkt", Some("key/stuff")).unwrap(),
            location("bkt", Some("key/stuff"))
        );

        for uri in ["bkt/ignored", "/bkt/ignored", "//bkt/ignored", "s3://bkt/ignored"] {
            assert_eq!(resolve(uri, Some("key")).unwrap(), location("bkt", Some("key")));
        }
    }

    #[test]
    fn resolve_without_explicit_key() {
        assert_eq!(resolve("/bkt", None).unwrap(), location("bkt", None));
        for uri in ["bkt/key", "/bkt/key", "//bkt/key", "s3://bkt/key"] {
            assert_eq!(resolve(uri, None).unwrap(), location("bkt", Some("key")));
        }
        assert_eq!(resolve("s3://bkt/key", Some("")).unwrap(), location("bkt", Some("key")));
    }

    #[test]
    fn resolve_nested_key_from_uri() {
        let resolved = resolve("s3://bucket/prefix/key", None).unwrap();
        assert_eq!(resolved.bucket, "bucket");
        assert_eq!(resolved.key.as_deref(), Some("prefix/key"));
        assert_eq!(resolved.to_string(), "s3://bucket/prefix/key");
    }

    #[test]
    fn format_uri_normalizes_separators() {
        assert_eq!(format_uri("bar", ""), "s3://bar/");
        assert_eq!(format_uri("bar", "foo"), "s3://bar/foo");
        assert_eq!(format_uri("bar", "/foo"), "s3://bar/foo");
        assert_eq!(format_uri("bar", "foo/"), "s3://bar/foo/");
        assert_eq!(format_uri("/bar", "/foo/"), "s3://bar/foo/");
        assert_eq!(format_uri("bar//", "/foo/"), "s3://bar/foo/");
        assert_eq!(format_uri("//bar//", "/foo//"), "s3://bar/foo/");
    }

    #[test]
    fn trim_variants() {
        assert_eq!(trim("/path", '/'), "path");
        assert_eq!(trim("path//", '/'), "path");
        assert_eq!(trim(" /path", '/'), " /path");
        assert_eq!(trim("path/ ", '/'), "path/ ");
        assert_eq!(trim("///", '/'), "");
        assert_eq!(trim_left("  foo  ", ' '), "foo  ");
        assert_eq!(trim_right("  foo  ", ' '), "  foo");

        assert_eq!(trim_with_keep("foo", ':', true, true, 1), "foo");
        assert_eq!(trim_with_keep(":foo", ':', true, true, 1), ":foo");
        assert_eq!(trim_with_keep("::foo::", ':', true, true, 1), ":foo:");
        assert_eq!(trim_with_keep("//foo", '/', true, false, 2), "//foo");
    }

    #[test]
    fn basename_of_keys() {
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(basename("c.txt"), "c.txt");
        assert_eq!(basename("a/b/"), "b");
    }

    #[test]
    fn require_key() {
        assert!(location("bkt", None).require_key().is_err());
        assert_eq!(location("bkt", Some("k")).require_key().unwrap(), "k");
    }
}
