use std::collections::HashMap;

use anyhow::{Result, anyhow};
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::warn;

use crate::types::error::S3tkError;

/// Object attributes applied when a multipart upload is created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_language: Option<String>,
    pub publish: bool,
}

impl PutOptions {
    /// Build options from raw `name:value` header and metadata entries.
    ///
    /// Entries without a name or value are skipped with a warning. Header
    /// names are matched case-insensitively with or without dashes
    /// (`Content-Type`, `ContentType` and `content-type` are equivalent);
    /// an unsupported header name is a Validation error.
    pub fn from_entries(headers: &[String], metadata: &[String], publish: bool) -> Result<Self> {
        let mut options = PutOptions {
            publish,
            ..Default::default()
        };

        for entry in metadata {
            match split_entry(entry) {
                Some((name, value)) => {
                    options.metadata.insert(name.to_string(), value.to_string());
                }
                None => warn!(entry = entry, "ignoring malformed metadata entry."),
            }
        }

        for entry in headers {
            let Some((name, value)) = split_entry(entry) else {
                warn!(entry = entry, "ignoring malformed header entry.");
                continue;
            };
            let slot = match normalize_header_name(name).as_str() {
                "contenttype" => &mut options.content_type,
                "contentencoding" => &mut options.content_encoding,
                "cachecontrol" => &mut options.cache_control,
                "contentdisposition" => &mut options.content_disposition,
                "contentlanguage" => &mut options.content_language,
                _ => {
                    return Err(anyhow!(S3tkError::Validation(format!(
                        "unsupported header '{name}'."
                    ))));
                }
            };
            *slot = Some(value.to_string());
        }

        Ok(options)
    }

    pub fn acl(&self) -> Option<ObjectCannedAcl> {
        self.publish.then_some(ObjectCannedAcl::PublicRead)
    }
}

/// Split `name:value` at the first colon, trimming both sides.
pub fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let (name, value) = entry.split_once(':')?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}

fn normalize_header_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn split_entry_rules() {
        assert_eq!(split_entry("git-hash:feedbeef"), Some(("git-hash", "feedbeef")));
        assert_eq!(split_entry(" a : b:c "), Some(("a", "b:c")));
        assert_eq!(split_entry(":value"), None);
        assert_eq!(split_entry("name:"), None);
        assert_eq!(split_entry("name: "), None);
        assert_eq!(split_entry("novalue"), None);
    }

    #[test]
    fn headers_and_metadata_are_mapped() {
        let options = PutOptions::from_entries(
            &strings(&["ContentEncoding:gzip", "content-type: application/json", "Cache-Control:no-cache"]),
            &strings(&["git-hash:feedbeef", "broken"]),
            true,
        )
        .unwrap();

        assert_eq!(options.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(options.content_type.as_deref(), Some("application/json"));
        assert_eq!(options.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(options.metadata.len(), 1);
        assert_eq!(options.metadata["git-hash"], "feedbeef");
        assert_eq!(options.acl(), Some(ObjectCannedAcl::PublicRead));
    }

    #[test]
    fn unknown_header_is_rejected() {
        let err = PutOptions::from_entries(&strings(&["X-Custom:1"]), &[], false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<S3tkError>(),
            Some(S3tkError::Validation(_))
        ));
    }

    #[test]
    fn private_by_default() {
        let options = PutOptions::from_entries(&[], &[], false).unwrap();
        assert!(options.acl().is_none());
        assert_eq!(options, PutOptions::default());
    }
}
