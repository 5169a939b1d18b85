use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use aws_sdk_s3::types::{MultipartUpload, Object};
use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod context;
pub mod error;
pub mod record;
pub mod token;

pub use context::{ProgressCounters, ProgressSnapshot, RunContext};

/// One object as seen by enumeration.
///
/// Immutable once produced by the walker; downstream consumers (deleter,
/// scan, size, list) only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            e_tag: None,
            storage_class: None,
        }
    }
}

impl From<&Object> for ObjectDescriptor {
    fn from(object: &Object) -> Self {
        Self {
            key: object.key().unwrap_or_default().to_string(),
            size: object.size().unwrap_or(0).max(0) as u64,
            last_modified: object.last_modified().and_then(to_chrono),
            e_tag: object.e_tag().map(str::to_string),
            storage_class: object.storage_class().map(|c| c.as_str().to_string()),
        }
    }
}

/// An item yielded by a delimited listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    Object(ObjectDescriptor),
    CommonPrefix(String),
}

impl ListingEntry {
    pub fn key(&self) -> &str {
        match self {
            Self::Object(object) => &object.key,
            Self::CommonPrefix(prefix) => prefix,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectDescriptor> {
        match self {
            Self::Object(object) => Some(object),
            Self::CommonPrefix(_) => None,
        }
    }
}

/// An incomplete multipart upload found by `list-multipart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadDescriptor {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
}

impl From<&MultipartUpload> for MultipartUploadDescriptor {
    fn from(upload: &MultipartUpload) -> Self {
        Self {
            key: upload.key().unwrap_or_default().to_string(),
            upload_id: upload.upload_id().unwrap_or_default().to_string(),
            initiated: upload.initiated().and_then(to_chrono),
        }
    }
}

pub(crate) fn to_chrono(date_time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(date_time.secs(), date_time.subsec_nanos())
}

/// AWS configuration file locations.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair.
///
/// The secret_access_key and session_token are cleared from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
