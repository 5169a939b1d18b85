//! Single-object commands: `get`, `put`, `head` and `delete`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use aws_sdk_s3::operation::get_object_acl::GetObjectAclOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use serde_json::{Value, json};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::config::{DeleteConfig, GetConfig, HeadConfig, PutConfig, PutSource};
use crate::locator::{basename, format_uri};
use crate::storage::Storage;
use crate::transfer::{StreamingTransfer, TransferSession, fetch_object};
use crate::types::error::S3tkError;
use crate::types::to_chrono;
use crate::uploader::{MultipartUploader, UploadSummary};

use super::CommandEnv;
use super::output::{pretty_bytes, write_line};

/// Fetch one object into a file (the key's basename by default) or `out`.
pub async fn get<W>(
    storage: Storage,
    config: &GetConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<TransferSession>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let key = config.location.require_key()?;

    if config.stdout {
        let transfer = StreamingTransfer::new(env.context.clone()).with_stdout_sink(true);
        return fetch_object(&storage, key, config.range, config.gunzip, &transfer, out).await;
    }

    let path = config
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from(basename(key)));
    write_line(
        out,
        format!("Fetching {} to {} ...", format_uri(storage.bucket(), key), path.display()),
    )
    .await?;

    let mut file = File::create(&path).await.with_context(|| {
        S3tkError::Transfer(format!("failed to create {}.", path.display()))
    })?;
    let transfer = StreamingTransfer::new(env.context.clone());
    let session = fetch_object(&storage, key, config.range, config.gunzip, &transfer, &mut file).await?;

    write_line(out, "S3 fetch complete.").await?;
    Ok(session)
}

/// Upload a file or stdin as a multipart upload.
pub async fn put<W>(
    storage: Storage,
    config: &PutConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<UploadSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let key = config.location.require_key()?.to_string();
    let bucket = storage.bucket().to_string();
    debug!(options = ?config.options, "put options.");

    let (source, total): (Box<dyn AsyncRead + Unpin + Send>, Option<u64>) = match &config.source {
        PutSource::File(path) => {
            let file = File::open(path).await.with_context(|| {
                S3tkError::Transfer(format!("failed to open {}.", path.display()))
            })?;
            let length = file
                .metadata()
                .await
                .with_context(|| format!("failed to stat {}.", path.display()))?
                .len();
            write_line(out, format!("{} length is {length} bytes", path.display())).await?;
            write_line(
                out,
                format!("Putting {} to {} ...", path.display(), format_uri(&bucket, &key)),
            )
            .await?;
            (Box::new(file), Some(length))
        }
        PutSource::Stdin => (Box::new(tokio::io::stdin()), None),
    };

    if config.options.publish {
        write_line(out, format!("Publicly available at {}", public_url(&bucket, &key))).await?;
    }

    let reporter = env.start_reporter(move |snapshot, _| {
        let delivered = match total {
            Some(total) if total > 0 => format!(
                "{} of {} ({:.1}%)",
                pretty_bytes(snapshot.bytes_delivered),
                pretty_bytes(total),
                snapshot.bytes_delivered as f64 / total as f64 * 100.0
            ),
            _ => pretty_bytes(snapshot.bytes_delivered),
        };
        format!(
            "buffered {} | delivered {delivered}",
            pretty_bytes(snapshot.bytes_buffered)
        )
    })?;

    let uploader = MultipartUploader::new(storage, env.context.clone(), config.options.clone())
        .with_part_size(config.part_size)
        .with_queue_size(config.queue_size);
    let result = uploader.upload(&key, source, reporter.as_ref()).await;
    if let Some(reporter) = &reporter {
        reporter.halt();
    }
    let summary = result?;

    write_line(
        out,
        format!("S3 put complete [ETag:{}].", summary.e_tag.as_deref().unwrap_or_default()),
    )
    .await?;
    Ok(summary)
}

fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{bucket}.s3.amazonaws.com/{key}")
}

/// Print an object's metadata (and ACL) as JSON.
pub async fn head<W>(storage: Storage, config: &HeadConfig, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let key = config.location.require_key()?;
    let uri = format_uri(storage.bucket(), key);

    let output = storage
        .head_object(key)
        .await
        .with_context(|| format!("failed to fetch metadata of {uri}."))?;
    write_line(out, &uri).await?;
    write_line(out, serde_json::to_string_pretty(&head_to_json(&output))?).await?;

    if config.acl {
        let acl = storage
            .get_object_acl(key)
            .await
            .with_context(|| format!("failed to fetch ACL of {uri}."))?;
        write_line(out, "Object ACL:").await?;
        write_line(out, serde_json::to_string_pretty(&acl_to_json(&acl))?).await?;
    }
    Ok(())
}

fn head_to_json(output: &HeadObjectOutput) -> Value {
    let mut value = json!({
        "ContentLength": output.content_length(),
        "ContentType": output.content_type(),
        "ContentEncoding": output.content_encoding(),
        "CacheControl": output.cache_control(),
        "ContentDisposition": output.content_disposition(),
        "ContentLanguage": output.content_language(),
        "ETag": output.e_tag(),
        "LastModified": output.last_modified().and_then(to_chrono),
        "StorageClass": output.storage_class().map(|c| c.as_str()),
        "VersionId": output.version_id(),
        "ServerSideEncryption": output.server_side_encryption().map(|s| s.as_str()),
        "Metadata": output.metadata(),
    });
    if let Value::Object(fields) = &mut value {
        fields.retain(|_, field| !field.is_null());
    }
    value
}

fn acl_to_json(output: &GetObjectAclOutput) -> Value {
    let grants: Vec<Value> = output
        .grants()
        .iter()
        .map(|grant| {
            let grantee = grant.grantee().map(|grantee| {
                json!({
                    "Type": grantee.r#type().as_str(),
                    "ID": grantee.id(),
                    "DisplayName": grantee.display_name(),
                    "URI": grantee.uri(),
                })
            });
            json!({
                "Grantee": grantee,
                "Permission": grant.permission().map(|p| p.as_str()),
            })
        })
        .collect();

    json!({
        "Owner": output.owner().map(|owner| json!({
            "ID": owner.id(),
            "DisplayName": owner.display_name(),
        })),
        "Grants": grants,
    })
}

pub async fn delete<W>(storage: Storage, config: &DeleteConfig, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let key = config.location.require_key()?;
    let uri = format_uri(storage.bucket(), key);

    write_line(out, format!("Deleting {uri} ...")).await?;
    storage
        .delete_object(key)
        .await
        .with_context(|| format!("failed to delete {uri}."))?;
    info!(key = key, "object deleted.");
    write_line(out, "Resource deleted.").await?;
    Ok(())
}
