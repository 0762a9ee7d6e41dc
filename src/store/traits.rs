//! Object store trait definition.

use crate::core::tags;
use crate::core::{ListPage, ObjectHead, ObjectSummary, ScanStatus, StoreError, StoreResult, Tag};

use async_trait::async_trait;
use chrono::Utc;
use percent_encoding::percent_decode_str;
use std::fmt::Debug;
use std::path::Path;

/// Trait for remote blob stores holding the objects to scan.
///
/// Every operation returns an explicit `Result`; implementations translate
/// "no such key" into [`StoreError::NotFound`] so callers can tell a missing
/// object apart from a failing backend.
///
/// `tag_object` replaces the whole tag set. Use [`ObjectStore::write_status`]
/// to change the scan status without losing unrelated tags.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Fetches object metadata without downloading the body.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead>;

    /// Lists one page of objects, starting after `token`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> StoreResult<ListPage>;

    /// Streams an object to `local_path`, creating parent directories.
    async fn download_file(&self, bucket: &str, key: &str, local_path: &Path) -> StoreResult<()>;

    /// Reads the full tag set of an object.
    async fn get_object_tags(&self, bucket: &str, key: &str) -> StoreResult<Vec<Tag>>;

    /// Replaces the full tag set of an object.
    async fn tag_object(&self, bucket: &str, key: &str, tags: Vec<Tag>) -> StoreResult<()>;

    /// Uploads a local file to `key`.
    async fn upload_object(&self, bucket: &str, key: &str, local_path: &Path) -> StoreResult<()>;

    /// Deletes the given keys. Missing keys are not an error.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()>;

    /// Returns the object size, failing if the store reports none.
    async fn size_of(&self, bucket: &str, key: &str) -> StoreResult<u64> {
        self.head_object(bucket, key)
            .await?
            .size
            .ok_or_else(|| StoreError::MissingSize {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    /// Returns the stored content type, if any.
    async fn get_object_content_type(&self, bucket: &str, key: &str) -> StoreResult<Option<String>> {
        Ok(self.head_object(bucket, key).await?.content_type)
    }

    /// Returns the original upload filename recorded in `Content-Disposition`.
    async fn get_original_filename(&self, bucket: &str, key: &str) -> StoreResult<Option<String>> {
        let head = self.head_object(bucket, key).await?;
        Ok(head
            .content_disposition
            .as_deref()
            .and_then(filename_from_disposition))
    }

    /// Lists every object under `prefix`, following continuation tokens.
    async fn list_bucket_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StoreResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut token = None;
        loop {
            let page = self.list_page(bucket, prefix, token).await?;
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(objects)
    }

    /// Reads the current scan status; `None` means untagged.
    async fn read_status(&self, bucket: &str, key: &str) -> StoreResult<Option<ScanStatus>> {
        let tags = self.get_object_tags(bucket, key).await?;
        Ok(tags::status_of(&tags))
    }

    /// Writes a scan status and timestamp, keeping unrelated tags.
    ///
    /// This is a plain read-modify-write; two concurrent writers on the same
    /// object can lose one update.
    async fn write_status(&self, bucket: &str, key: &str, status: ScanStatus) -> StoreResult<()> {
        let existing = self.get_object_tags(bucket, key).await?;
        let merged = tags::merge_status(existing, status, Utc::now());
        self.tag_object(bucket, key, merged).await?;
        crate::audit::emit_status_written(bucket, key, status);
        Ok(())
    }
}

/// Extracts the filename from a `Content-Disposition` header value.
///
/// `filename*=` (RFC 5987, percent-encoded) wins over `filename=`.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in header.split(';').map(str::trim) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let value = value.trim();
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                let encoded = encoded.trim_matches('"');
                extended = well_formed_escapes(encoded)
                    .then(|| percent_decode_str(encoded).decode_utf8().ok())
                    .flatten()
                    .map(|name| name.into_owned());
            }
            "filename" => {
                let value = value.trim().trim_matches('"');
                if !value.is_empty() {
                    plain = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    extended.filter(|s| !s.is_empty()).or(plain)
}

/// `percent_decode_str` passes malformed escapes through; reject them instead.
fn well_formed_escapes(encoded: &str) -> bool {
    encoded.split('%').skip(1).all(|rest| {
        rest.as_bytes()
            .get(..2)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    })
}
