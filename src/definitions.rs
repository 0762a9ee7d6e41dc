//! Distribution of virus definitions through the object store.
//!
//! One job refreshes the definitions with the updater and publishes them
//! under a key prefix; scanners download that prefix before scanning. Each
//! published file carries an `uploadedAt` tag, which is how staleness is
//! judged.

use crate::core::tags::{timestamp_value, UPLOADED_AT_TAG};
use crate::core::{DefinitionsSource, ScanError, Tag, WorkflowResult};
use crate::materialize::ScratchDir;
use crate::store::ObjectStore;

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

/// Default key prefix of the published definitions.
pub const DEFAULT_DEFINITIONS_PREFIX: &str = "lambda/clamav";

/// Where definitions live in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionsLocation {
    /// Bucket holding the definitions.
    pub bucket: String,
    /// Key prefix, without a trailing slash.
    pub prefix: String,
}

impl DefinitionsLocation {
    /// Creates a location. Leading and trailing slashes on `prefix` are dropped.
    pub fn new(bucket: impl Into<String>, prefix: impl AsRef<str>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.as_ref().trim_matches('/').to_string(),
        }
    }

    /// Returns the key a definition file named `name` is stored under.
    pub fn key_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    fn list_prefix(&self) -> Option<String> {
        (!self.prefix.is_empty()).then(|| format!("{}/", self.prefix))
    }

    fn file_name<'k>(&self, key: &'k str) -> Option<&'k str> {
        let name = match self.list_prefix() {
            Some(prefix) => key.strip_prefix(prefix.as_str())?,
            None => key,
        };
        (!name.is_empty() && !name.contains('/')).then_some(name)
    }
}

async fn published_keys(
    store: &dyn ObjectStore,
    location: &DefinitionsLocation,
) -> WorkflowResult<Vec<String>> {
    let prefix = location.list_prefix();
    Ok(store
        .list_bucket_objects(&location.bucket, prefix.as_deref())
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect())
}

/// Downloads every published definition file into `local_dir`.
///
/// Returns the local paths written. Nested keys under the prefix are ignored.
pub async fn download_definitions(
    store: &dyn ObjectStore,
    location: &DefinitionsLocation,
    local_dir: &Path,
) -> WorkflowResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(local_dir).await?;

    let mut written = Vec::new();
    for key in published_keys(store, location).await? {
        let Some(name) = location.file_name(&key) else {
            continue;
        };
        let path = local_dir.join(name);
        store.download_file(&location.bucket, &key, &path).await?;
        written.push(path);
    }

    tracing::info!(
        bucket = %location.bucket,
        prefix = %location.prefix,
        files = written.len(),
        dir = %local_dir.display(),
        "Definitions downloaded"
    );
    Ok(written)
}

/// Fetches fresh definitions with `source` and republishes them.
///
/// Old objects under the prefix are deleted before the new files are
/// uploaded. Each uploaded object is tagged with `uploadedAt`. Returns the
/// uploaded keys.
pub async fn refresh_definitions(
    store: &dyn ObjectStore,
    source: &dyn DefinitionsSource,
    location: &DefinitionsLocation,
    scratch_root: Option<&Path>,
) -> WorkflowResult<Vec<String>> {
    let scratch = ScratchDir::new(scratch_root)?;
    source.fetch_definitions(scratch.path()).await?;

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                files.push((name.to_string(), entry.path()));
            }
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ScanError::internal("definitions updater produced no files").into());
    }

    let old = published_keys(store, location).await?;
    store.delete_objects(&location.bucket, &old).await?;

    let uploaded_at = timestamp_value(Utc::now());
    let mut uploaded = Vec::with_capacity(files.len());
    for (name, path) in &files {
        let key = location.key_for(name);
        store.upload_object(&location.bucket, &key, path).await?;
        store
            .tag_object(
                &location.bucket,
                &key,
                vec![Tag::new(UPLOADED_AT_TAG, uploaded_at.clone())],
            )
            .await?;
        uploaded.push(key);
    }

    crate::audit::emit_definitions_refreshed(&location.bucket, &location.prefix, old.len(), &uploaded);
    Ok(uploaded)
}

/// Returns how long ago the newest definition file was published.
///
/// `None` means nothing is published, or no file carries a readable
/// `uploadedAt` tag.
pub async fn definitions_age(
    store: &dyn ObjectStore,
    location: &DefinitionsLocation,
    now: DateTime<Utc>,
) -> WorkflowResult<Option<Duration>> {
    let mut newest: Option<DateTime<Utc>> = None;

    for key in published_keys(store, location).await? {
        let tags = store.get_object_tags(&location.bucket, &key).await?;
        let uploaded = tags
            .iter()
            .find(|t| t.key == UPLOADED_AT_TAG)
            .and_then(|t| DateTime::parse_from_rfc3339(&t.value).ok())
            .map(|at| at.with_timezone(&Utc));
        if let Some(at) = uploaded {
            newest = Some(newest.map_or(at, |n| n.max(at)));
        }
    }

    Ok(newest.map(|at| now - at))
}

/// Refreshes the definitions unless the published set is younger than
/// `max_age`. Returns `true` if a refresh ran.
pub async fn refresh_if_stale(
    store: &dyn ObjectStore,
    source: &dyn DefinitionsSource,
    location: &DefinitionsLocation,
    scratch_root: Option<&Path>,
    max_age: Duration,
) -> WorkflowResult<bool> {
    match definitions_age(store, location, Utc::now()).await? {
        Some(age) if age < max_age => {
            tracing::info!(
                bucket = %location.bucket,
                prefix = %location.prefix,
                age_secs = age.num_seconds(),
                "Definitions are fresh, skipping refresh"
            );
            Ok(false)
        }
        _ => {
            refresh_definitions(store, source, location, scratch_root).await?;
            Ok(true)
        }
    }
}
