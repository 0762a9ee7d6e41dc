//! In-memory object store.
//!
//! Used by tests and local runs. Listings are paginated with a configurable
//! page size so pagination paths get exercised, and tag writes can be made
//! to fail per key.

use crate::core::{ListPage, ObjectHead, ObjectSummary, StoreError, StoreResult, Tag};
use crate::core::tags;
use crate::store::ObjectStore;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An object held by [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body.
    pub data: Vec<u8>,
    /// Stored content type.
    pub content_type: Option<String>,
    /// Stored `Content-Disposition` header.
    pub content_disposition: Option<String>,
    /// Current tag set.
    pub tags: Vec<Tag>,
    /// Omit the size from listings and head requests.
    pub hide_size: bool,
    tag_writes: u64,
}

impl StoredObject {
    /// Creates an object with the given body.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Sets the original filename through a `Content-Disposition` header.
    pub fn with_original_filename(mut self, filename: &str) -> Self {
        self.content_disposition = Some(format!("attachment; filename=\"{filename}\""));
        self
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the initial tag set.
    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// Hides the size, as some listings do for odd objects.
    pub fn without_size(mut self) -> Self {
        self.hide_size = true;
        self
    }

    fn size(&self) -> Option<u64> {
        (!self.hide_size).then_some(self.data.len() as u64)
    }
}

type ObjectKey = (String, String);

/// An object store held entirely in memory.
#[derive(Debug)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<ObjectKey, StoredObject>>,
    failing_tag_writes: RwLock<HashSet<String>>,
    page_size: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store with a page size of 1000.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            failing_tag_writes: RwLock::new(HashSet::new()),
            page_size: 1000,
        }
    }

    /// Sets the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn objects(&self) -> RwLockReadGuard<'_, BTreeMap<ObjectKey, StoredObject>> {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn objects_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<ObjectKey, StoredObject>> {
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_object<T>(
        &self,
        bucket: &str,
        key: &str,
        f: impl FnOnce(&StoredObject) -> T,
    ) -> StoreResult<T> {
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(f)
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    /// Stores `data` under `key`.
    pub fn insert(&self, bucket: &str, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.insert_object(bucket, key, StoredObject::new(data));
    }

    /// Stores a fully described object under `key`.
    pub fn insert_object(&self, bucket: &str, key: impl Into<String>, object: StoredObject) {
        self.objects_mut()
            .insert((bucket.to_string(), key.into()), object);
    }

    /// Returns a copy of the object's tags, if it exists.
    pub fn tags(&self, bucket: &str, key: &str) -> Option<Vec<Tag>> {
        self.with_object(bucket, key, |o| o.tags.clone()).ok()
    }

    /// Returns the scan status tag value, if any.
    pub fn status(&self, bucket: &str, key: &str) -> Option<String> {
        self.tags(bucket, key)?
            .into_iter()
            .find(|t| t.key == tags::STATUS_TAG)
            .map(|t| t.value)
    }

    /// Returns how many times the object's tags were written.
    pub fn tag_write_count(&self, bucket: &str, key: &str) -> u64 {
        self.with_object(bucket, key, |o| o.tag_writes).unwrap_or(0)
    }

    /// Returns the keys stored in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Makes every tag write to `key` fail.
    pub fn fail_tag_writes(&self, key: impl Into<String>) {
        self.failing_tag_writes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into());
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        self.with_object(bucket, key, |o| ObjectHead {
            size: o.size(),
            content_type: o.content_type.clone(),
            content_disposition: o.content_disposition.clone(),
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> StoreResult<ListPage> {
        let objects = self.objects();
        let mut matching = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && prefix.map_or(true, |p| k.starts_with(p)))
            .filter(|((_, k), _)| token.as_deref().map_or(true, |t| k.as_str() > t))
            .map(|((_, k), o)| ObjectSummary::new(k.clone(), o.size()));

        let page: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).collect();
        let next_token = match (matching.next(), page.last()) {
            (Some(_), Some(last)) => Some(last.key.clone()),
            _ => None,
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn download_file(&self, bucket: &str, key: &str, local_path: &Path) -> StoreResult<()> {
        let data = self.with_object(bucket, key, |o| o.data.clone())?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn get_object_tags(&self, bucket: &str, key: &str) -> StoreResult<Vec<Tag>> {
        self.with_object(bucket, key, |o| o.tags.clone())
    }

    async fn tag_object(&self, bucket: &str, key: &str, tags: Vec<Tag>) -> StoreResult<()> {
        let failing = self
            .failing_tag_writes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(key);
        if failing {
            return Err(StoreError::backend("tag_object", "injected tagging failure"));
        }

        let mut objects = self.objects_mut();
        let object = objects
            .get_mut(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StoreError::not_found(bucket, key))?;
        object.tags = tags;
        object.tag_writes += 1;
        Ok(())
    }

    async fn upload_object(&self, bucket: &str, key: &str, local_path: &Path) -> StoreResult<()> {
        let data = tokio::fs::read(local_path).await?;
        self.insert(bucket, key, data);
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()> {
        let mut objects = self.objects_mut();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}
