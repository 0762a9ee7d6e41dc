//! The main scan manager implementation.

use crate::core::{ArcScanner, ConfigError, ScanStatus, Scanner, WorkflowResult};
use crate::manager::chunk::ChunkLimits;
use crate::materialize::{self, ScratchDir};
use crate::store::{ArcStore, ObjectStore};

use std::path::PathBuf;
use std::sync::Arc;

/// Default per-object size limit for scanning: 300 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 314_572_800;

/// Default number of keys handed to one rescan worker invocation.
pub const DEFAULT_RESCAN_BATCH_SIZE: usize = 50;

/// Configuration for the scan manager.
#[derive(Debug, Clone)]
pub struct ScanManagerConfig {
    /// Objects larger than this are tagged `SKIPPED` instead of scanned.
    pub max_file_size: u64,

    /// Chunk bounds used by bucket audits.
    pub chunk_limits: ChunkLimits,

    /// Number of keys per rescan worker invocation.
    pub rescan_batch_size: usize,

    /// Parent directory for per-invocation scratch directories.
    pub scratch_root: Option<PathBuf>,
}

impl Default for ScanManagerConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_limits: ChunkLimits::default(),
            rescan_batch_size: DEFAULT_RESCAN_BATCH_SIZE,
            scratch_root: None,
        }
    }
}

impl ScanManagerConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum scannable object size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Sets the audit chunk bounds.
    pub fn with_chunk_limits(mut self, limits: ChunkLimits) -> Self {
        self.chunk_limits = limits;
        self
    }

    /// Sets the rescan batch size. Zero is treated as one.
    pub fn with_rescan_batch_size(mut self, size: usize) -> Self {
        self.rescan_batch_size = size.max(1);
        self
    }

    /// Sets the scratch root directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

/// Builder for creating a `ScanManager`.
#[derive(Default)]
pub struct ScanManagerBuilder {
    store: Option<ArcStore>,
    scanner: Option<ArcScanner>,
    config: ScanManagerConfig,
}

impl ScanManagerBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the object store.
    pub fn with_store<S: ObjectStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets an object store wrapped in an Arc.
    pub fn with_arc_store(mut self, store: ArcStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the scanner.
    pub fn with_scanner<S: Scanner + 'static>(mut self, scanner: S) -> Self {
        self.scanner = Some(Arc::new(scanner));
        self
    }

    /// Sets a scanner wrapped in an Arc.
    pub fn with_arc_scanner(mut self, scanner: ArcScanner) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ScanManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the scan manager.
    pub fn build(self) -> Result<ScanManager, ConfigError> {
        let store = self.store.ok_or(ConfigError::Missing { name: "store" })?;
        let scanner = self.scanner.ok_or(ConfigError::Missing { name: "scanner" })?;

        Ok(ScanManager {
            store,
            scanner,
            config: self.config,
        })
    }
}

/// Orchestrates scans of objects held in an [`ObjectStore`].
///
/// Single-object scans live here; bucket audits and failed-file rescans are
/// implemented in the sibling `bucket_audit` and `reconcile` modules.
pub struct ScanManager {
    pub(crate) store: ArcStore,
    pub(crate) scanner: ArcScanner,
    pub(crate) config: ScanManagerConfig,
}

impl ScanManager {
    /// Creates a new builder.
    pub fn builder() -> ScanManagerBuilder {
        ScanManagerBuilder::new()
    }

    /// Runs the batch download-scan-verify operation in a fresh scratch
    /// directory, removed afterwards whatever the outcome.
    ///
    /// Returns the keys that are infected or whose content does not match
    /// their declared type.
    pub async fn scan_files(&self, bucket: &str, keys: &[String]) -> WorkflowResult<Vec<String>> {
        let scratch = ScratchDir::new(self.config.scratch_root.as_deref())?;
        materialize::scan_files(
            self.store.as_ref(),
            self.scanner.as_ref(),
            bucket,
            keys,
            scratch.path(),
        )
        .await
    }

    /// Scans a single object and tags it with the result.
    ///
    /// Objects over the size limit are tagged `SKIPPED` without invoking the
    /// scanner. A scan failure is recorded as `ERROR` so the object is picked
    /// up by the next rescan. Failing to read the size or to write the tag
    /// is an error.
    pub async fn scan_file(&self, bucket: &str, key: &str) -> WorkflowResult<ScanStatus> {
        let size = self.store.size_of(bucket, key).await?;

        let status = if size > self.config.max_file_size {
            tracing::info!(
                bucket,
                key,
                size,
                max_file_size = self.config.max_file_size,
                "Object too large, skipping scan"
            );
            ScanStatus::Skipped
        } else {
            match self.scan_files(bucket, &[key.to_string()]).await {
                Ok(flagged) if flagged.iter().any(|k| k == key) => ScanStatus::Infected,
                Ok(_) => ScanStatus::Clean,
                Err(e) => {
                    tracing::warn!(bucket, key, error = %e, "Scan failed");
                    ScanStatus::Error
                }
            }
        };

        self.store.write_status(bucket, key, status).await?;

        tracing::info!(bucket, key, size, status = %status, "Object scanned");
        Ok(status)
    }

    /// Rescans one object and tags it `CLEAN`, `INFECTED` or `SKIPPED`.
    ///
    /// Unlike [`ScanManager::scan_file`], scan failures are returned instead
    /// of being recorded, so the existing tag is left for the next attempt.
    pub async fn rescan_key(&self, bucket: &str, key: &str) -> WorkflowResult<ScanStatus> {
        let size = self.store.size_of(bucket, key).await?;

        let status = if size > self.config.max_file_size {
            ScanStatus::Skipped
        } else {
            let flagged = self.scan_files(bucket, &[key.to_string()]).await?;
            if flagged.iter().any(|k| k == key) {
                ScanStatus::Infected
            } else {
                ScanStatus::Clean
            }
        };

        self.store.write_status(bucket, key, status).await?;
        Ok(status)
    }

    /// Returns the object store.
    pub fn store(&self) -> &ArcStore {
        &self.store
    }

    /// Returns the scanner.
    pub fn scanner(&self) -> &ArcScanner {
        &self.scanner
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ScanManagerConfig {
        &self.config
    }
}

impl std::fmt::Debug for ScanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanManager")
            .field("store", &self.store)
            .field("scanner", &self.scanner.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockScanner, EICAR};
    use crate::core::WorkflowError;
    use crate::store::{InMemoryStore, StoredObject};

    fn manager(store: Arc<InMemoryStore>, scanner: Arc<MockScanner>) -> ScanManager {
        ScanManager::builder()
            .with_arc_store(store)
            .with_arc_scanner(scanner)
            .with_config(ScanManagerConfig::default().with_max_file_size(1024))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_scan_file_clean() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "notes.txt", b"hello\n".to_vec());
        let scanner = Arc::new(MockScanner::new());

        let status = manager(store.clone(), scanner.clone())
            .scan_file("b", "notes.txt")
            .await
            .unwrap();

        assert_eq!(status, ScanStatus::Clean);
        assert_eq!(store.status("b", "notes.txt").as_deref(), Some("CLEAN"));
        assert_eq!(scanner.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_file_infected() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "eicar.txt", EICAR.as_bytes().to_vec());
        let scanner = Arc::new(MockScanner::new());

        let status = manager(store.clone(), scanner)
            .scan_file("b", "eicar.txt")
            .await
            .unwrap();

        assert_eq!(status, ScanStatus::Infected);
        assert_eq!(store.status("b", "eicar.txt").as_deref(), Some("INFECTED"));
    }

    #[tokio::test]
    async fn test_scan_file_type_mismatch_is_infected() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_object(
            "b",
            "uploads/abc",
            StoredObject::new(b"MZ\x90\x00payload".to_vec()).with_original_filename("cv.pdf"),
        );
        let status = manager(store.clone(), Arc::new(MockScanner::new()))
            .scan_file("b", "uploads/abc")
            .await
            .unwrap();
        assert_eq!(status, ScanStatus::Infected);
    }

    #[tokio::test]
    async fn test_scan_file_oversize_is_skipped_without_scanning() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "big.txt", vec![b'a'; 2048]);
        let scanner = Arc::new(MockScanner::new());

        let status = manager(store.clone(), scanner.clone())
            .scan_file("b", "big.txt")
            .await
            .unwrap();

        assert_eq!(status, ScanStatus::Skipped);
        assert_eq!(store.status("b", "big.txt").as_deref(), Some("SKIPPED"));
        assert_eq!(scanner.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_file_scanner_failure_is_tagged_error() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "notes.txt", b"hello\n".to_vec());

        let status = manager(store.clone(), Arc::new(MockScanner::failing()))
            .scan_file("b", "notes.txt")
            .await
            .unwrap();

        assert_eq!(status, ScanStatus::Error);
        assert_eq!(store.status("b", "notes.txt").as_deref(), Some("ERROR"));
    }

    #[tokio::test]
    async fn test_scan_file_keeps_unrelated_tags() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_object(
            "b",
            "notes.txt",
            StoredObject::new(b"hello\n".to_vec())
                .with_tags(vec![crate::core::Tag::new("owner", "team-a")]),
        );

        manager(store.clone(), Arc::new(MockScanner::new()))
            .scan_file("b", "notes.txt")
            .await
            .unwrap();

        let tags = store.tags("b", "notes.txt").unwrap();
        assert!(tags.iter().any(|t| t.key == "owner" && t.value == "team-a"));
        assert!(tags.iter().any(|t| t.key == crate::core::tags::TIMESTAMP_TAG));
    }

    #[tokio::test]
    async fn test_scan_file_missing_size_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_object("b", "k", StoredObject::new(b"x".to_vec()).without_size());
        let scanner = Arc::new(MockScanner::new());

        let err = manager(store, scanner.clone())
            .scan_file("b", "k")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Store(_)));
        assert_eq!(scanner.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_file_tag_write_failure_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "notes.txt", b"hello\n".to_vec());
        store.fail_tag_writes("notes.txt");

        let result = manager(store, Arc::new(MockScanner::new()))
            .scan_file("b", "notes.txt")
            .await;
        assert!(matches!(result, Err(WorkflowError::Store(_))));
    }

    #[tokio::test]
    async fn test_rescan_key_propagates_scan_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "notes.txt", b"hello\n".to_vec());

        let result = manager(store.clone(), Arc::new(MockScanner::failing()))
            .rescan_key("b", "notes.txt")
            .await;

        assert!(matches!(result, Err(WorkflowError::Scan(_))));
        assert_eq!(store.status("b", "notes.txt"), None);
    }

    #[test]
    fn test_builder_requires_store_and_scanner() {
        let err = ScanManager::builder()
            .with_scanner(MockScanner::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "store" }));

        let err = ScanManager::builder()
            .with_store(InMemoryStore::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "scanner" }));
    }
}
