//! Whole-bucket audit: rescan everything in parallel chunks and correct
//! status tags that disagree with the result.

use crate::core::{ObjectSummary, ScanRequest, ScanStatus, WorkflowError, WorkflowResult};
use crate::manager::chunk::chunk_objects;
use crate::manager::worker::ArcWorker;
use crate::manager::ScanManager;

use futures::future::join_all;
use std::collections::HashSet;

impl ScanManager {
    /// Audits every object in `bucket`.
    ///
    /// Objects without a size or over the size limit must carry `SKIPPED`;
    /// failures correcting them are logged and do not stop the audit. The
    /// rest is split into chunks, each handed to `worker` on its own task.
    /// Any chunk failure aborts the audit. Every key reported infected that
    /// is not already tagged `INFECTED` is retagged.
    ///
    /// Returns the keys whose tag was corrected to `INFECTED`. If any of
    /// those corrections fails the audit returns [`WorkflowError::Tagging`]
    /// listing them.
    pub async fn audit_bucket(&self, bucket: &str, worker: ArcWorker) -> WorkflowResult<Vec<String>> {
        let objects = self.store.list_bucket_objects(bucket, None).await?;
        let total = objects.len();

        let max = self.config.max_file_size;
        let (too_big, candidates): (Vec<ObjectSummary>, Vec<ObjectSummary>) = objects
            .into_iter()
            .partition(|o| o.size.map_or(true, |size| size > max));

        let chunked = chunk_objects(candidates, self.config.chunk_limits);
        let skipped: Vec<ObjectSummary> = too_big.into_iter().chain(chunked.oversized).collect();

        tracing::info!(
            bucket,
            objects = total,
            chunks = chunked.chunks.len(),
            skipped = skipped.len(),
            "Starting bucket audit"
        );

        for object in &skipped {
            self.ensure_status(bucket, &object.key, ScanStatus::Skipped).await;
        }

        let handles: Vec<_> = chunked
            .chunks
            .iter()
            .map(|chunk| {
                let worker = ArcWorker::clone(&worker);
                let request = ScanRequest::new(bucket, chunk.iter().map(|o| o.key.clone()).collect());
                tokio::spawn(async move { worker.scan_batch(request).await })
            })
            .collect();

        let mut infected = Vec::new();
        let mut seen = HashSet::new();
        let mut first_error = None;

        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            let outcome = joined
                .map_err(|e| WorkflowError::worker("join", format!("chunk {index} task failed: {e}")))
                .and_then(|result| result);
            match outcome {
                Ok(keys) => {
                    for key in keys {
                        if seen.insert(key.clone()) {
                            infected.push(key);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(bucket, chunk = index, error = %e, "Audit chunk failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let mut corrected = Vec::new();
        let mut failed = Vec::new();

        for key in infected {
            let previous = match self.store.read_status(bucket, &key).await {
                Ok(Some(ScanStatus::Infected)) => continue,
                Ok(previous) => previous,
                Err(e) => {
                    tracing::warn!(bucket, key = %key, error = %e, "Could not read status");
                    failed.push(key);
                    continue;
                }
            };

            match self.store.write_status(bucket, &key, ScanStatus::Infected).await {
                Ok(()) => {
                    crate::audit::emit_tag_corrected(bucket, &key, previous, ScanStatus::Infected);
                    corrected.push(key);
                }
                Err(e) => {
                    tracing::warn!(bucket, key = %key, error = %e, "Could not correct status");
                    failed.push(key);
                }
            }
        }

        if !failed.is_empty() {
            return Err(WorkflowError::Tagging { failed });
        }

        crate::audit::emit_audit_completed(
            bucket,
            total,
            chunked.chunks.len(),
            skipped.len(),
            &corrected,
        );
        Ok(corrected)
    }

    async fn ensure_status(&self, bucket: &str, key: &str, status: ScanStatus) {
        let previous = match self.store.read_status(bucket, key).await {
            Ok(previous) if previous == Some(status) => return,
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(bucket, key, error = %e, "Could not read status");
                return;
            }
        };

        match self.store.write_status(bucket, key, status).await {
            Ok(()) => crate::audit::emit_tag_corrected(bucket, key, previous, status),
            Err(e) => tracing::warn!(bucket, key, error = %e, "Could not correct status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::mock::{MockScanner, EICAR};
    use crate::core::{tags, ScanRequest, ScanStatus, Tag, WorkflowError, WorkflowResult};
    use crate::manager::worker::{ArcWorker, AuditWorker, BatchWorker};
    use crate::manager::{ScanManager, ScanManagerConfig};
    use crate::store::{InMemoryStore, StoredObject};

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tagged(status: ScanStatus) -> Vec<Tag> {
        vec![Tag::new(tags::STATUS_TAG, status.as_str())]
    }

    fn manager(store: Arc<InMemoryStore>, max: u64) -> Arc<ScanManager> {
        Arc::new(
            ScanManager::builder()
                .with_arc_store(store)
                .with_scanner(MockScanner::new())
                .with_config(ScanManagerConfig::default().with_max_file_size(max))
                .build()
                .unwrap(),
        )
    }

    /// 20 clean, 2 untagged EICAR, 2 over the size limit.
    fn populate(store: &InMemoryStore) {
        for i in 0..20 {
            store.insert_object(
                "b",
                format!("clean/{i:02}.txt"),
                StoredObject::new(format!("row {i}\n").into_bytes()).with_tags(tagged(ScanStatus::Clean)),
            );
        }
        store.insert("b", "bad/one.txt", EICAR.as_bytes().to_vec());
        store.insert("b", "bad/two.txt", EICAR.as_bytes().to_vec());
        store.insert("b", "big/a.txt", vec![b'a'; 4096]);
        store.insert_object(
            "b",
            "big/b.txt",
            StoredObject::new(vec![b'b'; 4096]).with_tags(tagged(ScanStatus::Clean)),
        );
    }

    #[tokio::test]
    async fn test_audit_corrects_infected_and_oversize() {
        let store = Arc::new(InMemoryStore::new().with_page_size(7));
        populate(&store);
        let manager = manager(store.clone(), 1024);
        let worker: ArcWorker = Arc::new(AuditWorker::new(manager.clone()));

        let mut corrected = manager.audit_bucket("b", worker).await.unwrap();
        corrected.sort();

        assert_eq!(corrected, vec!["bad/one.txt", "bad/two.txt"]);
        assert_eq!(store.status("b", "bad/one.txt").as_deref(), Some("INFECTED"));
        assert_eq!(store.status("b", "bad/two.txt").as_deref(), Some("INFECTED"));
        assert_eq!(store.status("b", "big/a.txt").as_deref(), Some("SKIPPED"));
        assert_eq!(store.status("b", "big/b.txt").as_deref(), Some("SKIPPED"));
        for i in 0..20 {
            let key = format!("clean/{i:02}.txt");
            assert_eq!(store.status("b", &key).as_deref(), Some("CLEAN"));
            assert_eq!(store.tag_write_count("b", &key), 0);
        }
    }

    #[tokio::test]
    async fn test_audit_rewrites_only_mistagged_infected() {
        let store = Arc::new(InMemoryStore::new().with_page_size(5));
        for i in 0..20 {
            store.insert_object(
                "b",
                format!("clean/{i:02}.txt"),
                StoredObject::new(format!("row {i}\n").into_bytes()).with_tags(tagged(ScanStatus::Clean)),
            );
        }
        for key in ["mistagged/1.txt", "mistagged/2.txt"] {
            store.insert_object(
                "b",
                key,
                StoredObject::new(EICAR.as_bytes().to_vec()).with_tags(tagged(ScanStatus::Clean)),
            );
        }
        for key in ["known/1.txt", "known/2.txt"] {
            store.insert_object(
                "b",
                key,
                StoredObject::new(EICAR.as_bytes().to_vec()).with_tags(tagged(ScanStatus::Infected)),
            );
        }
        let manager = manager(store.clone(), 1024);
        let worker: ArcWorker = Arc::new(AuditWorker::new(manager.clone()));

        let mut corrected = manager.audit_bucket("b", worker).await.unwrap();
        corrected.sort();

        assert_eq!(corrected, vec!["mistagged/1.txt", "mistagged/2.txt"]);
        for key in ["mistagged/1.txt", "mistagged/2.txt", "known/1.txt", "known/2.txt"] {
            assert_eq!(store.status("b", key).as_deref(), Some("INFECTED"));
        }
        assert_eq!(store.tag_write_count("b", "known/1.txt"), 0);
        assert_eq!(store.tag_write_count("b", "known/2.txt"), 0);
        for i in 0..20 {
            assert_eq!(store.tag_write_count("b", &format!("clean/{i:02}.txt")), 0);
        }
    }

    #[tokio::test]
    async fn test_audit_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        populate(&store);
        let manager = manager(store.clone(), 1024);
        let worker: ArcWorker = Arc::new(AuditWorker::new(manager.clone()));

        manager.audit_bucket("b", worker.clone()).await.unwrap();
        let writes: Vec<u64> = store
            .keys("b")
            .iter()
            .map(|k| store.tag_write_count("b", k))
            .collect();

        let corrected = manager.audit_bucket("b", worker).await.unwrap();
        let writes_after: Vec<u64> = store
            .keys("b")
            .iter()
            .map(|k| store.tag_write_count("b", k))
            .collect();

        assert!(corrected.is_empty());
        assert_eq!(writes, writes_after);
    }

    #[tokio::test]
    async fn test_audit_sizeless_object_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_object("b", "odd", StoredObject::new(b"x".to_vec()).without_size());
        let manager = manager(store.clone(), 1024);
        let worker: ArcWorker = Arc::new(AuditWorker::new(manager.clone()));

        assert!(manager.audit_bucket("b", worker).await.unwrap().is_empty());
        assert_eq!(store.status("b", "odd").as_deref(), Some("SKIPPED"));
    }

    #[derive(Debug, Default)]
    struct FailsSecondChunk {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BatchWorker for FailsSecondChunk {
        async fn scan_batch(&self, request: ScanRequest) -> WorkflowResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.keys.iter().any(|k| k == "clean/19.txt") {
                Err(WorkflowError::worker("scan", "chunk exploded"))
            } else {
                Ok(request.keys.into_iter().filter(|k| k.starts_with("bad/")).collect())
            }
        }
    }

    #[tokio::test]
    async fn test_audit_aborts_on_chunk_failure() {
        let store = Arc::new(InMemoryStore::new());
        populate(&store);
        let manager = manager(store.clone(), 1024);
        let worker = Arc::new(FailsSecondChunk::default());

        let err = manager
            .audit_bucket("b", worker.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Worker { .. }));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.status("b", "bad/one.txt"), None);
    }

    #[tokio::test]
    async fn test_audit_reports_tagging_failures() {
        let store = Arc::new(InMemoryStore::new());
        populate(&store);
        store.fail_tag_writes("bad/two.txt");
        let manager = manager(store.clone(), 1024);
        let worker: ArcWorker = Arc::new(AuditWorker::new(manager.clone()));

        match manager.audit_bucket("b", worker).await {
            Err(WorkflowError::Tagging { failed }) => assert_eq!(failed, vec!["bad/two.txt"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.status("b", "bad/one.txt").as_deref(), Some("INFECTED"));
    }

    #[tokio::test]
    async fn test_audit_skipped_tag_failure_is_not_fatal() {
        let store = Arc::new(InMemoryStore::new());
        populate(&store);
        store.fail_tag_writes("big/a.txt");
        let manager = manager(store.clone(), 1024);
        let worker: ArcWorker = Arc::new(AuditWorker::new(manager.clone()));

        let corrected = manager.audit_bucket("b", worker).await.unwrap();
        assert_eq!(corrected.len(), 2);
        assert_eq!(store.status("b", "big/a.txt"), None);
    }
}
