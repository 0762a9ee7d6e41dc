//! Rescan of objects that were never scanned or whose last scan failed.

use crate::core::{ScanRequest, ScanStatus, WorkflowResult};
use crate::manager::worker::BatchWorker;
use crate::manager::ScanManager;
use crate::store::list_pages;

use futures::TryStreamExt;
use std::collections::HashSet;

impl ScanManager {
    /// Rescans every object in `bucket` that is untagged or tagged `ERROR`.
    ///
    /// The bucket is walked page by page; pending keys are handed to `worker`
    /// in batches of `rescan_batch_size`, so memory stays bounded by one page
    /// plus one batch. Objects deleted while the walk is in progress are
    /// skipped. Any other failure, including a failed worker batch, aborts.
    ///
    /// Returns the keys the worker reported infected.
    pub async fn rescan_failed_files(
        &self,
        bucket: &str,
        worker: &dyn BatchWorker,
    ) -> WorkflowResult<Vec<String>> {
        let batch_size = self.config.rescan_batch_size.max(1);
        let pages = list_pages(self.store.as_ref(), bucket, None);
        futures::pin_mut!(pages);

        let mut pending: Vec<String> = Vec::with_capacity(batch_size);
        let mut infected = Vec::new();
        let mut examined = 0usize;
        let mut rescanned = 0usize;

        while let Some(page) = pages.try_next().await? {
            for object in page {
                examined += 1;
                let status = match self.store.read_status(bucket, &object.key).await {
                    Ok(status) => status,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(bucket, key = %object.key, "Object vanished during rescan");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                if ScanStatus::needs_rescan(status) {
                    pending.push(object.key);
                }
                if pending.len() >= batch_size {
                    rescanned += pending.len();
                    infected.extend(Self::flush(bucket, worker, &mut pending).await?);
                }
            }
        }

        if !pending.is_empty() {
            rescanned += pending.len();
            infected.extend(Self::flush(bucket, worker, &mut pending).await?);
        }

        let mut seen = HashSet::new();
        infected.retain(|key| seen.insert(key.clone()));

        crate::audit::emit_rescan_completed(bucket, examined, rescanned, &infected);
        Ok(infected)
    }

    async fn flush(
        bucket: &str,
        worker: &dyn BatchWorker,
        pending: &mut Vec<String>,
    ) -> WorkflowResult<Vec<String>> {
        let keys = std::mem::take(pending);
        tracing::info!(bucket, keys = keys.len(), "Dispatching rescan batch");
        worker.scan_batch(ScanRequest::new(bucket, keys)).await
    }
}
