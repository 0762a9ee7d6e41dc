//! Download a batch of objects, scan it once, and verify file types.

use crate::core::{Scanner, WorkflowResult};
use crate::materialize::filetype;
use crate::materialize::scratch::LocalNames;
use crate::store::ObjectStore;

use std::collections::HashSet;
use std::path::Path;

/// Scans `keys` from `bucket` using `scan_dir` as the flat scan directory.
///
/// Returns the keys that are infected or whose content does not match their
/// declared type, de-duplicated, infected keys first.
///
/// Any download failure aborts the batch: scanning an incomplete directory
/// would report the missing files as clean.
pub async fn scan_files(
    store: &dyn ObjectStore,
    scanner: &dyn Scanner,
    bucket: &str,
    keys: &[String],
    scan_dir: &Path,
) -> WorkflowResult<Vec<String>> {
    let mut seen = HashSet::new();
    let keys: Vec<&String> = keys.iter().filter(|k| seen.insert(k.as_str())).collect();
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let mut names = LocalNames::new();
    for key in keys {
        let name = names.allocate(key);
        let local = LocalNames::path_in(scan_dir, &name);
        store.download_file(bucket, key, &local).await?;
    }

    tracing::debug!(
        bucket,
        files = names.len(),
        engine = scanner.name(),
        dir = %scan_dir.display(),
        "Batch downloaded, scanning"
    );

    let infected_names = scanner.scan(scan_dir).await?;

    let mut flagged = Vec::new();
    let mut flagged_set = HashSet::new();

    for name in &infected_names {
        match names.key_for(name) {
            Some(key) => {
                if flagged_set.insert(key.to_string()) {
                    flagged.push(key.to_string());
                }
            }
            None => tracing::warn!(bucket, file = %name, "Scanner reported an unknown file"),
        }
    }

    for (name, key) in names.iter() {
        let original = match store.get_original_filename(bucket, key).await? {
            Some(original) => original,
            None => key_basename(key).to_string(),
        };
        let check = filetype::check_file(&LocalNames::path_in(scan_dir, name), &original).await?;
        if check.is_mismatch() {
            tracing::warn!(
                bucket,
                key,
                original_filename = %original,
                declared = check.declared,
                detected = ?check.detected,
                "Content does not match declared type"
            );
            if flagged_set.insert(key.to_string()) {
                flagged.push(key.to_string());
            }
        }
    }

    Ok(flagged)
}

fn key_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockScanner, EICAR};
    use crate::core::WorkflowError;
    use crate::store::{InMemoryStore, StoredObject};

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_scan_files_union_of_infected_and_mismatched() {
        let store = InMemoryStore::new();
        store.insert("b", "docs/clean.txt", b"just text\n".to_vec());
        store.insert("b", "docs/eicar.txt", EICAR.as_bytes().to_vec());
        store.insert_object(
            "b",
            "docs/9f1c",
            StoredObject::new(b"MZ\x90\x00binary".to_vec()).with_original_filename("resume.pdf"),
        );
        let scanner = MockScanner::new();
        let dir = tempfile::tempdir().unwrap();

        let flagged = scan_files(
            &store,
            &scanner,
            "b",
            &keys(&["docs/clean.txt", "docs/eicar.txt", "docs/9f1c", "docs/eicar.txt"]),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(flagged, keys(&["docs/eicar.txt", "docs/9f1c"]));
        assert_eq!(scanner.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_files_download_failure_aborts() {
        let store = InMemoryStore::new();
        store.insert("b", "a.txt", b"ok".to_vec());
        let scanner = MockScanner::new();
        let dir = tempfile::tempdir().unwrap();

        let err = scan_files(&store, &scanner, "b", &keys(&["a.txt", "gone.txt"]), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Store(ref e) if e.is_not_found()));
        assert_eq!(scanner.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_files_scanner_error_propagates() {
        let store = InMemoryStore::new();
        store.insert("b", "a.txt", b"ok".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let err = scan_files(&store, &MockScanner::failing(), "b", &keys(&["a.txt"]), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Scan(_)));
    }

    #[tokio::test]
    async fn test_scan_files_empty_batch() {
        let store = InMemoryStore::new();
        let scanner = MockScanner::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_files(&store, &scanner, "b", &[], dir.path()).await.unwrap().is_empty());
        assert_eq!(scanner.scan_count(), 0);
    }

    #[test]
    fn test_key_basename() {
        assert_eq!(key_basename("a/b/c.pdf"), "c.pdf");
        assert_eq!(key_basename("c.pdf"), "c.pdf");
    }
}
