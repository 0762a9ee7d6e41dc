//! Mock scanner for testing.
//!
//! The mock walks the scan directory the way a real engine does and reports
//! every file containing the EICAR test marker. It renders its findings in
//! ClamAV's report format and runs them through the same parser as the real
//! backends.

use crate::backends::output;
use crate::core::{ScanError, Scanner};

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Substring of the EICAR antivirus test file.
pub const EICAR_MARKER: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

/// The complete EICAR antivirus test string.
pub const EICAR: &str =
    r"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// A mock scanner for testing purposes.
///
/// # Examples
///
/// ```rust
/// use bucket_scan::backends::MockScanner;
///
/// // Reports files containing the EICAR marker
/// let scanner = MockScanner::new();
///
/// // Fails every scan
/// let broken = MockScanner::failing();
/// ```
#[derive(Debug, Default)]
pub struct MockScanner {
    fail: AtomicBool,
    scan_count: AtomicU64,
}

impl MockScanner {
    /// Creates a scanner that detects the EICAR marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scanner whose every scan fails.
    pub fn failing() -> Self {
        let scanner = Self::new();
        scanner.set_failing(true);
        scanner
    }

    /// Turns forced failure on or off.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Returns the number of scans attempted.
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::Relaxed)
    }

    async fn report(dir: &Path) -> Result<String, ScanError> {
        let mut lines = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let data = tokio::fs::read(&path).await?;
            let infected = data
                .windows(EICAR_MARKER.len())
                .any(|window| window == EICAR_MARKER);
            if infected {
                lines.push(format!("{}: Eicar-Test-Signature FOUND", path.display()));
            } else {
                lines.push(format!("{}: OK", path.display()));
            }
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl Scanner for MockScanner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn scan(&self, dir: &Path) -> Result<Vec<String>, ScanError> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);

        if self.fail.load(Ordering::Relaxed) {
            return Err(ScanError::ScannerFailed {
                program: "mock".to_string(),
                exit_code: Some(2),
                stderr: "simulated failure".to_string(),
            });
        }

        let report = Self::report(dir).await?;
        Ok(output::parse_infected(&report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scanner_detects_eicar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clean.tmp"), b"hello").unwrap();
        std::fs::write(dir.path().join("bad.tmp"), EICAR).unwrap();

        let scanner = MockScanner::new();
        let infected = scanner.scan(dir.path()).await.unwrap();

        assert_eq!(infected, vec!["bad.tmp"]);
        assert_eq!(scanner.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_scanner_failing() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = MockScanner::failing();
        assert!(scanner.scan(dir.path()).await.is_err());

        scanner.set_failing(false);
        assert!(scanner.scan(dir.path()).await.unwrap().is_empty());
        assert_eq!(scanner.scan_count(), 2);
    }
}
