//! Core traits for the bucket-scan library.
//!
//! This module defines the `Scanner` trait that both scanning strategies
//! implement, the `DefinitionsSource` trait for definitions updaters, plus
//! shared pointer aliases.

use crate::core::error::ScanError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// A directory-oriented malware scanning engine.
///
/// The engine is handed a flat directory of files and reports the bare file
/// names (no directory prefix) of every infected file it found.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; workflows share them across tasks.
/// - `Ok(vec![])` means the scan completed and nothing was found. Any failure
///   to complete the scan must be an `Err`, never an empty list.
/// - Implementations enforce their own timeout.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use bucket_scan::core::{Scanner, ScanError};
/// use async_trait::async_trait;
/// use std::path::Path;
///
/// #[derive(Debug)]
/// struct NothingFound;
///
/// #[async_trait]
/// impl Scanner for NothingFound {
///     fn name(&self) -> &str {
///         "nothing-found"
///     }
///
///     async fn scan(&self, _dir: &Path) -> Result<Vec<String>, ScanError> {
///         Ok(Vec::new())
///     }
/// }
/// ```
#[async_trait]
pub trait Scanner: Send + Sync + Debug {
    /// Returns a stable identifier such as `"clamscan"`.
    fn name(&self) -> &str;

    /// Scans every file in `dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(names)` - The scan completed; `names` are the infected file names.
    /// * `Err(ScanError)` - The scan did not complete.
    async fn scan(&self, dir: &Path) -> Result<Vec<String>, ScanError>;
}

/// Produces a fresh set of virus definition files.
#[async_trait]
pub trait DefinitionsSource: Send + Sync + Debug {
    /// Writes current definition files into `target_dir`.
    async fn fetch_definitions(&self, target_dir: &Path) -> Result<(), ScanError>;
}

/// A boxed scanner for type-erased storage.
pub type BoxedScanner = Box<dyn Scanner>;

/// An arc-wrapped scanner for shared ownership.
pub type ArcScanner = std::sync::Arc<dyn Scanner>;
