//! Core types and traits for the bucket-scan library.
//!
//! - [`types`] - Scan status, tags, object summaries and batch requests
//! - [`tags`] - Tag layout, timestamp sanitising and status merging
//! - [`traits`] - The `Scanner` and `DefinitionsSource` traits
//! - [`error`] - Structured error types

pub mod error;
pub mod tags;
pub mod traits;
pub mod types;

pub use error::{
    ConfigError, ScanError, ScanResult, StoreError, StoreResult, WorkflowError, WorkflowResult,
};
pub use traits::{ArcScanner, BoxedScanner, DefinitionsSource, Scanner};
pub use types::{ListPage, ObjectHead, ObjectSummary, ScanRequest, ScanStatus, Tag};
