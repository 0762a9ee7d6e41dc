//! # bucket-scan
//!
//! Virus scanning and scan-status tag reconciliation for objects held in an
//! S3-style object store.
//!
//! ## Overview
//!
//! Every object carries a `virusScanStatus` tag (`CLEAN`, `INFECTED`,
//! `ERROR` or `SKIPPED`) and a `virusScanTimestamp` tag. Three workflows keep
//! those tags truthful:
//!
//! - **Single scan**: scan one newly uploaded object and tag it
//! - **Bucket audit**: rescan a whole bucket in parallel chunks and correct
//!   disagreeing tags
//! - **Failed-file rescan**: find untagged or `ERROR` objects and hand them
//!   to a rescan worker in batches
//!
//! A file counts as infected when the scanner says so, and also when its
//! content does not match the type implied by its original filename.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bucket_scan::backends::MockScanner;
//! use bucket_scan::store::InMemoryStore;
//! use bucket_scan::ScanManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!     store.insert("uploads", "report.txt", b"quarterly numbers".to_vec());
//!
//!     let manager = ScanManager::builder()
//!         .with_store(store)
//!         .with_scanner(MockScanner::new())
//!         .build()?;
//!
//!     let status = manager.scan_file("uploads", "report.txt").await?;
//!     println!("report.txt is {status}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes the S3 store
//! - `s3` - `S3Store` over `aws-sdk-s3`, and the `bucket-scan` binary
//!
//! ## Architecture
//!
//! - **Core**: status and tag types, traits, and error handling
//! - **Backends**: `clamscan`/`clamdscan` scanners and the `freshclam` updater
//! - **Store**: the object store trait, an in-memory store and S3
//! - **Materialize**: scratch directories, batch download-scan-verify and
//!   file type checks
//! - **Manager**: the three workflows and their batch workers
//! - **Definitions**: publishing and fetching virus definitions
//! - **Audit**: structured logging of every tag change

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod config;
pub mod core;
pub mod definitions;
pub mod manager;
pub mod materialize;
pub mod store;

// Re-export commonly used types at the crate root
pub use crate::core::{
    ConfigError, ScanError, ScanRequest, ScanStatus, Scanner, StoreError, Tag, WorkflowError,
    WorkflowResult,
};

pub use crate::config::Settings;
pub use crate::manager::{BatchWorker, ScanManager, ScanManagerConfig};
pub use crate::store::ObjectStore;

/// Prelude module for convenient imports.
///
/// ```rust
/// use bucket_scan::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        ConfigError, ScanError, ScanRequest, ScanStatus, Scanner, StoreError, Tag, WorkflowError,
        WorkflowResult,
    };
    pub use crate::manager::{
        AuditWorker, BatchWorker, ProcessWorker, RescanWorker, ScanManager, ScanManagerConfig,
        WorkerMode,
    };
    pub use crate::store::{InMemoryStore, ObjectStore};
}
