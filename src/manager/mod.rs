//! Scan workflows.
//!
//! The `ScanManager` owns an object store and a scanner and drives the three
//! workflows: single-object scans, whole-bucket audits and rescans of failed
//! objects. Audits and rescans delegate the scanning itself to a
//! [`BatchWorker`].

mod bucket_audit;
pub mod chunk;
mod reconcile;
mod scan_manager;
pub mod worker;

pub use chunk::{chunk_objects, ChunkLimits, Chunked};
pub use scan_manager::{
    ScanManager, ScanManagerBuilder, ScanManagerConfig, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_RESCAN_BATCH_SIZE,
};
pub use worker::{
    serve_request, ArcWorker, AuditWorker, BatchWorker, ProcessWorker, RescanWorker, WorkerMode,
    WorkerResponse,
};
