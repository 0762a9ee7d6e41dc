//! Structured audit logging.
//!
//! Every tag write and every workflow summary is emitted as a `tracing`
//! event under the `bucket_scan::audit` target, so a subscriber can route
//! the audit trail separately from operational logs (for example with
//! `RUST_LOG=bucket_scan::audit=info`).

mod events;

pub use events::{
    emit_audit_completed, emit_definitions_refreshed, emit_rescan_completed, emit_status_written,
    emit_tag_corrected, status_label, UNTAGGED,
};
