//! Audit event emission functions.

use crate::core::ScanStatus;

/// Label used in events for objects without a status tag.
pub const UNTAGGED: &str = "UNTAGGED";

/// Returns the audit label of an optional status.
pub fn status_label(status: Option<ScanStatus>) -> &'static str {
    status.as_ref().map(ScanStatus::as_str).unwrap_or(UNTAGGED)
}

/// Emits an audit event for a status tag written to an object.
pub fn emit_status_written(bucket: &str, key: &str, status: ScanStatus) {
    tracing::info!(
        target: "bucket_scan::audit",
        event_type = "status_written",
        bucket = %bucket,
        key = %key,
        status = %status,
        "Scan status written"
    );
}

/// Emits an audit event for a status corrected by a bucket audit.
pub fn emit_tag_corrected(
    bucket: &str,
    key: &str,
    previous: Option<ScanStatus>,
    corrected: ScanStatus,
) {
    tracing::warn!(
        target: "bucket_scan::audit",
        event_type = "tag_corrected",
        bucket = %bucket,
        key = %key,
        previous = status_label(previous),
        corrected = %corrected,
        "Scan status corrected"
    );
}

/// Emits an audit event for a finished bucket audit.
pub fn emit_audit_completed(
    bucket: &str,
    objects: usize,
    chunks: usize,
    skipped: usize,
    corrected: &[String],
) {
    tracing::info!(
        target: "bucket_scan::audit",
        event_type = "audit_completed",
        bucket = %bucket,
        objects,
        chunks,
        skipped,
        corrected_count = corrected.len(),
        corrected = ?corrected,
        "Bucket audit completed"
    );
}

/// Emits an audit event for a finished failed-file rescan.
pub fn emit_rescan_completed(bucket: &str, examined: usize, rescanned: usize, infected: &[String]) {
    tracing::info!(
        target: "bucket_scan::audit",
        event_type = "rescan_completed",
        bucket = %bucket,
        examined,
        rescanned,
        infected_count = infected.len(),
        infected = ?infected,
        "Failed-file rescan completed"
    );
}

/// Emits an audit event for a virus definitions refresh.
pub fn emit_definitions_refreshed(bucket: &str, prefix: &str, removed: usize, uploaded: &[String]) {
    tracing::info!(
        target: "bucket_scan::audit",
        event_type = "definitions_refreshed",
        bucket = %bucket,
        prefix = %prefix,
        removed,
        uploaded = ?uploaded,
        "Virus definitions refreshed"
    );
}
