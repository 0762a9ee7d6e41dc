//! Scan-status tag layout and merging.
//!
//! Stores replace the whole tag set on write, so every status write is a
//! read-modify-write: keep unrelated tags, drop the previous status and
//! timestamp, append the new pair.

use crate::core::types::{ScanStatus, Tag};

use chrono::{DateTime, Utc};

/// Tag key holding the scan status.
pub const STATUS_TAG: &str = "virusScanStatus";

/// Tag key holding the time the status was written.
pub const TIMESTAMP_TAG: &str = "virusScanTimestamp";

/// Tag key recording when a definitions file was uploaded.
pub const UPLOADED_AT_TAG: &str = "uploadedAt";

/// Returns `true` if `c` may appear in a tag value.
///
/// Allowed: word characters, whitespace and `_.:/=+-@`.
pub fn is_tag_value_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || "_.:/=+-@".contains(c)
}

/// Returns `true` if every character of `value` is allowed in a tag value.
pub fn is_valid_tag_value(value: &str) -> bool {
    value.chars().all(is_tag_value_char)
}

/// Replaces every character not allowed in a tag value with `_`.
pub fn sanitize_tag_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if is_tag_value_char(c) { c } else { '_' })
        .collect()
}

/// Formats a timestamp as a tag value.
pub fn timestamp_value(at: DateTime<Utc>) -> String {
    sanitize_tag_value(&at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Reads the scan status from a tag set.
///
/// Unknown values are treated as absent, which makes the object eligible
/// for rescanning.
pub fn status_of(tags: &[Tag]) -> Option<ScanStatus> {
    tags.iter()
        .find(|t| t.key == STATUS_TAG)
        .and_then(|t| t.value.parse().ok())
}

/// Builds the tag set to write for a new status.
pub fn merge_status(existing: Vec<Tag>, status: ScanStatus, at: DateTime<Utc>) -> Vec<Tag> {
    let mut tags: Vec<Tag> = existing
        .into_iter()
        .filter(|t| t.key != STATUS_TAG && t.key != TIMESTAMP_TAG)
        .collect();
    tags.push(Tag::new(STATUS_TAG, status.as_str()));
    tags.push(Tag::new(TIMESTAMP_TAG, timestamp_value(at)));
    tags
}
