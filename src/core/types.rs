//! Core types used throughout the bucket-scan library.
//!
//! This module defines the scan status carried in object tags, the object
//! descriptions returned by stores, and the batch request passed to workers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The scan status recorded on an object.
///
/// An object without a status tag is pending; that state is represented as
/// `Option::<ScanStatus>::None` rather than a variant, so "never tagged" and
/// "tag write failed" cannot be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// No threats detected and the content matches its declared type.
    Clean,
    /// A threat was detected or the content does not match its declared type.
    Infected,
    /// The scan could not be completed.
    Error,
    /// The object exceeds the maximum scannable size.
    Skipped,
}

impl ScanStatus {
    /// Returns the tag value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "CLEAN",
            Self::Infected => "INFECTED",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Returns `true` if an object in this state (or untagged) must be rescanned.
    pub fn needs_rescan(status: Option<Self>) -> bool {
        matches!(status, None | Some(Self::Error))
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a tag value is not a known scan status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scan status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for ScanStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLEAN" => Ok(Self::Clean),
            "INFECTED" => Ok(Self::Infected),
            "ERROR" => Ok(Self::Error),
            "SKIPPED" => Ok(Self::Skipped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A single key/value tag on an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Size in bytes, if the store reported one.
    pub size: Option<u64>,
}

impl ObjectSummary {
    /// Creates a new summary.
    pub fn new(key: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Object metadata returned by a head request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// Size in bytes, if reported.
    pub size: Option<u64>,
    /// Stored content type.
    pub content_type: Option<String>,
    /// Stored `Content-Disposition` header.
    pub content_disposition: Option<String>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page.
    pub objects: Vec<ObjectSummary>,
    /// Token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

/// A batch of keys to scan in one bucket.
///
/// This is also the request body of the worker protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Bucket containing the keys.
    pub bucket: String,
    /// Keys to scan, in order.
    pub keys: Vec<String>,
}

impl ScanRequest {
    /// Creates a new request.
    pub fn new(bucket: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            bucket: bucket.into(),
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_tag_value() {
        for status in [
            ScanStatus::Clean,
            ScanStatus::Infected,
            ScanStatus::Error,
            ScanStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<ScanStatus>(), Ok(status));
        }
        assert!("PENDING".parse::<ScanStatus>().is_err());
    }

    #[test]
    fn test_needs_rescan() {
        assert!(ScanStatus::needs_rescan(None));
        assert!(ScanStatus::needs_rescan(Some(ScanStatus::Error)));
        assert!(!ScanStatus::needs_rescan(Some(ScanStatus::Clean)));
        assert!(!ScanStatus::needs_rescan(Some(ScanStatus::Infected)));
        assert!(!ScanStatus::needs_rescan(Some(ScanStatus::Skipped)));
    }

    #[test]
    fn test_scan_request_wire_format() {
        let req = ScanRequest::new("uploads", vec!["a.pdf".into()]);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"bucket":"uploads","keys":["a.pdf"]}"#);
    }
}
