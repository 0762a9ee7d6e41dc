//! File materialization and type verification.
//!
//! - [`scratch`] - per-invocation scratch directories and the local-name table
//! - [`filetype`] - declared versus sniffed MIME type checks
//! - [`batch`] - `scan_files`, the download-scan-verify batch operation

pub mod batch;
pub mod filetype;
pub mod scratch;

pub use batch::scan_files;
pub use filetype::TypeCheck;
pub use scratch::{LocalNames, ScratchDir};
