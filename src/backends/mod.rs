//! Scanning backend implementations.
//!
//! ## Available Backends
//!
//! - [`clamav`] - `clamscan` and `clamdscan` command-line strategies
//! - [`freshclam`] - the definitions updater
//! - [`mock`] - a mock scanner for testing
//!
//! Select a strategy with [`ClamAvConfig::build`]:
//!
//! ```rust
//! use bucket_scan::backends::ClamAvConfig;
//! use bucket_scan::core::Scanner;
//!
//! let scanner = ClamAvConfig::new()
//!     .with_daemon(true)
//!     .build();
//! assert_eq!(scanner.name(), "clamdscan");
//! ```

pub mod clamav;
pub mod freshclam;
pub mod mock;
pub mod output;
pub mod process;

pub use clamav::{ClamAvConfig, ClamScanScanner, ClamdScanScanner};
pub use freshclam::DefinitionsUpdater;
pub use mock::MockScanner;
