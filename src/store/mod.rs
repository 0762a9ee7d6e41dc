//! Object storage clients.
//!
//! - [`traits`] - the `ObjectStore` trait with tag-merging helpers
//! - [`pages`] - lazy page-by-page listings
//! - [`memory`] - an in-memory store for tests and local runs
//! - [`s3`] - Amazon S3 (requires the `s3` feature)

pub mod memory;
pub mod pages;
pub mod traits;

#[cfg(feature = "s3")]
pub mod s3;

pub use memory::{InMemoryStore, StoredObject};
pub use pages::list_pages;
pub use traits::{filename_from_disposition, ObjectStore};

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Store};

/// An arc-wrapped store for shared ownership.
pub type ArcStore = std::sync::Arc<dyn ObjectStore>;
