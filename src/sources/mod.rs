//! Remote catalog mirroring for frics.
//!
//! This module pulls the public Frida codeshare catalog into the local
//! [`crate::storage::RecordStore`].
//!
//! # Architecture
//!
//! - **remote**: the [`CatalogSource`] seam and its HTTP implementation
//! - **listing**: browse-page parsing and the pure link → detail path transform
//! - **version**: decoding of the scalar-or-list `frida_version` field
//! - **sync**: the page-walking sync engine and persisted sync status
//!
//! # Syncing
//!
//! ```rust,ignore
//! use frics::sources::{CatalogMirror, HttpCatalogSource, SyncStatus};
//! use frics::storage::RecordStore;
//!
//! let source = HttpCatalogSource::new(&config.base_url, config.request_timeout())?;
//! let mirror = CatalogMirror::new(source, RecordStore::in_dir(&data_dir))
//!     .with_retry(config.retry_policy());
//!
//! let report = mirror.sync(None)?;
//! let mut status = SyncStatus::load(&data_dir)?;
//! status.update(&report);
//! status.save(&data_dir)?;
//! ```

pub mod listing;
pub mod remote;
pub mod sync;
pub mod version;

pub use listing::{ListingEntry, ProjectLink, parse_listing, resolve_listing_link};
pub use remote::{
    CatalogSource, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, FetchError, HttpCatalogSource,
    RetryPolicy,
};
pub use sync::{
    CatalogMirror, ProgressCallback, SkipReason, SkippedEntry, SyncError, SyncOutcome,
    SyncProgress, SyncReport, SyncStatus, WalkEnd,
};
pub use version::RuntimeVersion;
