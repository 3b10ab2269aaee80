//! Sync engine that mirrors the remote catalog into the local store.
//!
//! A sync walks browse pages `1, 2, 3, …` until one does not succeed, resolves
//! every listed project through the detail endpoint, and stages the results.
//! Only when the walk is over does the staged table replace the live one, so
//! readers keep seeing the previous mirror for the whole duration.
//!
//! # Known weakness
//!
//! The remote has no "last page" marker. A transient failure on a listing
//! page is therefore indistinguishable from the end of the catalog once
//! retries run out, and the sync still succeeds. [`WalkEnd`] records which
//! case happened so callers can warn about a possibly truncated mirror.
//!
//! # Example
//!
//! ```rust,ignore
//! use frics::sources::{CatalogMirror, HttpCatalogSource};
//! use frics::storage::RecordStore;
//!
//! let source = HttpCatalogSource::new("https://codeshare.frida.re", timeout)?;
//! let mirror = CatalogMirror::new(source, RecordStore::in_dir(&data_dir));
//! let report = mirror.sync(None)?;
//! println!("mirrored {} projects", report.records_written);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::listing::{parse_listing, resolve_listing_link};
use super::remote::{CatalogSource, FetchError, RetryPolicy};
use crate::storage::{RecordStore, StoreError};

/// Errors that abort a sync. Remote-side failures never show up here.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("local store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Sync cancelled")]
    Cancelled,
}

/// Why the page walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalkEnd {
    /// The remote answered with a non-retryable status (usually 404).
    Exhausted { page: u32, status: u16 },
    /// The remote answered successfully with no projects on the page.
    EmptyPage { page: u32 },
    /// The page could not be fetched even after retrying.
    TransportFailure { page: u32, error: String },
    /// The configured page cap was reached.
    PageLimit { pages: u32 },
}

impl WalkEnd {
    fn from_fetch_error(page: u32, err: FetchError) -> Self {
        match &err {
            FetchError::Status { status } if !err.is_transient() => WalkEnd::Exhausted {
                page,
                status: *status,
            },
            _ => WalkEnd::TransportFailure {
                page,
                error: err.to_string(),
            },
        }
    }

    /// Whether the walk ended for a reason that may have truncated the listing.
    pub fn is_suspect(&self) -> bool {
        matches!(self, WalkEnd::TransportFailure { .. })
    }
}

/// Why a single listing entry was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The article had no anchor or its link had no author segment.
    MalformedLink,
    /// The detail request failed or returned an unusable payload.
    Detail { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub page: u32,
    pub href: Option<String>,
    pub reason: SkipReason,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Listing pages that were fetched successfully.
    pub pages_walked: u32,
    /// Articles seen across those pages.
    pub entries_seen: u64,
    /// Records written to the mirror.
    pub records_written: u64,
    pub skipped: Vec<SkippedEntry>,
    pub end: WalkEnd,
    pub total_duration_ms: u64,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            pages_walked: 0,
            entries_seen: 0,
            records_written: 0,
            skipped: Vec::new(),
            end: WalkEnd::EmptyPage { page: 1 },
            total_duration_ms: 0,
        }
    }

    fn skip(&mut self, page: u32, href: Option<String>, reason: SkipReason) {
        self.skipped.push(SkippedEntry { page, href, reason });
    }

    /// No entry was skipped and the walk ended on a definite signal.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && !self.end.is_suspect()
    }
}

/// Progress snapshot passed to the progress callback after every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub page: u32,
    pub entries_seen: u64,
    pub records_written: u64,
    pub skipped: usize,
}

/// Progress callback for syncs.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Mirrors a [`CatalogSource`] into a [`RecordStore`].
///
/// Calls must be serialized by the caller; two concurrent syncs against the
/// same store would race on the staging table.
pub struct CatalogMirror<S> {
    source: S,
    store: RecordStore,
    retry: RetryPolicy,
    /// Upper bound on pages walked (0 = unlimited).
    max_pages: u32,
    cancelled: Arc<AtomicBool>,
}

impl<S: CatalogSource> CatalogMirror<S> {
    pub fn new(source: S, store: RecordStore) -> Self {
        Self {
            source,
            store,
            retry: RetryPolicy::default(),
            max_pages: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Get a cancellation handle.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Request cancellation of the running sync, or of the next one if none
    /// is running yet. Honoured before the next remote request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run a full sync.
    ///
    /// Listing failures end the walk, detail failures skip the entry; neither
    /// is returned as an error. On success the live table holds exactly the
    /// records fetched during this run. On `Err` it is left as it was.
    ///
    /// A pending cancellation request is consumed when the run returns.
    pub fn sync(&self, on_progress: Option<ProgressCallback>) -> Result<SyncReport, SyncError> {
        let result = self.run(on_progress);
        self.cancelled.store(false, Ordering::SeqCst);
        result
    }

    fn run(&self, on_progress: Option<ProgressCallback>) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        self.store.begin_staging()?;
        let walked = self.walk(on_progress.as_ref());

        let mut report = match walked {
            Ok(report) => report,
            Err(e) => {
                if let Err(cleanup) = self.store.discard_staging() {
                    tracing::warn!(error = %cleanup, "failed to discard staging table");
                }
                return Err(e);
            }
        };

        self.store.commit_staging()?;
        report.total_duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            pages = report.pages_walked,
            records = report.records_written,
            skipped = report.skipped.len(),
            end = ?report.end,
            duration_ms = report.total_duration_ms,
            "sync completed"
        );
        if report.end.is_suspect() {
            tracing::warn!(end = ?report.end, "listing ended on a transport failure; mirror may be incomplete");
        }
        Ok(report)
    }

    fn walk(&self, on_progress: Option<&ProgressCallback>) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new();
        let mut page: u32 = 1;

        loop {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if self.max_pages > 0 && page > self.max_pages {
                report.end = WalkEnd::PageLimit {
                    pages: self.max_pages,
                };
                break;
            }

            let body = match self
                .retry
                .run(&format!("listing page {page}"), || self.source.fetch_listing(page))
            {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(page, error = %err, "listing walk stopped");
                    report.end = WalkEnd::from_fetch_error(page, err);
                    break;
                }
            };

            let entries = parse_listing(&body);
            if entries.is_empty() {
                report.end = WalkEnd::EmptyPage { page };
                break;
            }
            report.pages_walked += 1;
            tracing::debug!(page, entries = entries.len(), "listing page fetched");

            for entry in entries {
                if self.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                report.entries_seen += 1;
                self.process_entry(page, entry.href, &mut report)?;

                if let Some(callback) = on_progress {
                    callback(SyncProgress {
                        page,
                        entries_seen: report.entries_seen,
                        records_written: report.records_written,
                        skipped: report.skipped.len(),
                    });
                }
            }

            page += 1;
        }

        Ok(report)
    }

    fn process_entry(
        &self,
        page: u32,
        href: Option<String>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let Some(link) = href.as_deref().and_then(resolve_listing_link) else {
            tracing::debug!(page, href = ?href, "skipping article without a usable link");
            report.skip(page, href, SkipReason::MalformedLink);
            return Ok(());
        };

        let detail = self.retry.run(&link.detail_path, || {
            self.source.fetch_detail(&link.detail_path)
        });

        match detail {
            Ok(detail) => {
                let record = detail.into_record(&link.author);
                self.store.stage(&record)?;
                report.records_written += 1;
            }
            Err(err) => {
                tracing::warn!(
                    page,
                    path = %link.detail_path,
                    error = %err,
                    "skipping project whose detail fetch failed"
                );
                report.skip(
                    page,
                    href,
                    SkipReason::Detail {
                        error: err.to_string(),
                    },
                );
            }
        }
        Ok(())
    }
}

// =============================================================================
// Sync Status Persistence
// =============================================================================

/// Outcome of the last sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every listed project was mirrored and the walk ended cleanly.
    Complete,
    /// Some projects were skipped or the walk may have been cut short.
    Partial(String),
    /// Nothing could be mirrored.
    Failed(String),
    /// No sync has run yet.
    #[default]
    Never,
}

/// Persistent record of the most recent sync, kept next to the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Unix timestamp (ms) of the last sync.
    pub last_sync: Option<i64>,
    pub outcome: SyncOutcome,
    pub records: u64,
    pub pages: u32,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl SyncStatus {
    /// Load sync status from disk; a missing file means no sync has run.
    pub fn load(data_dir: &Path) -> Result<Self, std::io::Error> {
        let path = Self::status_path(data_dir);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        } else {
            Ok(Self::default())
        }
    }

    /// Save sync status to disk.
    pub fn save(&self, data_dir: &Path) -> Result<(), std::io::Error> {
        let path = Self::status_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
    }

    /// Record the result of a finished sync.
    pub fn update(&mut self, report: &SyncReport) {
        let outcome = if report.is_complete() {
            SyncOutcome::Complete
        } else if report.records_written == 0 {
            SyncOutcome::Failed(describe_incomplete(report))
        } else {
            SyncOutcome::Partial(describe_incomplete(report))
        };

        *self = SyncStatus {
            last_sync: Some(chrono::Utc::now().timestamp_millis()),
            outcome,
            records: report.records_written,
            pages: report.pages_walked,
            skipped: report.skipped.len(),
            duration_ms: report.total_duration_ms,
        };
    }

    /// Record a sync that returned an error. The previous mirror, and so the
    /// previous record and page counts, are still in place.
    pub fn record_failure(&mut self, error: &SyncError) {
        self.last_sync = Some(chrono::Utc::now().timestamp_millis());
        self.outcome = SyncOutcome::Failed(error.to_string());
        self.skipped = 0;
        self.duration_ms = 0;
    }

    fn status_path(data_dir: &Path) -> PathBuf {
        data_dir.join("sync_status.json")
    }
}

fn describe_incomplete(report: &SyncReport) -> String {
    let mut parts = Vec::new();
    if let WalkEnd::TransportFailure { page, error } = &report.end {
        parts.push(format!("listing page {page} failed: {error}"));
    }
    if !report.skipped.is_empty() {
        parts.push(format!("{} projects skipped", report.skipped.len()));
    }
    if parts.is_empty() {
        parts.push("no projects listed".to_string());
    }
    parts.join("; ")
}
