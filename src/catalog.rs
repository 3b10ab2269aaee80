//! Async query surface consumed by the front end.
//!
//! The mirror and the store do blocking I/O. [`Catalog`] runs every call on
//! tokio's blocking pool so callers on an async executor never stall. It adds
//! no locking: at most one `sync` may be in flight at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::model::RecordSummary;
use crate::sources::{
    CatalogMirror, CatalogSource, FetchError, HttpCatalogSource, ProgressCallback, SyncError,
    SyncReport, SyncStatus,
};
use crate::storage::{RecordStore, StoreError};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up HTTP client: {0}")]
    Client(#[from] FetchError),

    #[error("sync status file: {0}")]
    Status(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::Store(StoreError::NotFound(_)))
    }
}

/// Mirror plus store for one data directory.
pub struct Catalog<S = HttpCatalogSource> {
    data_dir: PathBuf,
    store: RecordStore,
    mirror: Arc<CatalogMirror<S>>,
}

impl<S> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            data_dir: self.data_dir.clone(),
            store: self.store.clone(),
            mirror: Arc::clone(&self.mirror),
        }
    }
}

impl Catalog<HttpCatalogSource> {
    /// Catalog backed by the HTTP source described in `config`.
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        config.validate()?;
        let data_dir = config.resolve_data_dir()?;
        let source = HttpCatalogSource::new(&config.base_url, config.request_timeout())?;
        let store = RecordStore::in_dir(&data_dir);
        let mirror = CatalogMirror::new(source, store)
            .with_retry(config.retry_policy())
            .with_max_pages(config.max_pages);
        Ok(Self::with_mirror(data_dir, mirror))
    }
}

impl<S> Catalog<S>
where
    S: CatalogSource + Send + Sync + 'static,
{
    pub fn with_mirror(data_dir: PathBuf, mirror: CatalogMirror<S>) -> Self {
        Self {
            data_dir,
            store: mirror.store().clone(),
            mirror: Arc::new(mirror),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Whether a local mirror file exists.
    pub fn exists(&self) -> bool {
        self.store.exists()
    }

    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.mirror.cancellation_handle()
    }

    /// Run a full sync and persist its outcome to `sync_status.json`.
    pub async fn sync(
        &self,
        on_progress: Option<ProgressCallback>,
    ) -> Result<SyncReport, CatalogError> {
        let mirror = Arc::clone(&self.mirror);
        let data_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<SyncReport, CatalogError> {
            let result = mirror.sync(on_progress);
            let mut status = SyncStatus::load(&data_dir).unwrap_or_default();
            match &result {
                Ok(report) => status.update(report),
                Err(e) => status.record_failure(e),
            }
            if let Err(e) = status.save(&data_dir) {
                tracing::warn!(error = %e, "failed to persist sync status");
            }
            Ok(result?)
        })
        .await?
    }

    pub async fn scan_all(&self) -> Result<Vec<RecordSummary>, CatalogError> {
        let store = self.store.clone();
        let rows = tokio::task::spawn_blocking(move || {
            store.scan_all().collect::<Result<Vec<_>, _>>()
        })
        .await??;
        Ok(rows)
    }

    pub async fn search(&self, term: &str) -> Result<Vec<RecordSummary>, CatalogError> {
        let store = self.store.clone();
        let term = term.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            store.search(&term).collect::<Result<Vec<_>, _>>()
        })
        .await??;
        Ok(rows)
    }

    /// `(description, source)` for `id`; `Store(NotFound)` when absent.
    pub async fn get(&self, id: &str) -> Result<(String, String), CatalogError> {
        let store = self.store.clone();
        let id = id.to_string();
        let found = tokio::task::spawn_blocking(move || store.get(&id)).await??;
        Ok(found)
    }

    pub async fn count(&self) -> Result<usize, CatalogError> {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || store.count()).await??)
    }

    pub fn status(&self) -> Result<SyncStatus, CatalogError> {
        Ok(SyncStatus::load(&self.data_dir)?)
    }
}
