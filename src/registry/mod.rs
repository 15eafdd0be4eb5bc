//! File registry: keeps an ordered view of uploaded files, reading from the
//! backend when it can and from the offline cache when it can't.

pub mod cache;
pub mod extract;
pub mod remote;
pub mod schema;
pub mod search;
pub mod source;

pub use cache::{LocalCache, MemoryCache, SqliteCache};
pub use extract::UploadFile;
pub use remote::{HttpRemoteStore, ListEndpoint, RemoteFileEntry, RemoteStore};
pub use schema::{FileRecord, SearchOutcome, UploadFailure, UploadReport, ViewChanges};
pub use source::{CacheSource, DataSource, RemoteSource, CACHE_PREFIX};

use crate::config::Config;
use crate::error::{RegistryError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FileRegistry {
    source: DataSource,
    fallback: CacheSource,
    view: Mutex<Vec<FileRecord>>,
}

impl FileRegistry {
    /// Backend first, `cache` when the backend can't be listed.
    pub fn remote(store: Arc<dyn RemoteStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self {
            source: DataSource::Remote(RemoteSource::new(store)),
            fallback: CacheSource::new(cache),
            view: Mutex::new(Vec::new()),
        }
    }

    /// Cache only; nothing goes over the network.
    pub fn offline(cache: Arc<dyn LocalCache>) -> Self {
        let cache = CacheSource::new(cache);
        Self {
            source: DataSource::Cache(cache.clone()),
            fallback: cache,
            view: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let cache: Arc<dyn LocalCache> = Arc::new(SqliteCache::open(&config.cache_path())?);
        if config.offline {
            return Ok(Self::offline(cache));
        }
        let store = HttpRemoteStore::new(&config.api_base, config.list_endpoint, config.request_timeout())?;
        Ok(Self::remote(Arc::new(store), cache))
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.source, DataSource::Cache(_))
    }

    /// Snapshot of the last listing, minus anything deleted since.
    pub fn view(&self) -> Vec<FileRecord> {
        self.view.lock().clone()
    }

    /// Look a record up in the current view.
    pub fn find(&self, id: &str) -> Option<FileRecord> {
        self.view.lock().iter().find(|r| r.id == id).cloned()
    }

    /// All known files, newest first. Falls back to the offline cache if the
    /// backend can't be listed, so this never fails.
    pub async fn list_files(&self) -> Vec<FileRecord> {
        let mut files = match &self.source {
            DataSource::Remote(remote) => match remote.list().await {
                Ok(files) => files,
                Err(e) => {
                    warn!("falling back to offline cache: {e}");
                    self.fallback.list()
                }
            },
            DataSource::Cache(cache) => cache.list(),
        };
        files.sort_by(|a, b| b.created.cmp(&a.created));
        *self.view.lock() = files.clone();
        files
    }

    /// Re-list and report what changed since the previous listing. Tags
    /// arrive from the backend asynchronously, so callers poll this.
    pub async fn refresh(&self) -> ViewChanges {
        let previous = self.view();
        let current = self.list_files().await;
        diff(&previous, &current)
    }

    /// Search the current listing by name and text content.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        if query.trim().is_empty() {
            return SearchOutcome::Prompt;
        }
        let files = self.list_files().await;
        search::search(query, &files)
    }

    /// Let the backend search names and tags.
    pub async fn search_remote(&self, query: &str) -> Result<SearchOutcome> {
        let remote = self.remote_source("search")?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutcome::Prompt);
        }
        Ok(SearchOutcome::from_matches(remote.search(query).await?))
    }

    /// Natural-language search on the backend.
    pub async fn ask(&self, query: &str) -> Result<SearchOutcome> {
        let remote = self.remote_source("natural-language search")?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutcome::Prompt);
        }
        Ok(SearchOutcome::from_matches(remote.ask(query).await?))
    }

    /// Transcript of an audio/video file; `None` while the backend is still
    /// producing it.
    pub async fn transcript(&self, record: &FileRecord) -> Result<Option<String>> {
        let remote = self.remote_source("transcripts")?;
        if !record.is_remote() {
            return Err(RegistryError::RemoteOnly("transcripts"));
        }
        if !record.media {
            return Err(RegistryError::NotMedia(record.name.clone()));
        }
        remote.transcript(record).await
    }

    /// Delete from the authoritative store, then from the view. On failure
    /// the view is left untouched.
    pub async fn delete_file(&self, record: &FileRecord) -> Result<()> {
        if record.is_remote() {
            let remote = self.remote_source("deleting a remote file")?;
            remote.delete(record).await?;
            match self.fallback.purge_matching(record) {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "removed stale cached copies"),
                Err(e) => warn!("failed to purge cached copies of {}: {e}", record.name),
            }
        } else {
            self.fallback.remove(&record.id)?;
        }

        self.view.lock().retain(|r| r.id != record.id);
        info!(id = %record.id, name = %record.name, "deleted file");
        Ok(())
    }

    /// Upload files one at a time. A failure is recorded and the batch
    /// carries on.
    pub async fn upload_files(&self, files: &[UploadFile]) -> UploadReport {
        let mut report = UploadReport::default();
        for file in files {
            let result = if file.name.is_empty() {
                Err(RegistryError::EmptyName)
            } else {
                match &self.source {
                    DataSource::Remote(remote) => remote.upload(file).await,
                    DataSource::Cache(cache) => cache.store(file).map(|_| ()),
                }
            };
            match result {
                Ok(()) => {
                    report.succeeded += 1;
                    info!(name = %file.name, bytes = file.data.len(), "uploaded file");
                }
                Err(e) => {
                    warn!(name = %file.name, "upload failed: {e}");
                    report.failures.push(UploadFailure {
                        name: file.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn remote_source(&self, operation: &'static str) -> Result<&RemoteSource> {
        match &self.source {
            DataSource::Remote(remote) => Ok(remote),
            DataSource::Cache(_) => Err(RegistryError::RemoteOnly(operation)),
        }
    }
}

fn diff(previous: &[FileRecord], current: &[FileRecord]) -> ViewChanges {
    let before: HashMap<&str, &FileRecord> = previous.iter().map(|r| (r.id.as_str(), r)).collect();
    let after: HashSet<&str> = current.iter().map(|r| r.id.as_str()).collect();

    let mut changes = ViewChanges::default();
    for record in current {
        match before.get(record.id.as_str()) {
            None => changes.added.push(record.id.clone()),
            Some(old) if old.tags != record.tags => changes.retagged.push(record.id.clone()),
            Some(_) => {}
        }
    }
    changes.removed = previous
        .iter()
        .filter(|r| !after.contains(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();
    changes
}
