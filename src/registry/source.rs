use super::cache::LocalCache;
use super::extract::{cache_payload, UploadFile};
use super::remote::{RemoteFileEntry, RemoteStore};
use super::schema::{display_name, generate_id, now_millis, FileRecord};
use crate::error::{RegistryError, Result};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix for every record in the offline cache.
pub const CACHE_PREFIX: &str = "tidal_file_";

/// Where the registry reads from and writes to first.
#[derive(Clone)]
pub enum DataSource {
    Remote(RemoteSource),
    Cache(CacheSource),
}

/// Backend-backed records.
#[derive(Clone)]
pub struct RemoteSource {
    store: Arc<dyn RemoteStore>,
}

impl RemoteSource {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<FileRecord>> {
        Ok(to_records(self.store.list().await?, now_millis()))
    }

    pub async fn upload(&self, file: &UploadFile) -> Result<()> {
        self.store.add(file).await.map(|_| ())
    }

    pub async fn delete(&self, record: &FileRecord) -> Result<()> {
        self.store.delete(storage_key(record)?).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<FileRecord>> {
        Ok(to_records(self.store.search(query).await?, now_millis()))
    }

    pub async fn ask(&self, query: &str) -> Result<Vec<FileRecord>> {
        Ok(to_records(self.store.ask(query).await?, now_millis()))
    }

    pub async fn transcript(&self, record: &FileRecord) -> Result<Option<String>> {
        self.store.transcript(storage_key(record)?).await
    }
}

fn storage_key(record: &FileRecord) -> Result<&str> {
    record
        .key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| RegistryError::MissingKey(record.name.clone()))
}

/// Map a batch of backend entries, suffixing repeated ids with `#2`, `#3`,
/// ... so every record in the batch has its own id.
fn to_records(entries: Vec<RemoteFileEntry>, now: i64) -> Vec<FileRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(entries.len());
    for mut record in entries.into_iter().filter_map(|entry| to_record(entry, now)) {
        let base = record.id.clone();
        let mut n = 1;
        while !seen.insert(record.id.clone()) {
            n += 1;
            record.id = format!("{base}#{n}");
        }
        records.push(record);
    }
    records
}

/// Map a backend entry onto a record. Missing name falls back to the key
/// (without a generated `{secs}_{uuid}_` prefix),
/// missing size to zero, missing or unreadable timestamp to `now`.
/// Entries with neither key nor name are dropped. The id is the key, or
/// the name when the backend sent no key.
fn to_record(entry: RemoteFileEntry, now: i64) -> Option<FileRecord> {
    let key = entry.key.filter(|k| !k.is_empty());
    let name = entry
        .name
        .or(entry.original_name)
        .filter(|n| !n.is_empty())
        .or_else(|| key.as_deref().map(|k| display_name(k).to_string()))?;

    Some(FileRecord {
        id: key.clone().unwrap_or_else(|| name.clone()),
        key,
        name,
        content: None,
        url: Some(entry.url.unwrap_or_default()),
        tags: entry.tags.unwrap_or_default(),
        created: entry
            .last_modified
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(now),
        size: Some(entry.size.unwrap_or(0)),
        media: entry.is_audio_or_video.unwrap_or(false),
    })
}

/// Epoch millis from a number, a numeric string, or an RFC 3339 /
/// naive ISO 8601 string (assumed UTC).
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(millis) = s.parse::<i64>() {
                return Some(millis);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

/// Records kept in the local key-value cache.
#[derive(Clone)]
pub struct CacheSource {
    cache: Arc<dyn LocalCache>,
}

impl CacheSource {
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    fn key(id: &str) -> String {
        format!("{CACHE_PREFIX}{id}")
    }

    /// Every parseable record under the prefix. Never fails: unreadable
    /// entries, or an unreadable cache, yield fewer records.
    pub fn list(&self) -> Vec<FileRecord> {
        self.entries().into_iter().map(|(_, record)| record).collect()
    }

    fn entries(&self) -> Vec<(String, FileRecord)> {
        let raw = match self.cache.scan_by_prefix(CACHE_PREFIX) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("offline cache unreadable: {e}");
                return Vec::new();
            }
        };
        raw.into_iter()
            .filter_map(|(key, value)| match serde_json::from_str::<FileRecord>(&value) {
                Ok(record) if record.is_well_formed() => Some((key, record)),
                Ok(_) => {
                    debug!(%key, "skipping cache entry without a single payload");
                    None
                }
                Err(e) => {
                    debug!(%key, "skipping malformed cache entry: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn insert(&self, record: &FileRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.cache.set(&Self::key(&record.id), &value)
    }

    /// Store an upload as a new record with a generated id.
    pub fn store(&self, file: &UploadFile) -> Result<FileRecord> {
        if file.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let record = FileRecord::cached(
            generate_id(&file.name),
            file.name.clone(),
            cache_payload(file),
            now_millis(),
        );
        self.insert(&record)?;
        Ok(record)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        if self.cache.remove(&Self::key(id))? {
            Ok(())
        } else {
            Err(RegistryError::NotFound(id.to_string()))
        }
    }

    /// Drop cached copies of a remote record, matched by url or name.
    pub fn purge_matching(&self, record: &FileRecord) -> Result<usize> {
        let url = record.url.as_deref().filter(|u| !u.is_empty());
        let mut purged = 0;
        for (key, cached) in self.entries() {
            let same_url = url.is_some() && cached.url.as_deref() == url;
            if (same_url || cached.name == record.name) && self.cache.remove(&key)? {
                purged += 1;
            }
        }
        Ok(purged)
    }
}
