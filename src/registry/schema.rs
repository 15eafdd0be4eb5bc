use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One uploaded file, either held by the backend (`url`) or cached locally
/// (`content`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique within one listing.
    pub id: String,
    /// Storage key the backend knows the file by. Absent for cached
    /// records and for listing entries the backend sent without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Epoch milliseconds.
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Backend flagged the file as audio or video.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub media: bool,
}

impl FileRecord {
    /// A record whose payload lives in the local cache.
    pub fn cached(id: String, name: String, content: String, created: i64) -> Self {
        Self {
            id,
            key: None,
            name,
            content: Some(content),
            url: None,
            tags: Vec::new(),
            created,
            size: None,
            media: false,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.url.is_some()
    }

    /// Non-empty name and exactly one of `content` / `url`.
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty() && (self.content.is_some() != self.url.is_some())
    }

    /// Text content worth searching; image data URLs are skipped.
    pub fn searchable_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|content| !content.starts_with("data:"))
    }
}

/// Result of a search. An empty query performs no search at all, which is
/// not the same thing as a search that found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Prompt,
    NoMatches,
    Matches(Vec<FileRecord>),
}

impl SearchOutcome {
    pub fn from_matches(matches: Vec<FileRecord>) -> Self {
        if matches.is_empty() {
            SearchOutcome::NoMatches
        } else {
            SearchOutcome::Matches(matches)
        }
    }

    pub fn records(&self) -> &[FileRecord] {
        match self {
            SearchOutcome::Matches(records) => records,
            SearchOutcome::Prompt | SearchOutcome::NoMatches => &[],
        }
    }
}

/// Outcome of a batch upload. Every file is attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub succeeded: usize,
    pub failures: Vec<UploadFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub name: String,
    pub message: String,
}

impl UploadReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }
}

/// Difference between two consecutive listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retagged: Vec<String>,
}

impl ViewChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retagged.is_empty()
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Storage key in the backend's format: `{unix_secs}_{uuid_hex}_{filename}`.
pub fn generate_id(filename: &str) -> String {
    format!(
        "{}_{}_{}",
        Utc::now().timestamp(),
        Uuid::new_v4().simple(),
        filename
    )
}

/// Recover the original filename from a generated key. Keys that don't
/// follow the scheme are returned as-is.
pub fn display_name(key: &str) -> &str {
    let mut parts = key.splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(secs), Some(_), Some(name))
            if !name.is_empty() && !secs.is_empty() && secs.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => key,
    }
}
