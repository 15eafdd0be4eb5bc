//! Client for a remote file backend with an offline fallback cache.
//!
//! [`FileRegistry`] is the entry point: it lists, searches, uploads and
//! deletes files, reading from the backend when reachable and from a local
//! key-value cache otherwise.

pub mod config;
pub mod error;
pub mod registry;

pub use config::Config;
pub use error::{RegistryError, Result};
pub use registry::{FileRecord, FileRegistry, SearchOutcome, UploadFile, UploadReport};
