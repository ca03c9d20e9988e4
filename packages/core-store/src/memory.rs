//! In-memory backend.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::backend::{Backend, BackendResult, Visibility, WriteOptions};
use crate::error::BackendError;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
struct Entry {
    contents: Bytes,
    mime_type: String,
    visibility: Visibility,
    modified: DateTime<Utc>,
}

/// A backend that keeps every object in process memory.
///
/// Mime type and visibility come from the [`WriteOptions`] of the write that
/// created the object. Paths are normalized by dropping leading slashes, so
/// `a.txt` and `/a.txt` name the same object.
///
/// # Example
///
/// ```rust
/// use polystore_core::{Backend, MemoryBackend, WriteOptions};
///
/// let backend = MemoryBackend::new();
/// backend.write("name.txt", b"Alice", &WriteOptions::default()).unwrap();
/// assert_eq!(&backend.read("name.txt").unwrap()[..], b"Alice");
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Entry>>,
    default_visibility: Visibility,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            default_visibility: Visibility::Public,
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }

    fn entry(&self, path: &str) -> BackendResult<Entry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(path))
            .cloned()
            .ok_or_else(|| BackendError::not_found(path))
    }

    fn insert(&self, path: &str, entry: Entry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(path), entry);
    }

    fn with_options(&self, mut entry: Entry, options: &WriteOptions) -> Entry {
        if let Some(visibility) = options.visibility {
            entry.visibility = visibility;
        }
        if let Some(mime_type) = &options.mime_type {
            entry.mime_type = mime_type.clone();
        }
        entry.modified = Utc::now();
        entry
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&Self::key(path)))
    }

    fn read(&self, path: &str) -> BackendResult<Bytes> {
        Ok(self.entry(path)?.contents)
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> BackendResult<()> {
        let entry = Entry {
            contents: Bytes::copy_from_slice(contents),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            visibility: self.default_visibility,
            modified: Utc::now(),
        };
        let entry = self.with_options(entry, options);
        self.insert(path, entry);
        Ok(())
    }

    fn delete(&self, path: &str) -> BackendResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(path))
            .map(|_| ())
            .ok_or_else(|| BackendError::not_found(path))
    }

    fn copy(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        let entry = self.entry(path)?;
        let entry = self.with_options(entry, options);
        self.insert(new_path, entry);
        Ok(())
    }

    fn rename(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .remove(&Self::key(path))
            .ok_or_else(|| BackendError::not_found(path))?;
        let entry = self.with_options(entry, options);
        entries.insert(Self::key(new_path), entry);
        Ok(())
    }

    fn last_modified(&self, path: &str) -> BackendResult<DateTime<Utc>> {
        Ok(self.entry(path)?.modified)
    }

    fn file_size(&self, path: &str) -> BackendResult<u64> {
        Ok(self.entry(path)?.contents.len() as u64)
    }

    fn mime_type(&self, path: &str) -> BackendResult<String> {
        Ok(self.entry(path)?.mime_type)
    }

    fn visibility(&self, path: &str) -> BackendResult<Visibility> {
        Ok(self.entry(path)?.visibility)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> BackendResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(&Self::key(path))
            .ok_or_else(|| BackendError::not_found(path))?;
        entry.visibility = visibility;
        Ok(())
    }
}
