//! The capability interface every mounted filesystem implements.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, Error};

/// A readable byte stream handed out by [`Backend::read_stream`].
pub type ByteStream = Box<dyn Read + Send>;

pub type BackendResult<T> = Result<T, BackendError>;

/// Whether an object is publicly readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(Error::validation(
                other,
                "visibility must be 'public' or 'private'",
            )),
        }
    }
}

/// Options passed through to a backend on write, copy and move.
///
/// `extra` carries backend-specific keys untouched; the core never reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// A mounted storage backend.
///
/// Paths are bare paths relative to the backend's own root. Handles are
/// shared (`Arc<dyn Backend>`), so implementations keep any connection
/// state behind interior mutability.
///
/// # Object Safety
///
/// This trait is object-safe: the registry stores `Arc<dyn Backend>`.
pub trait Backend: Send + Sync {
    fn exists(&self, path: &str) -> BackendResult<bool>;

    fn read(&self, path: &str) -> BackendResult<Bytes>;

    /// Open a stream over the object's content.
    ///
    /// The default buffers the whole object through [`Backend::read`].
    fn read_stream(&self, path: &str) -> BackendResult<ByteStream> {
        let contents = self.read(path)?;
        Ok(Box::new(io::Cursor::new(contents)))
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> BackendResult<()>;

    /// Write everything `stream` yields to `path`.
    ///
    /// The default drains the stream into memory and calls [`Backend::write`].
    fn write_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        options: &WriteOptions,
    ) -> BackendResult<()> {
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents)?;
        self.write(path, &contents, options)
    }

    fn delete(&self, path: &str) -> BackendResult<()>;

    fn copy(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()>;

    /// Move an object within this backend.
    fn rename(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()>;

    fn last_modified(&self, path: &str) -> BackendResult<DateTime<Utc>>;

    fn file_size(&self, path: &str) -> BackendResult<u64>;

    fn mime_type(&self, path: &str) -> BackendResult<String>;

    fn visibility(&self, path: &str) -> BackendResult<Visibility>;

    fn set_visibility(&self, path: &str, visibility: Visibility) -> BackendResult<()>;

    /// Release any connection held by this handle.
    fn disconnect(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Where `path` is physically stored, if this backend can say.
    ///
    /// Two handles reporting the same location for two paths name the same
    /// object, even when they were built separately.
    fn location(&self, _path: &str) -> Option<String> {
        None
    }
}

impl<T: Backend + ?Sized> Backend for Arc<T> {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        self.as_ref().exists(path)
    }

    fn read(&self, path: &str) -> BackendResult<Bytes> {
        self.as_ref().read(path)
    }

    fn read_stream(&self, path: &str) -> BackendResult<ByteStream> {
        self.as_ref().read_stream(path)
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> BackendResult<()> {
        self.as_ref().write(path, contents, options)
    }

    fn write_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        options: &WriteOptions,
    ) -> BackendResult<()> {
        self.as_ref().write_stream(path, stream, options)
    }

    fn delete(&self, path: &str) -> BackendResult<()> {
        self.as_ref().delete(path)
    }

    fn copy(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        self.as_ref().copy(path, new_path, options)
    }

    fn rename(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        self.as_ref().rename(path, new_path, options)
    }

    fn last_modified(&self, path: &str) -> BackendResult<DateTime<Utc>> {
        self.as_ref().last_modified(path)
    }

    fn file_size(&self, path: &str) -> BackendResult<u64> {
        self.as_ref().file_size(path)
    }

    fn mime_type(&self, path: &str) -> BackendResult<String> {
        self.as_ref().mime_type(path)
    }

    fn visibility(&self, path: &str) -> BackendResult<Visibility> {
        self.as_ref().visibility(path)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> BackendResult<()> {
        self.as_ref().set_visibility(path, visibility)
    }

    fn disconnect(&self) -> BackendResult<()> {
        self.as_ref().disconnect()
    }

    fn location(&self, path: &str) -> Option<String> {
        self.as_ref().location(path)
    }
}

/// Join a directory prefix and a bare path with exactly one `/` between.
pub fn join_prefix(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// Views a backend through a directory prefix.
///
/// Every path handed to the inner backend is `prefix/path`.
pub struct PrefixedBackend<B> {
    inner: B,
    prefix: String,
}

impl<B> PrefixedBackend<B> {
    pub fn new(inner: B, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn full(&self, path: &str) -> String {
        join_prefix(&self.prefix, path)
    }
}

impl<B: Backend> Backend for PrefixedBackend<B> {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        self.inner.exists(&self.full(path))
    }

    fn read(&self, path: &str) -> BackendResult<Bytes> {
        self.inner.read(&self.full(path))
    }

    fn read_stream(&self, path: &str) -> BackendResult<ByteStream> {
        self.inner.read_stream(&self.full(path))
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> BackendResult<()> {
        self.inner.write(&self.full(path), contents, options)
    }

    fn write_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        options: &WriteOptions,
    ) -> BackendResult<()> {
        self.inner.write_stream(&self.full(path), stream, options)
    }

    fn delete(&self, path: &str) -> BackendResult<()> {
        self.inner.delete(&self.full(path))
    }

    fn copy(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        self.inner
            .copy(&self.full(path), &self.full(new_path), options)
    }

    fn rename(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        self.inner
            .rename(&self.full(path), &self.full(new_path), options)
    }

    fn last_modified(&self, path: &str) -> BackendResult<DateTime<Utc>> {
        self.inner.last_modified(&self.full(path))
    }

    fn file_size(&self, path: &str) -> BackendResult<u64> {
        self.inner.file_size(&self.full(path))
    }

    fn mime_type(&self, path: &str) -> BackendResult<String> {
        self.inner.mime_type(&self.full(path))
    }

    fn visibility(&self, path: &str) -> BackendResult<Visibility> {
        self.inner.visibility(&self.full(path))
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> BackendResult<()> {
        self.inner.set_visibility(&self.full(path), visibility)
    }

    fn disconnect(&self) -> BackendResult<()> {
        self.inner.disconnect()
    }

    fn location(&self, path: &str) -> Option<String> {
        self.inner.location(&self.full(path))
    }
}
