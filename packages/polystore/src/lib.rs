//! Polystore: one address space over many storage backends.
//!
//! Files are addressed as `<filesystem>://<path>`, e.g. `local://img/a.png`
//! or `aws://docs/report.pdf`. An [`Engine`] maps filesystem names to
//! backends, routes every operation to the right one and streams bytes
//! between backends when a copy or move crosses them.
//!
//! ```rust
//! use polystore::{EngineConfig, ResolveMode, WriteOptions};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = EngineConfig::from_json_str(&format!(
//!     r#"{{"filesystems": {{
//!         "local": {{"adapter": {{"kind": "local", "root": {:?}}}, "host": "http://cdn.example.com/"}},
//!         "scratch": {{"adapter": {{"kind": "memory"}}}}
//!     }}}}"#,
//!     dir.path()
//! ))
//! .unwrap();
//!
//! let engine = polystore::open(&config).unwrap();
//! let uri = engine
//!     .writer()
//!     .write("scratch", "a.txt", "hello", &WriteOptions::new())
//!     .unwrap();
//! let moved = engine
//!     .writer()
//!     .move_file(&uri.to_string(), "local", None, &WriteOptions::new())
//!     .unwrap();
//!
//! let url = engine
//!     .resolve_manager()
//!     .build_url(&moved.to_string(), ResolveMode::Strict)
//!     .unwrap();
//! assert_eq!(url.as_deref(), Some("http://cdn.example.com/a.txt"));
//! ```

use std::path::Path;
use std::sync::Arc;

pub use polystore_core::*;
pub use polystore_local::{LocalBackend, LocalError};
pub use polystore_s3::S3Backend;

/// Builds the adapters that ship with polystore: `memory`, `local` and `s3`.
///
/// `ftp`, `sftp` and `gridfs` filesystems have no built-in adapter. Mount
/// a [`Backend`] for them with [`Engine::mount_filesystem`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, name: &str, config: &FilesystemConfig) -> Result<Arc<dyn Backend>> {
        match &config.adapter {
            AdapterConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
            AdapterConfig::Local { root } => {
                let backend = LocalBackend::create(root.clone())
                    .map_err(|e| Error::config(name, e.to_string()))?;
                Ok(Arc::new(backend))
            }
            AdapterConfig::S3 { .. } => {
                let backend = S3Backend::from_config(&config.adapter)
                    .map_err(|e| Error::config(name, e.to_string()))?;
                Ok(Arc::new(backend))
            }
            other => Err(Error::config(
                name,
                format!(
                    "no built-in {} adapter; mount a backend for it explicitly",
                    other.kind()
                ),
            )),
        }
    }
}

/// Build an engine from `config` using the built-in adapters.
pub fn open(config: &EngineConfig) -> Result<Engine> {
    Engine::from_config(config, DefaultBackendFactory)
}

/// Like [`open`], reading the configuration from a JSON file.
pub fn open_file(path: impl AsRef<Path>) -> Result<Engine> {
    let config = EngineConfig::from_json_file(path.as_ref())?;
    log::debug!("loaded configuration from {}", path.as_ref().display());
    open(&config)
}
