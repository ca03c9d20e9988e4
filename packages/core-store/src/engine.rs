//! The engine ties the registry, the resolve manager and the dispatch
//! facades together.

use std::sync::Arc;

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::reader::FileReader;
use crate::registry::{BackendFactory, FilesystemRegistry};
use crate::resolve::ResolveManager;
use crate::writer::FileWriter;

/// A set of mounted filesystems and their URL resolvers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use polystore_core::{Engine, MemoryBackend, WriteOptions};
///
/// let mut engine = Engine::new();
/// engine.mount_filesystem("mem", Arc::new(MemoryBackend::new())).unwrap();
///
/// let uri = engine
///     .writer()
///     .write("mem", "notes/today.txt", "hello", &WriteOptions::new())
///     .unwrap();
/// assert_eq!(uri.to_string(), "mem://notes/today.txt");
/// assert_eq!(engine.reader().read_to_string("mem://notes/today.txt").unwrap(), "hello");
/// ```
#[derive(Debug, Default)]
pub struct Engine {
    registry: FilesystemRegistry,
    resolver: ResolveManager,
}

impl Engine {
    /// An engine with nothing mounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every configured filesystem and build its resolver.
    ///
    /// Backends are built by `factory` on first use; resolvers are built
    /// immediately, so resolver configuration errors surface here.
    pub fn from_config(config: &EngineConfig, factory: impl BackendFactory + 'static) -> Result<Self> {
        let registry = FilesystemRegistry::from_config(config, factory)?;
        let resolver = ResolveManager::init_resolvers(config)?;
        log::debug!(
            "engine ready with {} filesystem(s): {}",
            registry.len(),
            registry.names().join(", ")
        );
        Ok(Self { registry, resolver })
    }

    /// Mount an already-built backend at runtime.
    pub fn mount_filesystem(&mut self, name: &str, backend: Arc<dyn Backend>) -> Result<()> {
        self.registry.mount(name, backend)
    }

    pub fn registry(&self) -> &FilesystemRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FilesystemRegistry {
        &mut self.registry
    }

    pub fn resolve_manager(&self) -> &ResolveManager {
        &self.resolver
    }

    pub fn resolve_manager_mut(&mut self) -> &mut ResolveManager {
        &mut self.resolver
    }

    pub fn reader(&self) -> FileReader<'_> {
        FileReader::new(&self.registry)
    }

    pub fn writer(&self) -> FileWriter<'_> {
        FileWriter::new(&self.registry)
    }

    /// Disconnect every backend that has been built.
    pub fn disconnect(&self) -> Result<()> {
        self.registry.disconnect_all()
    }
}
