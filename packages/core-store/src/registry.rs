//! Filesystem registry: maps filesystem names to backend handles.
//!
//! Names are unique. Handles are either mounted directly or described by a
//! [`FilesystemConfig`] and built by a [`BackendFactory`] on first lookup,
//! so a configured-but-unused filesystem never opens a connection.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;

use crate::backend::{Backend, PrefixedBackend};
use crate::config::{EngineConfig, FilesystemConfig};
use crate::error::{Error, MountError, Operation, Result};
use crate::validate;

/// Builds backend handles from configuration.
pub trait BackendFactory: Send + Sync {
    fn create(&self, name: &str, config: &FilesystemConfig) -> Result<Arc<dyn Backend>>;
}

/// A factory that can build nothing; used when every handle is mounted
/// explicitly.
pub struct NoFactory;

impl BackendFactory for NoFactory {
    fn create(&self, name: &str, config: &FilesystemConfig) -> Result<Arc<dyn Backend>> {
        Err(Error::config(
            name,
            format!(
                "no backend factory is available for {} filesystems",
                config.adapter.kind()
            ),
        ))
    }
}

struct Slot {
    config: Option<FilesystemConfig>,
    handle: Mutex<Option<Arc<dyn Backend>>>,
}

impl Slot {
    fn built(handle: Arc<dyn Backend>) -> Self {
        Self {
            config: None,
            handle: Mutex::new(Some(handle)),
        }
    }

    fn lazy(config: FilesystemConfig) -> Self {
        Self {
            config: Some(config),
            handle: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Arc<dyn Backend>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Registry of mounted filesystems, in mount order.
pub struct FilesystemRegistry {
    slots: IndexMap<String, Slot>,
    factory: Box<dyn BackendFactory>,
}

impl fmt::Debug for FilesystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl Default for FilesystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesystemRegistry {
    /// An empty registry without a factory.
    pub fn new() -> Self {
        Self::with_factory(NoFactory)
    }

    pub fn with_factory(factory: impl BackendFactory + 'static) -> Self {
        Self {
            slots: IndexMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Register every configured filesystem lazily.
    pub fn from_config(
        config: &EngineConfig,
        factory: impl BackendFactory + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::with_factory(factory);
        for (name, filesystem) in &config.filesystems {
            registry.mount_config(name, filesystem.clone())?;
        }
        Ok(registry)
    }

    /// Mount an already-built backend under `name`.
    pub fn mount(&mut self, name: &str, backend: Arc<dyn Backend>) -> Result<()> {
        self.ensure_unmounted(name)?;
        log::debug!("mounting filesystem '{}'", name);
        self.slots.insert(name.to_string(), Slot::built(backend));
        Ok(())
    }

    /// Register `name` to be built from `config` on first use.
    pub fn mount_config(&mut self, name: &str, config: FilesystemConfig) -> Result<()> {
        self.ensure_unmounted(name)?;
        config.validate(name)?;
        log::debug!(
            "registering {} filesystem '{}'",
            config.adapter.kind(),
            name
        );
        self.slots.insert(name.to_string(), Slot::lazy(config));
        Ok(())
    }

    fn ensure_unmounted(&self, name: &str) -> Result<()> {
        validate::validate_filesystem_name(name)?;
        if self.slots.contains_key(name) {
            return Err(MountError::AlreadyMounted {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Remove a filesystem. Only meant for tests and teardown.
    pub fn unmount(&mut self, name: &str) -> Result<()> {
        self.slots
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| not_identified(name))
    }

    /// Look up the handle for `name`, building it on first access.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Backend>> {
        let slot = self.slots.get(name).ok_or_else(|| not_identified(name))?;

        let mut handle = slot.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backend) = handle.as_ref() {
            return Ok(Arc::clone(backend));
        }

        let config = slot.config.as_ref().ok_or_else(|| not_identified(name))?;
        log::debug!("building {} backend for '{}'", config.adapter.kind(), name);
        let mut backend = self.factory.create(name, config)?;
        if let Some(prefix) = &config.prefix {
            backend = Arc::new(PrefixedBackend::new(backend, prefix.as_str()));
        }
        *handle = Some(Arc::clone(&backend));
        Ok(backend)
    }

    pub fn has(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Whether the handle for `name` has been built yet.
    pub fn is_built(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|slot| slot.current().is_some())
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    pub fn config(&self, name: &str) -> Option<&FilesystemConfig> {
        self.slots.get(name).and_then(|slot| slot.config.as_ref())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Disconnect every built handle in mount order.
    ///
    /// Handles that were never built are skipped. A failure does not stop
    /// the remaining disconnects; the first failure is returned.
    pub fn disconnect_all(&self) -> Result<()> {
        let mut first_error = None;
        for (name, slot) in &self.slots {
            let Some(backend) = slot.current() else {
                continue;
            };
            if let Err(e) = backend.disconnect() {
                log::warn!("disconnecting '{}' failed: {}", name, e);
                if first_error.is_none() {
                    first_error = Some(Error::file_operation(Operation::Disconnect, name, e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn not_identified(name: &str) -> Error {
    MountError::NotIdentified {
        name: name.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, WriteOptions};
    use crate::config::AdapterConfig;
    use crate::error::BackendError;
    use crate::memory::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        built: Arc<AtomicUsize>,
    }

    impl BackendFactory for CountingFactory {
        fn create(&self, _name: &str, config: &FilesystemConfig) -> Result<Arc<dyn Backend>> {
            match config.adapter {
                AdapterConfig::Memory => {
                    self.built.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(MemoryBackend::new()))
                }
                _ => Err(Error::config("test", "unsupported")),
            }
        }
    }

    fn memory() -> Arc<dyn Backend> {
        Arc::new(MemoryBackend::new())
    }

    #[test]
    fn mount_and_get() {
        let mut registry = FilesystemRegistry::new();
        registry.mount("local", memory()).unwrap();
        registry.mount("local2", memory()).unwrap();

        assert!(registry.has("local"));
        assert!(registry.has("local2"));
        let a = registry.get("local").unwrap();
        let b = registry.get("local2").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &registry.get("local").unwrap()));
    }

    #[test]
    fn double_mount_fails() {
        let mut registry = FilesystemRegistry::new();
        registry.mount("local", memory()).unwrap();
        let err = registry.mount("local", memory()).unwrap_err();
        assert!(matches!(
            err,
            Error::Mount(MountError::AlreadyMounted { ref name }) if name == "local"
        ));

        let err = registry
            .mount_config("local", FilesystemConfig::new(AdapterConfig::Memory))
            .unwrap_err();
        assert!(matches!(err, Error::Mount(MountError::AlreadyMounted { .. })));
    }

    #[test]
    fn get_unknown_fails() {
        let registry = FilesystemRegistry::new();
        let err = registry.get("missing").err().unwrap();
        assert!(matches!(
            err,
            Error::Mount(MountError::NotIdentified { ref name }) if name == "missing"
        ));
        assert!(!registry.has("missing"));
    }

    #[test]
    fn invalid_name_rejected() {
        let mut registry = FilesystemRegistry::new();
        assert!(matches!(
            registry.mount("bad name", memory()),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn names_keep_insertion_order() {
        let mut registry = FilesystemRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.mount(name, memory()).unwrap();
        }
        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);

        registry.unmount("alpha").unwrap();
        assert_eq!(registry.names(), vec!["zeta", "mid"]);
        assert!(registry.unmount("alpha").is_err());
    }

    #[test]
    fn configured_backends_build_lazily_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let config = EngineConfig::new()
            .with_filesystem("a", FilesystemConfig::new(AdapterConfig::Memory))
            .with_filesystem("b", FilesystemConfig::new(AdapterConfig::Memory));
        let registry = FilesystemRegistry::from_config(
            &config,
            CountingFactory {
                built: Arc::clone(&built),
            },
        )
        .unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(!registry.is_built("a"));

        let first = registry.get("a").unwrap();
        let second = registry.get("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(registry.is_built("a"));
        assert!(!registry.is_built("b"));
        assert!(registry.config("a").is_some());
    }

    #[test]
    fn factory_failure_is_not_memoized() {
        let mut registry = FilesystemRegistry::new();
        registry
            .mount_config("mem", FilesystemConfig::new(AdapterConfig::Memory))
            .unwrap();
        assert!(matches!(registry.get("mem"), Err(Error::Config { .. })));
        assert!(!registry.is_built("mem"));
    }

    struct FailingDisconnect {
        calls: Arc<AtomicUsize>,
    }

    impl Backend for FailingDisconnect {
        fn exists(&self, _path: &str) -> BackendResult<bool> {
            Ok(false)
        }
        fn read(&self, path: &str) -> BackendResult<bytes::Bytes> {
            Err(BackendError::not_found(path))
        }
        fn write(&self, _: &str, _: &[u8], _: &WriteOptions) -> BackendResult<()> {
            Ok(())
        }
        fn delete(&self, _: &str) -> BackendResult<()> {
            Ok(())
        }
        fn copy(&self, _: &str, _: &str, _: &WriteOptions) -> BackendResult<()> {
            Ok(())
        }
        fn rename(&self, _: &str, _: &str, _: &WriteOptions) -> BackendResult<()> {
            Ok(())
        }
        fn last_modified(&self, path: &str) -> BackendResult<chrono::DateTime<chrono::Utc>> {
            Err(BackendError::not_found(path))
        }
        fn file_size(&self, path: &str) -> BackendResult<u64> {
            Err(BackendError::not_found(path))
        }
        fn mime_type(&self, path: &str) -> BackendResult<String> {
            Err(BackendError::not_found(path))
        }
        fn visibility(&self, path: &str) -> BackendResult<crate::Visibility> {
            Err(BackendError::not_found(path))
        }
        fn set_visibility(&self, path: &str, _: crate::Visibility) -> BackendResult<()> {
            Err(BackendError::not_found(path))
        }
        fn disconnect(&self) -> BackendResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::other("connection already closed"))
        }
    }

    #[test]
    fn disconnect_all_visits_every_built_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = FilesystemRegistry::new();
        registry
            .mount(
                "ftp",
                Arc::new(FailingDisconnect {
                    calls: Arc::clone(&calls),
                }),
            )
            .unwrap();
        registry
            .mount(
                "sftp",
                Arc::new(FailingDisconnect {
                    calls: Arc::clone(&calls),
                }),
            )
            .unwrap();
        registry
            .mount_config("lazy", FilesystemConfig::new(AdapterConfig::Memory))
            .unwrap();

        let err = registry.disconnect_all().unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            err,
            Error::FileOperation { operation: Operation::Disconnect, ref location, .. } if location == "ftp"
        ));
    }
}
