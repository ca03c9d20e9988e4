//! Read-side dispatch: address in, backend call out.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::backend::{Backend, ByteStream, Visibility};
use crate::error::{BackendError, Error, Operation, Result};
use crate::registry::FilesystemRegistry;
use crate::uri::Uri;

/// Read operations over every mounted filesystem.
///
/// Each call parses the address, looks up the mounted backend and delegates.
/// Backend failures come back as [`Error::FileOperation`] carrying the
/// operation and the address.
#[derive(Debug, Clone, Copy)]
pub struct FileReader<'a> {
    registry: &'a FilesystemRegistry,
}

impl<'a> FileReader<'a> {
    pub fn new(registry: &'a FilesystemRegistry) -> Self {
        Self { registry }
    }

    fn target(&self, address: &str) -> Result<(Uri, Arc<dyn Backend>)> {
        let uri = Uri::parse(address)?;
        let backend = self.registry.get(uri.filesystem())?;
        Ok((uri, backend))
    }

    fn call<T>(
        &self,
        operation: Operation,
        address: &str,
        f: impl FnOnce(&dyn Backend, &str) -> Result<T, BackendError>,
    ) -> Result<T> {
        let (uri, backend) = self.target(address)?;
        log::debug!("{} {}", operation, uri);
        f(backend.as_ref(), &uri.key())
            .map_err(|e| Error::file_operation(operation, uri.to_string(), e))
    }

    pub fn exists(&self, address: &str) -> Result<bool> {
        self.call(Operation::Exists, address, |b, path| b.exists(path))
    }

    pub fn read(&self, address: &str) -> Result<Bytes> {
        self.call(Operation::Read, address, |b, path| b.read(path))
    }

    /// Read and decode as UTF-8.
    pub fn read_to_string(&self, address: &str) -> Result<String> {
        let bytes = self.read(address)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            Error::file_operation(
                Operation::Read,
                address,
                BackendError::Io(io::Error::new(io::ErrorKind::InvalidData, e)),
            )
        })
    }

    pub fn read_stream(&self, address: &str) -> Result<ByteStream> {
        self.call(Operation::ReadStream, address, |b, path| b.read_stream(path))
    }

    pub fn last_modified(&self, address: &str) -> Result<DateTime<Utc>> {
        self.call(Operation::LastModified, address, |b, path| {
            b.last_modified(path)
        })
    }

    pub fn file_size(&self, address: &str) -> Result<u64> {
        self.call(Operation::FileSize, address, |b, path| b.file_size(path))
    }

    pub fn mime_type(&self, address: &str) -> Result<String> {
        self.call(Operation::MimeType, address, |b, path| b.mime_type(path))
    }

    pub fn visibility(&self, address: &str) -> Result<Visibility> {
        self.call(Operation::Visibility, address, |b, path| b.visibility(path))
    }

    /// Allocate a temporary file on the local disk.
    ///
    /// With an address the file is filled with that object's contents.
    /// The file outlives this call; removing it is up to the caller.
    pub fn temp_filename(&self, address: Option<&str>) -> Result<PathBuf> {
        let location = address.unwrap_or("<temp>");
        let temp_err = |e: io::Error| Error::file_operation(Operation::TempFile, location, e.into());

        let mut file = tempfile::Builder::new()
            .prefix("polystore-")
            .tempfile()
            .map_err(temp_err)?;
        if let Some(address) = address {
            let mut stream = self.read_stream(address)?;
            io::copy(&mut stream, file.as_file_mut()).map_err(temp_err)?;
        }
        let (_, path) = file.keep().map_err(|e| temp_err(e.error))?;
        log::debug!("allocated temp file {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WriteOptions;
    use crate::error::MountError;
    use crate::memory::MemoryBackend;
    use std::io::Read;

    fn registry() -> FilesystemRegistry {
        let backend = MemoryBackend::new();
        backend
            .write(
                "docs/a.txt",
                b"hello",
                &WriteOptions::new().visibility(Visibility::Public),
            )
            .unwrap();
        let mut registry = FilesystemRegistry::new();
        registry.mount("mem", Arc::new(backend)).unwrap();
        registry
    }

    #[test]
    fn delegates_reads() {
        let registry = registry();
        let reader = FileReader::new(&registry);
        assert!(reader.exists("mem://docs/a.txt").unwrap());
        assert!(!reader.exists("mem://docs/b.txt").unwrap());
        assert_eq!(reader.read("mem://docs/a.txt").unwrap(), Bytes::from("hello"));
        assert_eq!(reader.read_to_string("mem://docs/a.txt").unwrap(), "hello");
        assert_eq!(reader.file_size("mem://docs/a.txt").unwrap(), 5);
        assert_eq!(
            reader.visibility("mem://docs/a.txt").unwrap(),
            Visibility::Public
        );

        let mut stream = reader.read_stream("mem://docs/a.txt").unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn missing_object_names_operation_and_address() {
        let registry = registry();
        let err = FileReader::new(&registry)
            .read("mem://nope.txt")
            .unwrap_err();
        assert!(err.is_not_found());
        match err {
            Error::FileOperation {
                operation,
                location,
                ..
            } => {
                assert_eq!(operation, Operation::Read);
                assert_eq!(location, "mem://nope.txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_filesystem_is_mount_error() {
        let registry = registry();
        let err = FileReader::new(&registry)
            .exists("missing://a.txt")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Mount(MountError::NotIdentified { ref name }) if name == "missing"
        ));
    }

    #[test]
    fn malformed_address_is_parse_error() {
        let registry = registry();
        let err = FileReader::new(&registry).read("no-separator").unwrap_err();
        assert!(matches!(err, Error::UriParse { .. }));
    }

    #[test]
    fn temp_filename_without_address_is_empty() {
        let registry = registry();
        let path = FileReader::new(&registry).temp_filename(None).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn temp_filename_copies_contents() {
        let registry = registry();
        let path = FileReader::new(&registry)
            .temp_filename(Some("mem://docs/a.txt"))
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn temp_filename_of_missing_object_fails() {
        let registry = registry();
        let err = FileReader::new(&registry)
            .temp_filename(Some("mem://gone.txt"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
