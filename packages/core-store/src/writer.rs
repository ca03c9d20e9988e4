//! Write-side dispatch, including copy and move across filesystems.

use std::io::Read;
use std::sync::Arc;

use crate::backend::{Backend, Visibility, WriteOptions};
use crate::error::{BackendError, Error, Operation, Result};
use crate::registry::FilesystemRegistry;
use crate::uri::Uri;

/// Write operations over every mounted filesystem.
///
/// Copy and move between two addresses on the same backend instance use
/// the backend's own primitive. Addresses that resolve to the same stored
/// object are left alone. Between different instances the bytes are
/// streamed through this process; a cross-backend move is
/// read + write + delete and is not atomic. If the write fails the source is
/// untouched, if the final delete fails both copies remain and the delete
/// error is returned.
#[derive(Debug, Clone, Copy)]
pub struct FileWriter<'a> {
    registry: &'a FilesystemRegistry,
}

/// Same handle, regardless of which trait object vtable it was reached through.
fn same_backend(a: &Arc<dyn Backend>, b: &Arc<dyn Backend>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl<'a> FileWriter<'a> {
    pub fn new(registry: &'a FilesystemRegistry) -> Self {
        Self { registry }
    }

    fn target(&self, address: &str) -> Result<(Uri, Arc<dyn Backend>)> {
        let uri = Uri::parse(address)?;
        let backend = self.registry.get(uri.filesystem())?;
        Ok((uri, backend))
    }

    /// Write `contents` to `path` on `filesystem` and return its address.
    pub fn write(
        &self,
        filesystem: &str,
        path: &str,
        contents: impl AsRef<[u8]>,
        options: &WriteOptions,
    ) -> Result<Uri> {
        let uri = Uri::new(filesystem, path)?;
        let backend = self.registry.get(filesystem)?;
        log::debug!("write {}", uri);
        backend
            .write(&uri.key(), contents.as_ref(), options)
            .map_err(|e| Error::file_operation(Operation::Write, uri.to_string(), e))?;
        Ok(uri)
    }

    pub fn write_stream(
        &self,
        filesystem: &str,
        path: &str,
        stream: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<Uri> {
        let uri = Uri::new(filesystem, path)?;
        let backend = self.registry.get(filesystem)?;
        log::debug!("write-stream {}", uri);
        backend
            .write_stream(&uri.key(), stream, options)
            .map_err(|e| Error::file_operation(Operation::WriteStream, uri.to_string(), e))?;
        Ok(uri)
    }

    pub fn set_visibility(&self, address: &str, visibility: Visibility) -> Result<()> {
        let (uri, backend) = self.target(address)?;
        log::debug!("set-visibility {} {}", uri, visibility);
        backend
            .set_visibility(&uri.key(), visibility)
            .map_err(|e| Error::file_operation(Operation::SetVisibility, uri.to_string(), e))
    }

    pub fn delete(&self, address: &str) -> Result<()> {
        let (uri, backend) = self.target(address)?;
        log::debug!("delete {}", uri);
        backend
            .delete(&uri.key())
            .map_err(|e| Error::file_operation(Operation::Delete, uri.to_string(), e))
    }

    /// Copy `source` to `target` (default: the same path) on `filesystem`.
    ///
    /// Returns the destination address. Copying an address onto itself, or
    /// onto an alias of it such as `/a.txt` for `a.txt`, does nothing.
    pub fn copy(
        &self,
        source: &str,
        filesystem: &str,
        target: Option<&str>,
        options: &WriteOptions,
    ) -> Result<Uri> {
        self.transfer(Operation::Copy, source, filesystem, target, options)
    }

    /// Move `source` to `target` (default: the same path) on `filesystem`.
    pub fn move_file(
        &self,
        source: &str,
        filesystem: &str,
        target: Option<&str>,
        options: &WriteOptions,
    ) -> Result<Uri> {
        self.transfer(Operation::Move, source, filesystem, target, options)
    }

    fn transfer(
        &self,
        operation: Operation,
        source: &str,
        filesystem: &str,
        target: Option<&str>,
        options: &WriteOptions,
    ) -> Result<Uri> {
        let (src, src_backend) = self.target(source)?;
        let dst = Uri::new(filesystem, target.unwrap_or(src.path()))?;
        let dst_backend = self.registry.get(dst.filesystem())?;
        let same = same_backend(&src_backend, &dst_backend);
        let (from, to) = (src.key(), dst.key());

        let same_location = match (src_backend.location(&from), dst_backend.location(&to)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if src.same_object(&dst) || (same && from == to) || same_location {
            log::debug!("{} {} onto itself, nothing to do", operation, src);
            return Ok(src);
        }

        let location = format!("{} -> {}", src, dst);
        let wrap = |e: BackendError| Error::file_operation(operation, location.as_str(), e);

        if same {
            log::debug!("{} {} natively", operation, location);
            let result = match operation {
                Operation::Move => src_backend.rename(&from, &to, options),
                _ => src_backend.copy(&from, &to, options),
            };
            result.map_err(wrap)?;
            return Ok(dst);
        }

        log::debug!("{} {} through a stream", operation, location);
        let mut stream = src_backend.read_stream(&from).map_err(wrap)?;
        dst_backend
            .write_stream(&to, &mut stream, options)
            .map_err(wrap)?;
        drop(stream);
        if operation == Operation::Move {
            src_backend.delete(&from).map_err(wrap)?;
        }
        Ok(dst)
    }
}
