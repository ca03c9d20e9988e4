use std::{ffi, fs, io, path};

use chrono::{DateTime, Utc};

use polystore_core::{
    Backend, BackendError, BackendResult, ByteStream, Bytes, Visibility, WriteOptions,
};

use crate::error::LocalError;

const MIME_TYPE: &str = "application/octet-stream";

#[cfg(unix)]
const PUBLIC_MODE: u32 = 0o644;
#[cfg(unix)]
const PRIVATE_MODE: u32 = 0o600;

/// A backend that stores objects as files under a root directory.
pub struct LocalBackend {
    root: path::PathBuf,
}

impl LocalBackend {
    /// Open an existing, writable root directory.
    pub fn new(root: path::PathBuf) -> Result<LocalBackend, LocalError> {
        let attr = fs::metadata(&root).map_err(|error| LocalError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        if !attr.is_dir() {
            return Err(LocalError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root path must be a directory."),
            });
        }

        if attr.permissions().readonly() {
            return Err(LocalError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root directory must be writable"),
            });
        }

        match root.canonicalize() {
            Ok(root) => Ok(LocalBackend { root }),
            Err(error) => Err(LocalError::RootPathInvalid { path: root, error }),
        }
    }

    /// Like [`LocalBackend::new`], creating the root first if it is missing.
    pub fn create(root: path::PathBuf) -> Result<LocalBackend, LocalError> {
        fs::create_dir_all(&root).map_err(|error| LocalError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;
        Self::new(root)
    }

    pub fn root(&self) -> &path::Path {
        &self.root
    }

    fn file_path(&self, path: &str) -> BackendResult<path::PathBuf> {
        let mut components = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(BackendError::PathEscapesRoot(path.to_string())),
                segment => components.push(path::Component::Normal(ffi::OsStr::new(segment))),
            }
        }
        if components.is_empty() {
            return Err(BackendError::other(format!("'{}' does not name a file", path)));
        }
        Ok(self.root.components().chain(components).collect())
    }

    fn create_parent(file_path: &path::Path, path: &str) -> BackendResult<()> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BackendError::from_io(path, e))?;
        }
        Ok(())
    }

    fn metadata(&self, path: &str) -> BackendResult<fs::Metadata> {
        let file_path = self.file_path(path)?;
        let attr = fs::metadata(&file_path).map_err(|e| BackendError::from_io(path, e))?;
        if attr.is_file() {
            Ok(attr)
        } else {
            Err(BackendError::not_found(path))
        }
    }

    /// Fill a temp file next to `file_path`, then move it into place.
    ///
    /// Readers of the old file keep their content until the rename, and a
    /// failed write leaves nothing behind.
    fn persist(
        &self,
        file_path: &path::Path,
        path: &str,
        options: &WriteOptions,
        fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
    ) -> BackendResult<()> {
        Self::create_parent(file_path, path)?;
        let dir = file_path
            .parent()
            .ok_or_else(|| BackendError::other(format!("'{}' has no parent directory", path)))?;
        let mut temp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| BackendError::from_io(path, e))?;
        fill(temp.as_file_mut()).map_err(|e| BackendError::from_io(path, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| BackendError::from_io(path, e))?;

        let previous = fs::metadata(file_path).ok().map(|attr| attr.permissions());
        temp.persist(file_path)
            .map_err(|e| BackendError::from_io(path, e.error))?;
        match (options.visibility, previous) {
            (Some(visibility), _) => set_mode(file_path, visibility),
            (None, Some(permissions)) => fs::set_permissions(file_path, permissions),
            (None, None) => set_mode(file_path, Visibility::Public),
        }
        .map_err(|e| BackendError::from_io(path, e))
    }

    fn apply_options(
        &self,
        file_path: &path::Path,
        path: &str,
        options: &WriteOptions,
    ) -> BackendResult<()> {
        if let Some(visibility) = options.visibility {
            set_mode(file_path, visibility).map_err(|e| BackendError::from_io(path, e))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(file_path: &path::Path, visibility: Visibility) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match visibility {
        Visibility::Public => PUBLIC_MODE,
        Visibility::Private => PRIVATE_MODE,
    };
    fs::set_permissions(file_path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file_path: &path::Path, _visibility: Visibility) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_visibility(attr: &fs::Metadata) -> Visibility {
    use std::os::unix::fs::PermissionsExt;

    if attr.permissions().mode() & 0o044 != 0 {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

#[cfg(not(unix))]
fn mode_visibility(_attr: &fs::Metadata) -> Visibility {
    Visibility::Public
}

impl Backend for LocalBackend {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        match self.metadata(path) {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read(&self, path: &str) -> BackendResult<Bytes> {
        let file_path = self.file_path(path)?;
        log::debug!("Reading {}...", file_path.display());
        let contents = fs::read(&file_path).map_err(|e| BackendError::from_io(path, e))?;
        Ok(Bytes::from(contents))
    }

    fn read_stream(&self, path: &str) -> BackendResult<ByteStream> {
        let file_path = self.file_path(path)?;
        log::debug!("Streaming {}...", file_path.display());
        let file = fs::File::open(&file_path).map_err(|e| BackendError::from_io(path, e))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> BackendResult<()> {
        let file_path = self.file_path(path)?;
        log::debug!("Writing {}...", file_path.display());
        self.persist(&file_path, path, options, |file| {
            io::Write::write_all(file, contents)
        })
    }

    fn write_stream(
        &self,
        path: &str,
        stream: &mut dyn io::Read,
        options: &WriteOptions,
    ) -> BackendResult<()> {
        let file_path = self.file_path(path)?;
        log::debug!("Writing stream to {}...", file_path.display());
        self.persist(&file_path, path, options, |file| {
            io::copy(stream, file).map(|_| ())
        })
    }

    fn delete(&self, path: &str) -> BackendResult<()> {
        let file_path = self.file_path(path)?;
        log::debug!("Deleting {}...", file_path.display());
        fs::remove_file(&file_path).map_err(|e| BackendError::from_io(path, e))
    }

    fn copy(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        let from = self.file_path(path)?;
        let to = self.file_path(new_path)?;
        log::debug!("Copying {} to {}...", from.display(), to.display());
        if from == to {
            self.metadata(path)?;
            return self.apply_options(&to, new_path, options);
        }
        Self::create_parent(&to, new_path)?;
        fs::copy(&from, &to).map_err(|e| BackendError::from_io(path, e))?;
        self.apply_options(&to, new_path, options)
    }

    fn rename(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        let from = self.file_path(path)?;
        let to = self.file_path(new_path)?;
        log::debug!("Moving {} to {}...", from.display(), to.display());
        if !from.is_file() {
            return Err(BackendError::not_found(path));
        }
        if from == to {
            return self.apply_options(&to, new_path, options);
        }
        Self::create_parent(&to, new_path)?;
        if let Err(error) = fs::rename(&from, &to) {
            // Renames across mount points fail; fall back to copy + remove.
            log::debug!("rename failed ({}), copying instead", error);
            fs::copy(&from, &to).map_err(|e| BackendError::from_io(path, e))?;
            fs::remove_file(&from).map_err(|e| BackendError::from_io(path, e))?;
        }
        self.apply_options(&to, new_path, options)
    }

    fn last_modified(&self, path: &str) -> BackendResult<DateTime<Utc>> {
        let modified = self.metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn file_size(&self, path: &str) -> BackendResult<u64> {
        Ok(self.metadata(path)?.len())
    }

    fn mime_type(&self, path: &str) -> BackendResult<String> {
        self.metadata(path)?;
        Ok(MIME_TYPE.to_string())
    }

    fn visibility(&self, path: &str) -> BackendResult<Visibility> {
        Ok(mode_visibility(&self.metadata(path)?))
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> BackendResult<()> {
        let file_path = self.file_path(path)?;
        self.metadata(path)?;
        set_mode(&file_path, visibility).map_err(|e| BackendError::from_io(path, e))
    }

    fn location(&self, path: &str) -> Option<String> {
        self.file_path(path)
            .ok()
            .map(|file_path| file_path.display().to_string())
    }
}
