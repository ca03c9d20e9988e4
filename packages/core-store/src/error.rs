//! Error types for the core layer.

use std::fmt;
use std::io;

/// The operation a dispatch call was performing when a backend failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Read,
    ReadStream,
    Write,
    WriteStream,
    Delete,
    Copy,
    Move,
    LastModified,
    FileSize,
    MimeType,
    Visibility,
    SetVisibility,
    TempFile,
    Disconnect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Exists => "exists",
            Operation::Read => "read",
            Operation::ReadStream => "read-stream",
            Operation::Write => "write",
            Operation::WriteStream => "write-stream",
            Operation::Delete => "delete",
            Operation::Copy => "copy",
            Operation::Move => "move",
            Operation::LastModified => "last-modified",
            Operation::FileSize => "file-size",
            Operation::MimeType => "mime-type",
            Operation::Visibility => "visibility",
            Operation::SetVisibility => "set-visibility",
            Operation::TempFile => "temp-file",
            Operation::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by backend adapters.
///
/// These never reach callers of the dispatch layer directly: they are
/// wrapped into [`Error::FileOperation`] together with the operation name
/// and the offending location.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path would resolve outside of the backend root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The remote end answered with a failure status.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Transport or protocol failure talking to a remote backend.
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// The backend does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Build the error for an `io::Error` raised while touching `path`,
    /// keeping "not found" distinguishable from other I/O failures.
    pub fn from_io(path: &str, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io(error)
        }
    }
}

/// Failures of the filesystem registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    #[error("filesystem '{name}' is already mounted")]
    AlreadyMounted { name: String },

    #[error("filesystem '{name}' is not identified")]
    NotIdentified { name: String },
}

/// Errors at the core layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An address string does not have the `fs://path` shape.
    #[error("invalid uri '{uri}': {message}")]
    UriParse { uri: String, message: String },

    /// A bare path, filesystem name or address failed format validation.
    #[error("validation failed for '{value}': {message}")]
    Validation { value: String, message: String },

    #[error(transparent)]
    Mount(#[from] MountError),

    /// Structurally invalid configuration for a filesystem or resolver.
    #[error("configuration error for filesystem '{filesystem}': {message}")]
    Config { filesystem: String, message: String },

    /// A backend call failed.
    #[error("{operation} failed for '{location}': {source}")]
    FileOperation {
        operation: Operation,
        location: String,
        #[source]
        source: BackendError,
    },

    /// Building a public URL failed.
    #[error("cannot resolve url for '{address}': {message}")]
    Resolve { address: String, message: String },
}

impl Error {
    pub fn uri_parse(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Error::UriParse {
            uri: uri.into(),
            message: message.into(),
        }
    }

    pub fn validation(value: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn config(filesystem: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            filesystem: filesystem.into(),
            message: message.into(),
        }
    }

    pub fn file_operation(
        operation: Operation,
        location: impl Into<String>,
        source: BackendError,
    ) -> Self {
        Error::FileOperation {
            operation,
            location: location.into(),
            source,
        }
    }

    pub fn resolve(address: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resolve {
            address: address.into(),
            message: message.into(),
        }
    }

    /// True when a backend reported that the addressed object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::FileOperation {
                source: BackendError::NotFound(_),
                ..
            }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
