//! Local-disk backend for polystore.
//!
//! Every object is a regular file below a root directory. Object paths are
//! `/`-separated and never leave the root.

mod error;
mod local_disk;

pub use error::LocalError;
pub use local_disk::LocalBackend;
