//! Polystore core: one address space over many storage backends
//!
//! Files are addressed as `<filesystem>://<path>`. This layer provides:
//! - `Uri`: parsed and validated address
//! - `Backend`: the capability set every storage adapter implements
//! - `FilesystemRegistry`: filesystem name to backend handle
//! - `ResolveManager`: address to public URL (static host or presigned S3)
//! - `FileReader` / `FileWriter`: uniform operations, including copy and
//!   move across backends
//! - `Engine`: all of the above built from an `EngineConfig`
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use polystore_core::{Engine, MemoryBackend, WriteOptions};
//!
//! fn archive(engine: &Engine, address: &str) -> Result<String, polystore_core::Error> {
//!     let uri = engine.writer().copy(address, "archive", None, &WriteOptions::new())?;
//!     Ok(uri.to_string())
//! }
//!
//! let mut engine = Engine::new();
//! engine.mount_filesystem("uploads", Arc::new(MemoryBackend::new())).unwrap();
//! engine.mount_filesystem("archive", Arc::new(MemoryBackend::new())).unwrap();
//! engine.writer().write("uploads", "a.txt", "hi", &WriteOptions::new()).unwrap();
//! assert_eq!(archive(&engine, "uploads://a.txt").unwrap(), "archive://a.txt");
//! ```

pub use bytes::Bytes;

mod backend;
pub mod config;
mod engine;
mod error;
mod memory;
pub mod presign;
mod reader;
mod registry;
pub mod resolve;
mod uri;
pub mod validate;
mod writer;

pub use backend::{
    join_prefix, Backend, BackendResult, ByteStream, PrefixedBackend, Visibility, WriteOptions,
};
pub use config::{AdapterConfig, EngineConfig, FilesystemConfig, ResolverKind};
pub use engine::Engine;
pub use error::{BackendError, Error, MountError, Operation, Result};
pub use memory::MemoryBackend;
pub use reader::FileReader;
pub use registry::{BackendFactory, FilesystemRegistry, NoFactory};
pub use resolve::{ResolveManager, ResolveMode, ResolveOptions, UrlResolver};
pub use uri::{Uri, UriParser, SEPARATOR};
pub use writer::FileWriter;
