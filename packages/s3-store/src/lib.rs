//! S3-compatible object store backend for polystore.
//!
//! Every request is sent to a short-lived presigned URL, so the same code
//! path serves AWS, MinIO and other S3-compatible endpoints in either
//! virtual-host or path-style addressing.

mod error;
mod object_store;

pub use error::Error;
pub use object_store::{S3Backend, REQUEST_EXPIRY};
