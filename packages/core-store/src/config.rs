//! Filesystem configuration consumed by the registry and resolve manager.
//!
//! Configurations are JSON objects keyed by filesystem name:
//! ```json
//! {
//!   "filesystems": {
//!     "local": {"adapter": {"kind": "local", "root": "/srv/data"}, "host": "http://cdn.example.com/"},
//!     "aws": {"adapter": {"kind": "s3", "bucket": "media", "region": "eu-west-1",
//!                         "access_key": "...", "secret_key": "..."}, "expires": "+1 hour"}
//!   }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resolve::parse_expiry;
use crate::validate;

/// Backend-specific options, tagged by adapter kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdapterConfig {
    /// In-process store, mostly for tests.
    Memory,
    /// Directory on the local disk.
    Local { root: PathBuf },
    /// S3-compatible object store.
    S3 {
        bucket: String,
        region: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        access_key: String,
        secret_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        #[serde(default)]
        path_style: bool,
    },
    Ftp {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root: Option<String>,
    },
    Sftp {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root: Option<String>,
    },
    Gridfs {
        uri: String,
        database: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
    },
}

impl AdapterConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterConfig::Memory => "memory",
            AdapterConfig::Local { .. } => "local",
            AdapterConfig::S3 { .. } => "s3",
            AdapterConfig::Ftp { .. } => "ftp",
            AdapterConfig::Sftp { .. } => "sftp",
            AdapterConfig::Gridfs { .. } => "gridfs",
        }
    }

    fn required(&self) -> Vec<(&'static str, bool)> {
        match self {
            AdapterConfig::Memory => vec![],
            AdapterConfig::Local { root } => vec![("root", root.as_os_str().is_empty())],
            AdapterConfig::S3 {
                bucket,
                region,
                access_key,
                secret_key,
                ..
            } => vec![
                ("bucket", bucket.is_empty()),
                ("region", region.is_empty()),
                ("access_key", access_key.is_empty()),
                ("secret_key", secret_key.is_empty()),
            ],
            AdapterConfig::Ftp { host, .. } | AdapterConfig::Sftp { host, .. } => {
                vec![("host", host.is_empty())]
            }
            AdapterConfig::Gridfs { uri, database, .. } => {
                vec![("uri", uri.is_empty()), ("database", database.is_empty())]
            }
        }
    }
}

/// Strategy used to turn a path into a public URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// `host` + path.
    Local,
    /// Presigned S3 URL.
    S3,
    /// The filesystem has no public URLs.
    #[serde(rename = "none")]
    Disabled,
}

impl ResolverKind {
    /// The resolver used when a filesystem does not name one.
    pub fn default_for(adapter: &AdapterConfig) -> Option<ResolverKind> {
        match adapter {
            AdapterConfig::Memory => Some(ResolverKind::Disabled),
            AdapterConfig::Local { .. } => Some(ResolverKind::Local),
            AdapterConfig::S3 { .. } => Some(ResolverKind::S3),
            AdapterConfig::Ftp { .. } | AdapterConfig::Sftp { .. } | AdapterConfig::Gridfs { .. } => {
                None
            }
        }
    }
}

/// Configuration of one named filesystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilesystemConfig {
    pub adapter: AdapterConfig,
    /// Directory prefix applied to every path on this filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Public base URL used by the local resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverKind>,
    /// Default lifetime of presigned URLs, e.g. `"+24 hours"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

impl FilesystemConfig {
    pub fn new(adapter: AdapterConfig) -> Self {
        Self {
            adapter,
            prefix: None,
            host: None,
            resolver: None,
            expires: None,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverKind) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The configured resolver, falling back to the adapter's default.
    pub fn resolver_kind(&self) -> Option<ResolverKind> {
        self.resolver.or_else(|| ResolverKind::default_for(&self.adapter))
    }

    /// Check the options the core depends on.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !validate::is_filesystem_name(name) {
            return Err(Error::config(name, "invalid filesystem name"));
        }

        for (option, missing) in self.adapter.required() {
            if missing {
                return Err(Error::config(
                    name,
                    format!(
                        "required option '{}' is missing for {} adapter",
                        option,
                        self.adapter.kind()
                    ),
                ));
            }
        }

        if let Some(prefix) = &self.prefix {
            if !prefix.trim_matches('/').is_empty() && !validate::is_file_path(prefix) {
                return Err(Error::config(name, format!("invalid prefix '{}'", prefix)));
            }
        }

        if self.resolver == Some(ResolverKind::S3)
            && !matches!(self.adapter, AdapterConfig::S3 { .. })
        {
            return Err(Error::config(
                name,
                format!(
                    "s3 resolver requires an s3 adapter, found {}",
                    self.adapter.kind()
                ),
            ));
        }

        if let Some(expires) = &self.expires {
            parse_expiry(expires).map_err(|e| Error::config(name, e.to_string()))?;
        }

        Ok(())
    }
}

/// Mapping from filesystem name to its configuration, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub filesystems: IndexMap<String, FilesystemConfig>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filesystem(mut self, name: impl Into<String>, config: FilesystemConfig) -> Self {
        self.filesystems.insert(name.into(), config);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| Error::config("*", format!("malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::config(
                "*",
                format!("cannot read configuration {}: {}", path.display(), e),
            )
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, filesystem) in &self.filesystems {
            filesystem.validate(name)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FilesystemConfig> {
        self.filesystems.get(name)
    }
}
