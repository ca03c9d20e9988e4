//! Public URL construction.
//!
//! A [`ResolveManager`] holds one [`UrlResolver`] per filesystem name and
//! turns addresses into URLs:
//!
//! - [`LocalResolver`] - configured `host` followed by the path
//! - [`S3Resolver`] - time-limited presigned URL

mod local;
mod s3;

use std::fmt;

use indexmap::IndexMap;

use crate::config::{EngineConfig, ResolverKind};
use crate::error::{Error, Result};
use crate::uri::Uri;
use crate::validate;

pub use local::LocalResolver;
pub use s3::{parse_expiry, S3Resolver, DEFAULT_EXPIRES};

/// Per-call resolver options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Overrides the lifetime of presigned URLs, e.g. `"+1 hour"`.
    pub expires: Option<String>,
}

impl ResolveOptions {
    pub fn expires(expires: impl Into<String>) -> Self {
        Self {
            expires: Some(expires.into()),
        }
    }
}

/// How URL building reports failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Propagate every failure.
    Strict,
    /// Log the failure and yield `None`.
    Lenient,
}

/// Turns a bare path into a publicly addressable URL.
pub trait UrlResolver: Send + Sync {
    fn build_url(&self, path: &str, options: &ResolveOptions) -> Result<String>;
}

impl<T: UrlResolver + ?Sized> UrlResolver for Box<T> {
    fn build_url(&self, path: &str, options: &ResolveOptions) -> Result<String> {
        self.as_ref().build_url(path, options)
    }
}

/// Resolver table keyed by filesystem name.
#[derive(Default)]
pub struct ResolveManager {
    resolvers: IndexMap<String, Box<dyn UrlResolver>>,
}

impl fmt::Debug for ResolveManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveManager")
            .field("filesystems", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolveManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the resolver of every configured filesystem.
    ///
    /// Filesystems whose resolver is `none` get no entry. A filesystem with
    /// no configured resolver and no default for its adapter kind is a
    /// [`Error::Config`].
    pub fn init_resolvers(config: &EngineConfig) -> Result<Self> {
        let mut manager = Self::new();
        for (name, filesystem) in &config.filesystems {
            let kind = filesystem.resolver_kind().ok_or_else(|| {
                Error::config(
                    name,
                    format!(
                        "no resolver strategy is known for {} filesystems",
                        filesystem.adapter.kind()
                    ),
                )
            })?;
            match kind {
                ResolverKind::Disabled => {
                    log::debug!("filesystem '{}' has no url resolver", name);
                }
                ResolverKind::Local => {
                    manager.register(name, LocalResolver::from_config(name, filesystem)?)?;
                }
                ResolverKind::S3 => {
                    manager.register(name, S3Resolver::from_config(name, filesystem)?)?;
                }
            }
        }
        Ok(manager)
    }

    /// Install or replace the resolver for `name`.
    pub fn register(&mut self, name: &str, resolver: impl UrlResolver + 'static) -> Result<()> {
        validate::validate_filesystem_name(name)?;
        if self
            .resolvers
            .insert(name.to_string(), Box::new(resolver))
            .is_some()
        {
            log::debug!("replaced url resolver for '{}'", name);
        }
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn build_url(&self, address: &str, mode: ResolveMode) -> Result<Option<String>> {
        self.build_url_with(address, &ResolveOptions::default(), mode)
    }

    /// Build the URL for `address`.
    ///
    /// In [`ResolveMode::Strict`] parse errors, a missing resolver and
    /// resolver failures are returned; in [`ResolveMode::Lenient`] they
    /// become `Ok(None)`.
    pub fn build_url_with(
        &self,
        address: &str,
        options: &ResolveOptions,
        mode: ResolveMode,
    ) -> Result<Option<String>> {
        match (self.resolve(address, options), mode) {
            (Ok(url), _) => Ok(Some(url)),
            (Err(e), ResolveMode::Strict) => Err(e),
            (Err(e), ResolveMode::Lenient) => {
                log::warn!("no url for '{}': {}", address, e);
                Ok(None)
            }
        }
    }

    /// One result per address, in input order.
    ///
    /// The sequence is lazy and single-pass; call again to re-run it.
    pub fn build_urls_list<'a, I>(
        &'a self,
        addresses: I,
        mode: ResolveMode,
    ) -> impl Iterator<Item = Result<Option<String>>> + 'a
    where
        I: IntoIterator + 'a,
        I::Item: AsRef<str>,
    {
        addresses
            .into_iter()
            .map(move |address| self.build_url(address.as_ref(), mode))
    }

    fn resolve(&self, address: &str, options: &ResolveOptions) -> Result<String> {
        let uri = Uri::parse(address)?;
        let resolver = self.resolvers.get(uri.filesystem()).ok_or_else(|| {
            Error::resolve(
                address,
                format!(
                    "no url resolver registered for filesystem '{}'",
                    uri.filesystem()
                ),
            )
        })?;
        resolver.build_url(&uri.key(), options)
    }
}
