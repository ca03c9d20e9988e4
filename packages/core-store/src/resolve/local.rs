use url::Url;

use crate::backend::join_prefix;
use crate::config::FilesystemConfig;
use crate::error::{Error, Result};

use super::{ResolveOptions, UrlResolver};

/// Resolves paths against a public base URL.
///
/// Without a configured host every call to `build_url` fails.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    host: Option<Url>,
    prefix: Option<String>,
}

impl LocalResolver {
    pub fn new(host: &str) -> Result<Self> {
        Ok(Self {
            host: Some(parse_host(host)?),
            prefix: None,
        })
    }

    /// A resolver for a filesystem that has no public host.
    pub fn unconfigured() -> Self {
        Self {
            host: None,
            prefix: None,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn from_config(name: &str, config: &FilesystemConfig) -> Result<Self> {
        let resolver = match &config.host {
            Some(host) => Self::new(host).map_err(|e| Error::config(name, e.to_string()))?,
            None => Self::unconfigured(),
        };
        Ok(resolver.with_prefix(config.prefix.clone()))
    }
}

fn parse_host(host: &str) -> Result<Url> {
    let mut url =
        Url::parse(host).map_err(|e| Error::validation(host, format!("invalid host url: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::validation(host, "host url cannot be a base"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl UrlResolver for LocalResolver {
    fn build_url(&self, path: &str, _options: &ResolveOptions) -> Result<String> {
        let host = self
            .host
            .as_ref()
            .ok_or_else(|| Error::resolve(path, "host option is not configured"))?;
        let relative = match &self.prefix {
            Some(prefix) => join_prefix(prefix, path),
            None => path.trim_start_matches('/').to_string(),
        };
        if relative.split('/').any(is_parent_segment) {
            return Err(Error::resolve(path, "path may not contain '..' segments"));
        }
        let url = host
            .join(&relative)
            .map_err(|e| Error::resolve(path, e.to_string()))?;
        if !url.as_str().starts_with(host.as_str()) {
            return Err(Error::resolve(path, "path resolves outside the host url"));
        }
        Ok(url.into())
    }
}

fn is_parent_segment(segment: &str) -> bool {
    segment.to_ascii_lowercase().replace("%2e", ".") == ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_host_and_path() {
        let resolver = LocalResolver::new("http://cdn.example.com/").unwrap();
        let url = resolver
            .build_url("img/pic.png", &ResolveOptions::default())
            .unwrap();
        assert_eq!(url, "http://cdn.example.com/img/pic.png");
    }

    #[test]
    fn host_without_trailing_slash_keeps_its_path() {
        let resolver = LocalResolver::new("https://example.com/static").unwrap();
        let url = resolver
            .build_url("/css/site.css", &ResolveOptions::default())
            .unwrap();
        assert_eq!(url, "https://example.com/static/css/site.css");
    }

    #[test]
    fn spaces_are_percent_encoded() {
        let resolver = LocalResolver::new("http://cdn.example.com/").unwrap();
        let url = resolver
            .build_url("my file (1).txt", &ResolveOptions::default())
            .unwrap();
        assert_eq!(url, "http://cdn.example.com/my%20file%20(1).txt");
    }

    #[test]
    fn prefix_is_applied() {
        let resolver = LocalResolver::new("http://cdn.example.com/")
            .unwrap()
            .with_prefix(Some("uploads".to_string()));
        let url = resolver
            .build_url("a.txt", &ResolveOptions::default())
            .unwrap();
        assert_eq!(url, "http://cdn.example.com/uploads/a.txt");
    }

    #[test]
    fn parent_segments_cannot_leave_the_host_path() {
        let resolver = LocalResolver::new("https://example.com/static/").unwrap();
        for path in ["../x", "a/../../x", "%2e%2E/x", "javascript:alert(1)"] {
            assert!(
                matches!(
                    resolver.build_url(path, &ResolveOptions::default()),
                    Err(Error::Resolve { .. })
                ),
                "{path:?}"
            );
        }
        assert_eq!(
            resolver
                .build_url("//evil.example.com/x", &ResolveOptions::default())
                .unwrap(),
            "https://example.com/static/evil.example.com/x"
        );
    }

    #[test]
    fn missing_host_fails_to_resolve() {
        let err = LocalResolver::unconfigured()
            .build_url("a.txt", &ResolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn malformed_host_rejected() {
        assert!(LocalResolver::new("not a url").is_err());
        assert!(LocalResolver::new("mailto:someone@example.com").is_err());
    }
}
