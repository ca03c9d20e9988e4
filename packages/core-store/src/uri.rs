//! Addresses of the form `<filesystem>://<path>`.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::validate::{self, FILESYSTEM_CHARS};

/// Separator between the filesystem name and the path.
pub const SEPARATOR: &str = "://";

lazy_static! {
    static ref DEFAULT_PARSER: UriParser = UriParser::new(SEPARATOR);
}

/// A parsed address: a filesystem name plus a path on that filesystem.
///
/// Equality is structural. A `Uri` always satisfies the filesystem-name and
/// bare-path formats, whichever way it was constructed.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uri {
    filesystem: String,
    path: String,
}

impl Uri {
    /// Parse an address string.
    ///
    /// ```rust
    /// use polystore_core::Uri;
    ///
    /// let uri = Uri::parse("local://img/pic.png").unwrap();
    /// assert_eq!(uri.filesystem(), "local");
    /// assert_eq!(uri.path(), "img/pic.png");
    /// ```
    pub fn parse(uri: &str) -> Result<Self> {
        DEFAULT_PARSER.parse(uri)
    }

    /// Build an address from its parts, validating both.
    pub fn new(filesystem: &str, path: &str) -> Result<Self> {
        validate::validate_filesystem_name(filesystem)?;
        validate::validate_file_path(path)?;
        if normalize_path(path).is_empty() {
            return Err(Error::validation(path, "path names no file"));
        }
        Ok(Uri {
            filesystem: filesystem.to_string(),
            path: path.to_string(),
        })
    }

    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The key backends store this address under.
    ///
    /// `a.txt`, `/a.txt` and `./a.txt` all name the same object, as do
    /// `d/a.txt` and `d//./a.txt`. `..` segments are kept for the backend
    /// to reject.
    pub fn key(&self) -> String {
        normalize_path(&self.path)
    }

    /// Whether both addresses name the same object on the same filesystem.
    pub fn same_object(&self, other: &Uri) -> bool {
        self.filesystem == other.filesystem && self.key() == other.key()
    }

    /// Same filesystem, different path.
    pub fn with_path(&self, path: &str) -> Result<Self> {
        Uri::new(&self.filesystem, path)
    }

    pub fn into_parts(self) -> (String, String) {
        (self.filesystem, self.path)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.filesystem, SEPARATOR, self.path)
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uri::parse(s)
    }
}

impl Serialize for Uri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Uri, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Uri::parse(&s).map_err(D::Error::custom)
    }
}

/// Parser for addresses using a configurable separator.
///
/// Production code goes through [`Uri::parse`], which uses [`SEPARATOR`].
#[derive(Debug, Clone)]
pub struct UriParser {
    separator: String,
    pattern: Regex,
}

impl UriParser {
    pub fn new(separator: &str) -> Self {
        let pattern = Regex::new(&format!(
            "^(?P<filesystem>{}*){}(?P<path>.*)$",
            FILESYSTEM_CHARS,
            regex::escape(separator)
        ))
        .expect("filesystem pattern with escaped separator is always valid");
        UriParser {
            separator: separator.to_string(),
            pattern,
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Split `uri` into filesystem and path.
    ///
    /// Fails with [`Error::UriParse`] when the separator is missing, either
    /// segment is empty, or the path holds disallowed characters.
    pub fn parse(&self, uri: &str) -> Result<Uri> {
        let captures = self.pattern.captures(uri).ok_or_else(|| {
            Error::uri_parse(
                uri,
                format!("expected <filesystem>{}<path>", self.separator),
            )
        })?;
        let filesystem = &captures["filesystem"];
        let path = &captures["path"];

        if filesystem.is_empty() {
            return Err(Error::uri_parse(uri, "filesystem segment is empty"));
        }
        if path.is_empty() {
            return Err(Error::uri_parse(uri, "path segment is empty"));
        }
        if !validate::is_file_path(path) {
            return Err(Error::uri_parse(uri, "path contains disallowed characters"));
        }
        if normalize_path(path).is_empty() {
            return Err(Error::uri_parse(uri, "path names no file"));
        }

        Ok(Uri {
            filesystem: filesystem.to_string(),
            path: path.to_string(),
        })
    }

    /// Join a filesystem name and bare path into an address string.
    ///
    /// Fails with [`Error::Validation`] if either part is malformed, which
    /// includes passing an already-prefixed address as `path`.
    pub fn build(&self, filesystem: &str, path: &str) -> Result<String> {
        validate::validate_filesystem_name(filesystem)?;
        validate::validate_file_path(path)?;
        if normalize_path(path).is_empty() {
            return Err(Error::validation(path, "path names no file"));
        }
        Ok(format!("{}{}{}", filesystem, self.separator, path))
    }
}

/// Drop empty and `.` segments, which also strips leading and trailing `/`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl Default for UriParser {
    fn default() -> Self {
        UriParser::new(SEPARATOR)
    }
}

/// Build a [`Uri`] from a literal, panicking on malformed input.
///
/// ```rust
/// use polystore_core::uri;
///
/// let u = uri!("local://a.txt");
/// assert_eq!(u.path(), "a.txt");
/// ```
#[macro_export]
macro_rules! uri {
    ($s:expr) => {
        $crate::Uri::parse($s).expect("invalid uri literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_filesystem_and_path() {
        let u = Uri::parse("local://img/pic.png").unwrap();
        assert_eq!(u.filesystem(), "local");
        assert_eq!(u.path(), "img/pic.png");
    }

    #[test]
    fn parse_keeps_leading_slash_in_path() {
        let u = Uri::parse("local:///abs/file.txt").unwrap();
        assert_eq!(u.path(), "/abs/file.txt");
    }

    #[test]
    fn aliases_share_a_key() {
        let plain = uri!("local://d/a.txt");
        for alias in ["local:///d/a.txt", "local://d/./a.txt", "local://./d//a.txt"] {
            let alias = Uri::parse(alias).unwrap();
            assert_ne!(alias, plain);
            assert_eq!(alias.key(), "d/a.txt");
            assert!(alias.same_object(&plain));
        }
        assert!(!uri!("other://d/a.txt").same_object(&plain));
        assert_eq!(uri!("local://d/../a.txt").key(), "d/../a.txt");
    }

    #[test]
    fn path_must_name_a_file() {
        for bad in ["local:///", "local://./", "local://.//."] {
            assert!(matches!(Uri::parse(bad), Err(Error::UriParse { .. })), "{bad:?}");
        }
        assert!(matches!(Uri::new("local", "/"), Err(Error::Validation { .. })));
        assert!(UriParser::default().build("local", "./").is_err());
    }

    #[test]
    fn parse_accepts_whitespace_and_punctuation() {
        let u = Uri::parse("aws://My Docs/report (final)*-_.pdf").unwrap();
        assert_eq!(u.path(), "My Docs/report (final)*-_.pdf");
    }

    #[test]
    fn parse_rejects_missing_separator() {
        for bad in ["a.txt", "local:/a.txt", "local//a.txt", ""] {
            assert!(
                matches!(Uri::parse(bad), Err(Error::UriParse { .. })),
                "{:?} should not parse",
                bad
            );
        }
    }

    #[test]
    fn parse_rejects_empty_segments() {
        let err = Uri::parse("://a.txt").unwrap_err();
        assert!(matches!(&err, Error::UriParse { uri, .. } if uri == "://a.txt"));
        assert!(err.to_string().contains("filesystem segment is empty"));

        let err = Uri::parse("local://").unwrap_err();
        assert!(matches!(&err, Error::UriParse { uri, .. } if uri == "local://"));
        assert!(err.to_string().contains("path segment is empty"));
    }

    #[test]
    fn parse_rejects_disallowed_path_characters() {
        for bad in ["local://a,b", "local://a=b", "local://a://b", "bogus://%%%"] {
            assert!(matches!(Uri::parse(bad), Err(Error::UriParse { .. })));
        }
    }

    #[test]
    fn build_rejects_prefixed_path() {
        let parser = UriParser::default();
        assert!(matches!(
            parser.build("local", "other://a.txt"),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            Uri::new("local", "other://a.txt"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn build_rejects_bad_filesystem_name() {
        assert!(matches!(
            Uri::new("", "a.txt"),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            Uri::new("a b", "a.txt"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn build_then_parse_round_trips() {
        let parser = UriParser::default();
        for (fs, path) in [
            ("local", "a.txt"),
            ("aws-s3", "deep/nested/dir/file name.bin"),
            ("ftp_1", "/root (copy).tar"),
        ] {
            let built = parser.build(fs, path).unwrap();
            let parsed = parser.parse(&built).unwrap();
            assert_eq!(parsed.filesystem(), fs);
            assert_eq!(parsed.path(), path);
            assert_eq!(parsed, Uri::new(fs, path).unwrap());
        }
    }

    #[test]
    fn custom_separator() {
        let parser = UriParser::new("@@");
        let u = parser.parse("mem@@x/y.txt").unwrap();
        assert_eq!(u.filesystem(), "mem");
        assert_eq!(u.path(), "x/y.txt");
        assert_eq!(parser.build("mem", "x/y.txt").unwrap(), "mem@@x/y.txt");
        assert!(parser.parse("mem://x/y.txt").is_err());
    }

    #[test]
    fn display_and_from_str() {
        let u: Uri = "local://a.txt".parse().unwrap();
        assert_eq!(u.to_string(), "local://a.txt");
        assert_eq!(uri!("local://a.txt"), u);
    }

    #[test]
    fn with_path_keeps_filesystem() {
        let u = uri!("local://a.txt").with_path("b.txt").unwrap();
        assert_eq!(u.to_string(), "local://b.txt");
    }

    #[test]
    fn serde_uses_string_form() {
        let u = uri!("local://dir/a.txt");
        let json = serde_json::to_string(&u).unwrap();
        assert_eq!(json, "\"local://dir/a.txt\"");
        let back: Uri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, u);
        assert!(serde_json::from_str::<Uri>("\"nope\"").is_err());
    }
}
