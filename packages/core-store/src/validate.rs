//! Format validation for filesystem names, bare paths and full addresses.
//!
//! Bare paths accept Unicode word characters, `-`, `+`, `(`, `)`, `.`, `*`,
//! `/` and Unicode space separators. Everything else, notably `,`, `:`, `=`
//! and control characters, is rejected.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

/// Character class shared by every path-shaped pattern.
pub(crate) const PATH_CHARS: &str = r"[\w\-+().*/\p{Zs}]";

/// Character class for filesystem names.
pub(crate) const FILESYSTEM_CHARS: &str = r"[\w\-]";

lazy_static! {
    static ref FILESYSTEM_NAME: Regex = Regex::new(&format!("^{}+$", FILESYSTEM_CHARS)).unwrap();
    static ref FILE_PATH: Regex = Regex::new(&format!("^{}+$", PATH_CHARS)).unwrap();
    static ref SERVER_FILE_PATH: Regex =
        Regex::new(&format!("^{}+://{}+$", FILESYSTEM_CHARS, PATH_CHARS)).unwrap();
}

/// True if `name` is usable as a filesystem name.
pub fn is_filesystem_name(name: &str) -> bool {
    FILESYSTEM_NAME.is_match(name)
}

/// True if `path` is a bare path (no filesystem prefix).
pub fn is_file_path(path: &str) -> bool {
    FILE_PATH.is_match(path)
}

/// True if `uri` is a full `fs://path` address.
pub fn is_server_file_path(uri: &str) -> bool {
    SERVER_FILE_PATH.is_match(uri)
}

pub fn validate_filesystem_name(name: &str) -> Result<()> {
    if is_filesystem_name(name) {
        Ok(())
    } else {
        Err(Error::validation(
            name,
            "filesystem name must be non-empty and contain only word characters or '-'",
        ))
    }
}

pub fn validate_file_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::validation(path, "path is empty"));
    }
    if let Some(c) = path.chars().find(|c| !is_path_char(*c)) {
        return Err(Error::validation(
            path,
            format!("path contains disallowed character {:?}", c),
        ));
    }
    Ok(())
}

pub fn validate_server_file_path(uri: &str) -> Result<()> {
    if is_server_file_path(uri) {
        Ok(())
    } else {
        Err(Error::validation(
            uri,
            "expected an address of the form <filesystem>://<path>",
        ))
    }
}

fn is_path_char(c: char) -> bool {
    lazy_static! {
        static ref SINGLE_PATH_CHAR: Regex = Regex::new(&format!("^{}$", PATH_CHARS)).unwrap();
    }
    let mut buf = [0u8; 4];
    SINGLE_PATH_CHAR.is_match(c.encode_utf8(&mut buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_names() {
        assert!(is_filesystem_name("local"));
        assert!(is_filesystem_name("local-2"));
        assert!(is_filesystem_name("aws_s3"));
        assert!(!is_filesystem_name(""));
        assert!(!is_filesystem_name("bad name"));
        assert!(!is_filesystem_name("bad:name"));
    }

    #[test]
    fn bare_paths_accept_allowed_punctuation() {
        for path in [
            "a.txt",
            "img/pic.png",
            "/abs/path.txt",
            "my file (1).txt",
            "a-b_c+d*e.bin",
            "données/été.txt",
        ] {
            assert!(is_file_path(path), "expected {:?} to be valid", path);
            assert!(validate_file_path(path).is_ok());
        }
    }

    #[test]
    fn bare_paths_reject_excluded_punctuation() {
        for path in ["a,b.txt", "a:b.txt", "a=b.txt", "tab\there", "line\nbreak", ""] {
            assert!(!is_file_path(path), "expected {:?} to be invalid", path);
            assert!(matches!(
                validate_file_path(path),
                Err(Error::Validation { .. })
            ));
        }
    }

    #[test]
    fn bare_path_rejects_prefixed_address() {
        assert!(!is_file_path("local://a.txt"));
        let err = validate_file_path("local://a.txt").unwrap_err();
        assert!(err.to_string().contains("':'"));
    }

    #[test]
    fn server_file_paths() {
        assert!(is_server_file_path("local://a.txt"));
        assert!(is_server_file_path("aws-1://dir/sub dir/file (2).png"));
        assert!(!is_server_file_path("a.txt"));
        assert!(!is_server_file_path("://a.txt"));
        assert!(!is_server_file_path("local://"));
        assert!(!is_server_file_path("local://a,b"));
        assert!(!is_server_file_path("local:/a.txt"));
        assert!(validate_server_file_path("local://a.txt").is_ok());
        assert!(validate_server_file_path("nope").is_err());
    }

    #[test]
    fn validation_does_not_panic_on_odd_input() {
        for input in ["\u{0}", "\u{7f}", "💥", "%%%", "a\\b"] {
            let _ = is_file_path(input);
            let _ = validate_server_file_path(input);
        }
    }
}
