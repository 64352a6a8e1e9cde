use crate::{Error, Result};
use std::path::PathBuf;

/// Turn an untrusted, `/`-separated repository file name into a relative path
/// that cannot leave the directory it is joined onto.
///
/// Empty and `.` segments are dropped, `..` cancels the preceding segment and
/// any `..` that would climb above the root is discarded. A name that collapses
/// to nothing is rejected, and so is, on Windows, a segment containing `:`
/// (drive prefixes and alternate data streams).
///
/// ```
/// use hubcache_fs::clean_relative_path;
/// use std::path::PathBuf;
///
/// assert_eq!(clean_relative_path("foo/../bar").unwrap(), PathBuf::from("bar"));
/// assert_eq!(clean_relative_path("/etc/passwd").unwrap(), PathBuf::from("etc/passwd"));
/// assert!(clean_relative_path("..").is_err());
/// ```
pub fn clean_relative_path(name: &str) -> Result<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in name.split(|c: char| c == '/' || (cfg!(windows) && c == '\\')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s if cfg!(windows) && s.contains(':') => {
                return Err(Error::UnsafePath(name.to_string()));
            }
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return Err(Error::UnsafePath(name.to_string()));
    }

    Ok(parts.iter().collect())
}

/// Validate a single path component, such as a content tag or commit hash,
/// that is used verbatim as a file name.
pub fn check_file_name(name: &str) -> Result<&str> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if unsafe_name {
        return Err(Error::UnsafePath(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Component, Path};

    fn cleaned(name: &str) -> Option<PathBuf> {
        clean_relative_path(name).ok()
    }

    #[test]
    fn test_clean_relative_path_cases() {
        let cases = [
            ("foo/bar", Some("foo/bar")),
            ("foo/../bar", Some("bar")),
            ("foo/./bar", Some("foo/bar")),
            ("/foo/bar", Some("foo/bar")),
            ("foo//bar", Some("foo/bar")),
            ("foo/bar/..", Some("foo")),
            ("../foo/bar", Some("foo/bar")),
            ("foo/../../../..", None),
            ("foo/../../../bar", Some("bar")),
            ("", None),
            (".", None),
            ("..", None),
        ];

        for (input, expected) in cases {
            assert_eq!(
                cleaned(input),
                expected.map(|e| e.split('/').collect::<PathBuf>()),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn test_escaping_names_stay_confined() {
        for name in ["../../etc/passwd", "/etc/passwd", "a/../../../etc/passwd"] {
            let path = clean_relative_path(name).unwrap();
            assert!(!path.is_absolute());
            assert!(path.components().all(|c| matches!(c, Component::Normal(_))));
            assert_eq!(path, Path::new("etc").join("passwd"));
        }
    }

    #[cfg(windows)]
    #[test]
    fn test_drive_prefix_rejected() {
        for name in ["C:/Windows/win.ini", "models/C:evil", "config.json:stream"] {
            assert!(clean_relative_path(name).is_err(), "input {name:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_colon_allowed_on_unix() {
        assert_eq!(
            clean_relative_path("ckpt/step:100.bin").unwrap(),
            Path::new("ckpt").join("step:100.bin")
        );
    }

    #[test]
    fn test_check_file_name() {
        assert!(check_file_name("a1b2c3").is_ok());
        assert!(check_file_name("").is_err());
        assert!(check_file_name("..").is_err());
        assert!(check_file_name("a/b").is_err());
    }
}
