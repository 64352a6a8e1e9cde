use crate::error::io_at;
use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Lexical path from directory `base` to `target`.
///
/// Returns `None` when no relative path exists, e.g. when one path is absolute
/// and the other is not, or they live on different prefixes.
pub fn relative_path(target: &Path, base: &Path) -> Option<PathBuf> {
    if target.is_absolute() != base.is_absolute() {
        return None;
    }

    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    if base.iter().any(|c| matches!(c, Component::ParentDir))
        || target.iter().any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && (matches!(target.first(), Some(Component::Prefix(_) | Component::RootDir))) {
        return None;
    }

    let mut rel = PathBuf::new();
    for _ in &base[common..] {
        rel.push("..");
    }
    for c in &target[common..] {
        rel.push(c.as_os_str());
    }
    Some(rel)
}

/// Make `link` a symbolic link to `target`.
///
/// Whatever sits at `link` is removed first. The link text is relative to the
/// link's directory when one can be computed, so the tree keeps working after
/// being moved; otherwise the absolute target path is used.
pub fn link_relative(link: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
    let link = link.as_ref();
    let target = target.as_ref();

    let parent = link.parent().unwrap_or(Path::new(""));
    if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(io_at(parent))?;
    }

    let link_text = relative_path(target, parent).unwrap_or_else(|| target.to_path_buf());

    match std::fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::Link {
                link: link.to_path_buf(),
                target: link_text,
                source: e,
            });
        }
    }

    symlink_file(&link_text, link).map_err(|e| Error::Link {
        link: link.to_path_buf(),
        target: link_text.clone(),
        source: e,
    })
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_path_between_siblings() {
        let rel = relative_path(
            Path::new("/cache/models--a--b/blobs/abc"),
            Path::new("/cache/models--a--b/snapshots/123/sub"),
        )
        .unwrap();
        assert_eq!(rel, Path::new("../../../blobs/abc"));
    }

    #[test]
    fn test_relative_path_mixed_kinds() {
        assert!(relative_path(Path::new("/a/b"), Path::new("c/d")).is_none());
        assert_eq!(
            relative_path(Path::new("x/y"), Path::new("x")).unwrap(),
            Path::new("y")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_link_relative_replaces_existing_entry() {
        let dir = tempdir().unwrap();
        let blob = dir.path().join("blobs").join("etag1");
        std::fs::create_dir_all(blob.parent().unwrap()).unwrap();
        std::fs::write(&blob, "content").unwrap();

        let link = dir.path().join("snapshots").join("c1").join("nested").join("file.txt");
        std::fs::create_dir_all(link.parent().unwrap()).unwrap();
        std::fs::write(&link, "stale").unwrap();

        link_relative(&link, &blob).unwrap();

        let text = std::fs::read_link(&link).unwrap();
        assert!(text.is_relative());
        assert_eq!(text, Path::new("../../../blobs/etag1"));
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "content");
    }
}
