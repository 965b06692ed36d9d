//! Path safety shared by the extractor and the server storage code
//!
//! Archive entry names come from untrusted peers. Everything that turns a
//! name into a filesystem path goes through this module so the zip-slip
//! checks live in one place.

use std::path::{Component, Path, PathBuf};

use crate::archive::ArchiveError;

/// Clean an archive entry name into a relative path.
///
/// Backslashes become forward slashes, leading slashes are stripped and
/// `.`/`..` segments are resolved. A `..` that would climb above the root,
/// a drive prefix or a NUL byte makes the name unsafe.
pub fn sanitize_entry_name(raw: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_path = || ArchiveError::UnsafePath {
        entry: raw.to_string(),
    };

    if raw.contains('\0') {
        return Err(unsafe_path());
    }

    let slashed = raw.replace('\\', "/");
    let trimmed = slashed.trim_start_matches('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(unsafe_path());
                }
            }
            s => {
                // "C:" style prefixes are absolute on Windows
                let b = s.as_bytes();
                if parts.is_empty() && b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':' {
                    return Err(unsafe_path());
                }
                parts.push(s);
            }
        }
    }

    let mut out = PathBuf::new();
    for p in parts {
        out.push(p);
    }
    Ok(out)
}

/// Lexically clean a path without touching the filesystem.
pub fn clean_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in p.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve an archive entry name against `root`.
///
/// The result is either `root` itself or a proper descendant of it.
pub fn resolve_under_root(root: &Path, raw: &str) -> Result<PathBuf, ArchiveError> {
    let rel = sanitize_entry_name(raw)?;
    let root = clean_path(root);
    let joined = clean_path(&root.join(&rel));
    if joined != root && !joined.starts_with(&root) {
        return Err(ArchiveError::UnsafePath {
            entry: raw.to_string(),
        });
    }
    Ok(joined)
}

/// Verify that an existing directory still sits under `canonical_root` once
/// symlinks are resolved.
pub fn ensure_within(canonical_root: &Path, dir: &Path, raw: &str) -> Result<(), ArchiveError> {
    let canon = dir.canonicalize().map_err(|e| ArchiveError::io(dir, e))?;
    if !canon.starts_with(canonical_root) {
        return Err(ArchiveError::UnsafePath {
            entry: raw.to_string(),
        });
    }
    Ok(())
}

/// True when `abs` is a filesystem root (`/`, `C:\`).
fn is_filesystem_root(abs: &Path) -> bool {
    abs.parent().is_none()
}

/// Remove everything inside `path`, creating it when missing.
///
/// Refuses to touch a filesystem root or an empty path. Entries named in
/// `keep` (absolute paths) survive the sweep.
pub fn clear_dir(path: &Path, keep: &[&Path]) -> Result<(), ArchiveError> {
    if path.as_os_str().is_empty() {
        return Err(ArchiveError::UnsafeClean {
            path: path.to_path_buf(),
        });
    }
    let abs = if path.is_absolute() {
        clean_path(path)
    } else {
        let cwd = std::env::current_dir().map_err(|e| ArchiveError::io(path, e))?;
        clean_path(&cwd.join(path))
    };
    if is_filesystem_root(&abs) {
        return Err(ArchiveError::UnsafeClean { path: abs });
    }

    std::fs::create_dir_all(&abs).map_err(|e| ArchiveError::io(&abs, e))?;

    let entries = std::fs::read_dir(&abs).map_err(|e| ArchiveError::io(&abs, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(&abs, e))?;
        let child = entry.path();
        if keep.iter().any(|k| *k == child.as_path()) {
            continue;
        }
        let ft = entry.file_type().map_err(|e| ArchiveError::io(&child, e))?;
        let res = if ft.is_dir() {
            std::fs::remove_dir_all(&child)
        } else {
            std::fs::remove_file(&child)
        };
        res.map_err(|e| ArchiveError::io(&child, e))?;
    }
    Ok(())
}

/// Create parent directory if needed
pub fn ensure_parent_exists(path: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_safe_names() {
        assert_eq!(
            sanitize_entry_name("notes/todo.txt").unwrap(),
            PathBuf::from("notes/todo.txt")
        );
        assert_eq!(
            sanitize_entry_name("./notes/./todo.txt").unwrap(),
            PathBuf::from("notes/todo.txt")
        );
        assert_eq!(
            sanitize_entry_name("notes\\sub\\a.txt").unwrap(),
            PathBuf::from("notes/sub/a.txt")
        );
        assert_eq!(sanitize_entry_name("a/../b").unwrap(), PathBuf::from("b"));
        // Leading slashes are stripped, not rejected
        assert_eq!(
            sanitize_entry_name("//etc/passwd").unwrap(),
            PathBuf::from("etc/passwd")
        );
        assert_eq!(sanitize_entry_name("dir/").unwrap(), PathBuf::from("dir"));
    }

    #[test]
    fn test_sanitize_unsafe_names() {
        assert!(sanitize_entry_name("../etc/passwd").is_err());
        assert!(sanitize_entry_name("../../etc/passwd").is_err());
        assert!(sanitize_entry_name("a/../../x").is_err());
        assert!(sanitize_entry_name("..\\..\\windows\\x").is_err());
        assert!(sanitize_entry_name("C:\\Windows\\x").is_err());
        assert!(sanitize_entry_name("file\0.txt").is_err());
    }

    #[test]
    fn test_resolve_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let p = resolve_under_root(root, "sub/file.txt").unwrap();
        assert!(p.starts_with(root));
        assert!(p.ends_with("sub/file.txt"));

        // An entry naming the root itself is allowed
        assert_eq!(resolve_under_root(root, "./").unwrap(), clean_path(root));

        assert!(resolve_under_root(root, "sub/../../escape").is_err());
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_clear_dir_removes_contents_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("storage");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/c.txt"), "x").unwrap();
        fs::write(root.join("top.txt"), "y").unwrap();
        let keep = root.join("keep.zip");
        fs::write(&keep, "spool").unwrap();

        clear_dir(&root, &[keep.as_path()]).unwrap();

        assert!(root.is_dir());
        let left: Vec<_> = fs::read_dir(&root).unwrap().flatten().map(|e| e.path()).collect();
        assert_eq!(left, vec![keep]);
    }

    #[test]
    fn test_clear_dir_creates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("fresh/storage");
        clear_dir(&root, &[]).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_clear_dir_refuses_root() {
        assert!(matches!(
            clear_dir(Path::new("/"), &[]),
            Err(ArchiveError::UnsafeClean { .. })
        ));
        assert!(matches!(
            clear_dir(Path::new(""), &[]),
            Err(ArchiveError::UnsafeClean { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_within_rejects_symlink_escape() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert!(ensure_within(&root, &root.join("link"), "link/x").is_err());
        fs::create_dir(root.join("real")).unwrap();
        assert!(ensure_within(&root, &root.join("real"), "real/x").is_ok());
    }
}
