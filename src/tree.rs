//! Directory traversal for the archiver
//!
//! `walk_tree` is an explicit iterative walk: walkdir keeps its own stack of
//! open directories, so deep trees never grow the call stack.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::archive::ArchiveError;

/// One file or directory found under a tree root
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    /// Forward-slash path relative to the root, no trailing slash
    pub relative_path: String,
    pub is_dir: bool,
    /// Unix permission bits (0o7777 mask)
    pub mode: u32,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl ArchiveEntry {
    /// Name as stored in the archive; directories carry a trailing `/`
    pub fn archive_name(&self) -> String {
        if self.is_dir {
            format!("{}/", self.relative_path)
        } else {
            self.relative_path.clone()
        }
    }
}

/// Lazy sequence of entries below a root (root itself excluded)
pub struct TreeWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
    links_skipped: u64,
}

/// Walk `root` in filesystem order, or sorted by file name when `sorted`.
pub fn walk_tree(root: &Path, sorted: bool) -> TreeWalk {
    let mut wd = WalkDir::new(root).min_depth(1).follow_links(false);
    if sorted {
        wd = wd.sort_by_file_name();
    }
    TreeWalk {
        root: root.to_path_buf(),
        inner: wd.into_iter(),
        links_skipped: 0,
    }
}

impl TreeWalk {
    /// Symbolic links passed over so far
    pub fn links_skipped(&self) -> u64 {
        self.links_skipped
    }
}

impl Iterator for TreeWalk {
    type Item = Result<ArchiveEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(e) => e,
                Err(e) => return Some(Err(ArchiveError::Walk(e))),
            };

            if entry.file_type().is_symlink() {
                tracing::warn!(path = %entry.path().display(), "skipping symbolic link");
                self.links_skipped += 1;
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => return Some(Err(ArchiveError::Walk(e))),
            };

            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let relative_path = to_slash(rel);
            let is_dir = metadata.is_dir();

            return Some(Ok(ArchiveEntry {
                path: entry.path().to_path_buf(),
                relative_path,
                is_dir,
                mode: permission_bits(&metadata, is_dir),
                size: if is_dir { 0 } else { metadata.len() },
                modified: metadata.modified().ok(),
            }));
        }
    }
}

/// Join path components with `/` regardless of platform
pub fn to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata, _is_dir: bool) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &std::fs::Metadata, is_dir: bool) -> u32 {
    match (is_dir, metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}
