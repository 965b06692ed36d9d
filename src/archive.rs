//! Zip packing and zip-slip safe extraction of whole directory trees

use chrono::{Datelike, Timelike};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::paths;
use crate::tree::walk_tree;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Zip slip: the entry would land outside the destination root
    #[error("illegal file path in zip: {entry}")]
    UnsafePath { entry: String },
    #[error("refusing to clean unsafe path: {}", path.display())]
    UnsafeClean { path: PathBuf },
}

impl ArchiveError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Path-safety violations, as opposed to plain I/O or format failures
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            ArchiveError::UnsafePath { .. } | ArchiveError::UnsafeClean { .. }
        )
    }
}

/// Packing knobs
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Emit entries sorted by name with a fixed timestamp so identical trees
    /// produce identical bytes
    pub sort_by_path: bool,
}

/// Counters reported by pack and unpack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    /// Symbolic links left out of the archive
    pub links_skipped: u64,
}

impl ArchiveStats {
    pub fn entries(&self) -> u64 {
        self.files + self.dirs
    }
}

/// Pack every file and directory under `root` into a zip written to `writer`.
///
/// Any I/O error aborts the whole pack; the caller owns and discards the
/// partial output.
pub fn pack<W: Write + Seek>(
    root: &Path,
    writer: W,
    opts: &PackOptions,
) -> Result<(W, ArchiveStats), ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    let mut stats = ArchiveStats::default();

    let mut walk = walk_tree(root, opts.sort_by_path);
    for entry in walk.by_ref() {
        let entry = entry?;
        let modified = if opts.sort_by_path {
            DateTime::default()
        } else {
            entry.modified.map(zip_time).unwrap_or_default()
        };
        let options = FileOptions::default()
            .unix_permissions(entry.mode)
            .last_modified_time(modified);

        if entry.is_dir {
            zip.add_directory(entry.archive_name(), options)?;
            stats.dirs += 1;
            continue;
        }

        zip.start_file(
            entry.archive_name(),
            options
                .compression_method(CompressionMethod::Deflated)
                .large_file(entry.size >= u32::MAX as u64),
        )?;
        let mut f = File::open(&entry.path).map_err(|e| ArchiveError::io(&entry.path, e))?;
        let n = io::copy(&mut f, &mut zip).map_err(|e| ArchiveError::io(&entry.path, e))?;
        stats.files += 1;
        stats.bytes += n;
    }

    stats.links_skipped = walk.links_skipped();

    let writer = zip.finish()?;
    tracing::debug!(
        root = %root.display(),
        files = stats.files,
        dirs = stats.dirs,
        bytes = stats.bytes,
        links_skipped = stats.links_skipped,
        "packed tree"
    );
    Ok((writer, stats))
}

/// Pack `root` into an anonymous temp file, rewound and ready to read.
///
/// The file has no name on disk, so it disappears with the handle on every
/// exit path.
pub fn pack_to_tempfile(root: &Path, opts: &PackOptions) -> Result<(File, ArchiveStats), ArchiveError> {
    let tmp = tempfile::tempfile().map_err(|e| ArchiveError::io(&std::env::temp_dir(), e))?;
    let (mut file, stats) = pack(root, tmp, opts)?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ArchiveError::io(root, e))?;
    Ok((file, stats))
}

/// Extract a zip into `dest`, rejecting the whole archive if any entry would
/// land outside it.
///
/// All names are checked before the first write. Extraction is not
/// transactional: an I/O failure partway leaves earlier entries on disk.
pub fn unpack<R: Read + Seek>(reader: R, dest: &Path) -> Result<ArchiveStats, ArchiveError> {
    let mut archive = ZipArchive::new(reader)?;
    let root = paths::clean_path(dest);
    fs::create_dir_all(&root).map_err(|e| ArchiveError::io(&root, e))?;
    let canonical_root = root
        .canonicalize()
        .map_err(|e| ArchiveError::io(&root, e))?;

    struct Planned {
        name: String,
        target: PathBuf,
        is_dir: bool,
        mode: Option<u32>,
    }

    let mut plan = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        let name = file.name().to_string();
        let target = paths::resolve_under_root(&root, &name)?;
        // Some writers mark directories only through the mode bits
        let is_dir = file.is_dir()
            || name.ends_with('/')
            || name.ends_with('\\')
            || file.unix_mode().map_or(false, is_dir_mode);
        plan.push(Planned {
            name,
            target,
            is_dir,
            mode: file.unix_mode(),
        });
    }

    let mut stats = ArchiveStats::default();
    for (i, p) in plan.into_iter().enumerate() {
        if p.is_dir {
            fs::create_dir_all(&p.target).map_err(|e| ArchiveError::io(&p.target, e))?;
            paths::ensure_within(&canonical_root, &p.target, &p.name)?;
            stats.dirs += 1;
            continue;
        }

        paths::ensure_parent_exists(&p.target)?;
        if let Some(parent) = p.target.parent() {
            paths::ensure_within(&canonical_root, parent, &p.name)?;
        }
        // Never write through a link left behind in the destination
        if let Ok(md) = fs::symlink_metadata(&p.target) {
            if md.file_type().is_symlink() {
                fs::remove_file(&p.target).map_err(|e| ArchiveError::io(&p.target, e))?;
            }
        }

        let mut src = archive.by_index(i)?;
        let mut out = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&p.target)
            .map_err(|e| ArchiveError::io(&p.target, e))?;
        let n = io::copy(&mut src, &mut out).map_err(|e| ArchiveError::io(&p.target, e))?;
        out.flush().map_err(|e| ArchiveError::io(&p.target, e))?;
        drop(out);
        apply_mode(&p.target, p.mode)?;

        stats.files += 1;
        stats.bytes += n;
    }

    tracing::debug!(
        dest = %dest.display(),
        files = stats.files,
        dirs = stats.dirs,
        bytes = stats.bytes,
        "extracted archive"
    );
    Ok(stats)
}

fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Only the rwx bits are restored; setuid, setgid and sticky are dropped
#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    let Some(mode) = mode.map(|m| m & 0o777) else {
        return Ok(());
    };
    if mode == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| ArchiveError::io(path, e))
}

#[cfg(not(unix))]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<(), ArchiveError> {
    if let Some(m) = mode {
        if m & 0o222 == 0 {
            let mut perms = fs::metadata(path).map_err(|e| ArchiveError::io(path, e))?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(path, perms).map_err(|e| ArchiveError::io(path, e))?;
        }
    }
    Ok(())
}

/// Local wall-clock time in zip's DOS format; pre-1980 times fall back to the epoch
fn zip_time(t: SystemTime) -> DateTime {
    let dt: chrono::DateTime<chrono::Local> = t.into();
    DateTime::from_date_and_time(
        dt.year().clamp(0, u16::MAX as i32) as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    )
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("notes/empty")).unwrap();
        fs::create_dir_all(root.join("src/deep/er")).unwrap();
        fs::write(root.join("notes/todo.txt"), "buy milk").unwrap();
        fs::write(root.join("src/deep/er/data.bin"), vec![7u8; 200_000]).unwrap();
        fs::write(root.join("readme.md"), "# hi\n").unwrap();
    }

    /// relative path -> Some(contents) for files, None for directories
    fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        walk_tree(root, true)
            .map(|e| {
                let e = e.unwrap();
                let content = if e.is_dir {
                    None
                } else {
                    Some(fs::read(&e.path).unwrap())
                };
                (e.relative_path, content)
            })
            .collect()
    }

    /// Hand-build an archive containing arbitrary entry names
    fn raw_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Rewrite the central directory record of `name` as a unix host would
    /// write it, with `mode` in the high half of the external attributes
    fn set_unix_mode(bytes: &mut [u8], name: &str, mode: u32) {
        let sig = 0x0201_4b50u32.to_le_bytes();
        for i in 0..bytes.len().saturating_sub(46) {
            if bytes[i..i + 4] != sig {
                continue;
            }
            let name_len = u16::from_le_bytes([bytes[i + 28], bytes[i + 29]]) as usize;
            if bytes.get(i + 46..i + 46 + name_len) != Some(name.as_bytes()) {
                continue;
            }
            // version made by: high byte 3 is unix
            bytes[i + 5] = 3;
            let dos = if is_dir_mode(mode) { 0x10 } else { 0 };
            bytes[i + 38..i + 42].copy_from_slice(&((mode << 16) | dos).to_le_bytes());
            return;
        }
        panic!("no central directory record for {name}");
    }

    #[test]
    fn test_round_trip_preserves_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_tree(src.path());

        let (cursor, packed) =
            pack(src.path(), Cursor::new(Vec::new()), &PackOptions::default()).unwrap();
        assert_eq!(packed.files, 3);
        assert_eq!(packed.dirs, 5);

        let unpacked = unpack(Cursor::new(cursor.into_inner()), dst.path()).unwrap();
        assert_eq!(unpacked, packed);
        assert_eq!(snapshot(src.path()), snapshot(dst.path()));
        assert!(dst.path().join("notes/empty").is_dir());
    }

    #[test]
    fn test_directory_entries_are_marked() {
        let src = TempDir::new().unwrap();
        build_tree(src.path());
        let (cursor, _) = pack(
            src.path(),
            Cursor::new(Vec::new()),
            &PackOptions { sort_by_path: true },
        )
        .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names[0], "notes/");
        assert!(names.contains(&"notes/todo.txt".to_string()));
        assert!(names.iter().all(|n| !n.starts_with('/') && !n.contains('\\')));
        let todo = archive.by_name("notes/todo.txt").unwrap();
        assert_eq!(todo.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_sorted_pack_is_deterministic() {
        let src = TempDir::new().unwrap();
        build_tree(src.path());
        let opts = PackOptions { sort_by_path: true };
        let (a, _) = pack(src.path(), Cursor::new(Vec::new()), &opts).unwrap();
        let (b, _) = pack(src.path(), Cursor::new(Vec::new()), &opts).unwrap();
        assert_eq!(a.into_inner(), b.into_inner());
    }

    #[test]
    fn test_extract_twice_is_idempotent() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_tree(src.path());
        let (cursor, _) =
            pack(src.path(), Cursor::new(Vec::new()), &PackOptions::default()).unwrap();
        let bytes = cursor.into_inner();

        paths::clear_dir(dst.path(), &[]).unwrap();
        unpack(Cursor::new(bytes.clone()), dst.path()).unwrap();
        let first = snapshot(dst.path());

        paths::clear_dir(dst.path(), &[]).unwrap();
        unpack(Cursor::new(bytes), dst.path()).unwrap();
        assert_eq!(first, snapshot(dst.path()));
    }

    #[test]
    fn test_zip_slip_rejected_before_any_write() {
        let parent = TempDir::new().unwrap();
        let dest = parent.path().join("dest");
        let bytes = raw_zip(&[
            ("ok.txt", "fine"),
            ("../../etc/passwd", "pwned"),
        ]);

        let err = unpack(Cursor::new(bytes), &dest).unwrap_err();
        assert!(err.is_security(), "unexpected error: {err}");
        assert!(matches!(err, ArchiveError::UnsafePath { ref entry } if entry == "../../etc/passwd"));
        // Nothing written, not even the harmless entry that came first
        assert!(!dest.join("ok.txt").exists());
        assert!(!parent.path().join("etc").exists());
    }

    #[test]
    fn test_zip_slip_variants_rejected() {
        for name in ["../escape.txt", "a/../../escape.txt", "..\\escape.txt", "C:/escape.txt"] {
            let dest = TempDir::new().unwrap();
            let bytes = raw_zip(&[(name, "x")]);
            let err = unpack(Cursor::new(bytes), dest.path()).unwrap_err();
            assert!(err.is_security(), "{name} was not rejected: {err}");
        }
    }

    #[test]
    fn test_leading_slash_stays_inside_dest() {
        let dest = TempDir::new().unwrap();
        let bytes = raw_zip(&[("/abs/file.txt", "inside")]);
        unpack(Cursor::new(bytes), dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("abs/file.txt")).unwrap(), b"inside");
    }

    #[test]
    fn test_backslash_names_are_normalized() {
        let dest = TempDir::new().unwrap();
        let bytes = raw_zip(&[("win\\style\\a.txt", "a")]);
        unpack(Cursor::new(bytes), dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("win/style/a.txt")).unwrap(), b"a");
    }

    #[test]
    fn test_existing_file_is_truncated() {
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("f.txt"), "a much longer previous body").unwrap();
        let bytes = raw_zip(&[("f.txt", "short")]);
        unpack(Cursor::new(bytes), dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("f.txt")).unwrap(), b"short");
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        let dest = TempDir::new().unwrap();
        let err = unpack(Cursor::new(b"not a zip".to_vec()), dest.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip(_)));
    }

    #[test]
    fn test_pack_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let res = pack(&tmp.path().join("missing"), Cursor::new(Vec::new()), &PackOptions::default());
        assert!(res.is_err());
    }

    #[test]
    fn test_pack_to_tempfile_is_rewound() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_tree(src.path());
        let (file, stats) = pack_to_tempfile(src.path(), &PackOptions::default()).unwrap();
        assert_eq!(unpack(file, dst.path()).unwrap(), stats);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_preserved() {
        use std::os::unix::fs::PermissionsExt;
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let script = src.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();

        let (cursor, _) =
            pack(src.path(), Cursor::new(Vec::new()), &PackOptions::default()).unwrap();
        unpack(Cursor::new(cursor.into_inner()), dst.path()).unwrap();

        let mode = fs::metadata(dst.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_directory_flagged_by_mode_only() {
        let dest = TempDir::new().unwrap();
        let mut bytes = raw_zip(&[("somedir", ""), ("somedir/x.txt", "x")]);
        set_unix_mode(&mut bytes, "somedir", 0o040755);

        let stats = unpack(Cursor::new(bytes), dest.path()).unwrap();
        assert!(dest.path().join("somedir").is_dir());
        assert_eq!(fs::read(dest.path().join("somedir/x.txt")).unwrap(), b"x");
        assert_eq!(stats.dirs, 1);
        assert_eq!(stats.files, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_special_mode_bits_are_dropped() {
        use std::os::unix::fs::PermissionsExt;
        let dest = TempDir::new().unwrap();
        let mut bytes = raw_zip(&[("tool", "#!/bin/sh\n"), ("shared", "s")]);
        set_unix_mode(&mut bytes, "tool", 0o104755);
        set_unix_mode(&mut bytes, "shared", 0o103775);

        unpack(Cursor::new(bytes), dest.path()).unwrap();
        let mode_of = |name: &str| fs::metadata(dest.path().join(name)).unwrap().permissions().mode();
        assert_eq!(mode_of("tool") & 0o7777, 0o755);
        assert_eq!(mode_of("shared") & 0o7777, 0o775);
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_counts_skipped_links() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real.txt", src.path().join("alias.txt")).unwrap();
        std::os::unix::fs::symlink("/etc", src.path().join("etc-link")).unwrap();

        let (cursor, packed) =
            pack(src.path(), Cursor::new(Vec::new()), &PackOptions::default()).unwrap();
        assert_eq!(packed.files, 1);
        assert_eq!(packed.links_skipped, 2);

        let unpacked = unpack(Cursor::new(cursor.into_inner()), dst.path()).unwrap();
        assert_eq!(unpacked.files, 1);
        assert_eq!(unpacked.links_skipped, 0);
        assert!(!dst.path().join("alias.txt").exists());
    }
}
