//! Server-side storage root and upload spooling

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::archive::{self, ArchiveError, ArchiveStats, PackOptions};
use crate::paths;

/// The served folder plus the lock that serializes access to it.
///
/// Uploads replace the tree under the write half; downloads pack it under
/// the read half, so a download never sees a half-extracted upload.
pub struct Storage {
    root: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl Storage {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn read(&self) -> OwnedRwLockReadGuard<()> {
        Arc::clone(&self.lock).read_owned().await
    }

    pub async fn write(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.lock).write_owned().await
    }

    /// Stat the root; `/readyz` reports the error when this fails
    pub fn check_ready(&self) -> io::Result<()> {
        std::fs::metadata(&self.root).map(|_| ())
    }

    /// Clear the tree and extract the spooled archive into it.
    ///
    /// The guard argument proves the caller holds the write lock.
    pub fn replace_contents(
        &self,
        _guard: &OwnedRwLockWriteGuard<()>,
        spool: UploadSpool,
    ) -> Result<ArchiveStats, ArchiveError> {
        let keep: Vec<&Path> = spool.disk_path().into_iter().collect();
        paths::clear_dir(&self.root, &keep)?;
        let reader = spool.into_reader()?;
        archive::unpack(reader, &self.root)
    }

    /// Pack the current tree into an anonymous temp file.
    pub fn snapshot(&self, _guard: &OwnedRwLockReadGuard<()>) -> Result<(File, ArchiveStats), ArchiveError> {
        archive::pack_to_tempfile(&self.root, &PackOptions::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("upload exceeds limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("spool write failed: {0}")]
    Io(#[from] io::Error),
}

/// Upload body buffered in memory up to a threshold, then spilled to a temp
/// file in the spool directory. Dropping it removes the file.
pub struct UploadSpool {
    dir: PathBuf,
    memory_limit: usize,
    max_bytes: Option<u64>,
    written: u64,
    inner: SpoolInner,
}

enum SpoolInner {
    Memory(Vec<u8>),
    Disk(NamedTempFile),
}

impl UploadSpool {
    pub fn new(dir: &Path, memory_limit: usize, max_bytes: Option<u64>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            memory_limit,
            max_bytes,
            written: 0,
            inner: SpoolInner::Memory(Vec::new()),
        }
    }

    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Path of the spill file, if the body outgrew memory
    pub fn disk_path(&self) -> Option<&Path> {
        match &self.inner {
            SpoolInner::Memory(_) => None,
            SpoolInner::Disk(f) => Some(f.path()),
        }
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SpoolError> {
        let next = self.written + chunk.len() as u64;
        if let Some(limit) = self.max_bytes {
            if next > limit {
                return Err(SpoolError::TooLarge { limit });
            }
        }

        if let SpoolInner::Memory(buf) = &mut self.inner {
            if buf.len() + chunk.len() <= self.memory_limit {
                buf.extend_from_slice(chunk);
                self.written = next;
                return Ok(());
            }
            std::fs::create_dir_all(&self.dir)?;
            let mut file = tempfile::Builder::new()
                .prefix(".upload-")
                .suffix(".zip")
                .tempfile_in(&self.dir)?;
            file.write_all(buf)?;
            tracing::debug!(path = %file.path().display(), "upload spilled to disk");
            self.inner = SpoolInner::Disk(file);
        }

        if let SpoolInner::Disk(file) = &mut self.inner {
            file.write_all(chunk)?;
        }
        self.written = next;
        Ok(())
    }

    /// Rewound reader over everything written so far
    pub fn into_reader(self) -> Result<SpoolReader, ArchiveError> {
        match self.inner {
            SpoolInner::Memory(buf) => Ok(SpoolReader::Memory(Cursor::new(buf))),
            SpoolInner::Disk(mut file) => {
                let path = file.path().to_path_buf();
                file.flush().map_err(|e| ArchiveError::io(&path, e))?;
                file.seek(SeekFrom::Start(0))
                    .map_err(|e| ArchiveError::io(&path, e))?;
                Ok(SpoolReader::Disk(file))
            }
        }
    }
}

pub enum SpoolReader {
    Memory(Cursor<Vec<u8>>),
    Disk(NamedTempFile),
}

impl Read for SpoolReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SpoolReader::Memory(c) => c.read(buf),
            SpoolReader::Disk(f) => f.read(buf),
        }
    }
}

impl Seek for SpoolReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SpoolReader::Memory(c) => c.seek(pos),
            SpoolReader::Disk(f) => f.seek(pos),
        }
    }
}
