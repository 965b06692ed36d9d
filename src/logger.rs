use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::archive::ArchiveStats;

/// Transfer journal. Every hook defaults to a no-op.
pub trait Logger: Send + Sync {
    fn start(&self, _op: &str, _folder: &Path, _server: &str) {}
    fn done(&self, _op: &str, _stats: &ArchiveStats, _wire_bytes: u64, _seconds: f64) {}
    fn error(&self, _op: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, op: &str, folder: &Path, server: &str) {
        self.line(&format!(
            "START op={op} folder={} server={server}",
            folder.display()
        ));
    }
    fn done(&self, op: &str, stats: &ArchiveStats, wire_bytes: u64, seconds: f64) {
        self.line(&format!(
            "DONE op={op} files={} dirs={} bytes={} wire={wire_bytes} seconds={seconds:.3} links_skipped={}",
            stats.files, stats.dirs, stats.bytes, stats.links_skipped
        ));
    }
    fn error(&self, op: &str, msg: &str) {
        self.line(&format!("ERROR op={op} msg={msg}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_logger_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs/journal.log");
        let logger = TextLogger::new(&path).unwrap();
        logger.start("upload", Path::new("/tmp/f"), "http://h");
        logger.error("upload", "boom");
        drop(logger);

        let again = TextLogger::new(&path).unwrap();
        again.done("download", &ArchiveStats { files: 2, dirs: 1, bytes: 10, links_skipped: 4 }, 99, 0.5);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("START op=upload folder=/tmp/f server=http://h"));
        assert!(lines[1].ends_with("ERROR op=upload msg=boom"));
        assert!(lines[2].contains("files=2 dirs=1 bytes=10 wire=99"));
        assert!(lines[2].ends_with("links_skipped=4"));
    }
}
