//! Blocking HTTP client for the upload and download endpoints

use anyhow::{Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::archive::{self, ArchiveStats, PackOptions};
use crate::logger::Logger;
use crate::paths::clear_dir;
use crate::server::handlers::{ARCHIVE_NAME, UPLOAD_FIELD};
use crate::url::endpoint;

/// Outcome of one transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferReport {
    pub stats: ArchiveStats,
    /// Size of the zip that crossed the network
    pub wire_bytes: u64,
    pub elapsed: Duration,
}

impl TransferReport {
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} files, {} dirs, {:.1} KiB in {:.1}s",
            self.stats.files,
            self.stats.dirs,
            self.wire_bytes as f64 / 1024.0,
            self.elapsed.as_secs_f64()
        );
        match self.stats.links_skipped {
            0 => {}
            1 => s.push_str(" (1 symlink skipped)"),
            n => s.push_str(&format!(" ({n} symlinks skipped)")),
        }
        s
    }
}

pub struct SyncClient {
    http: Client,
    server: String,
    token: String,
}

impl SyncClient {
    pub fn new(server: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            server: server.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Replace the server's folder with the contents of `folder`.
    pub fn upload(&self, folder: &Path, logger: &dyn Logger) -> Result<TransferReport> {
        logger.start("upload", folder, &self.server);
        let res = self.upload_inner(folder);
        report("upload", &res, logger);
        res
    }

    fn upload_inner(&self, folder: &Path) -> Result<TransferReport> {
        let started = Instant::now();
        let (mut file, stats) = archive::pack_to_tempfile(folder, &PackOptions::default())
            .with_context(|| format!("pack {}", folder.display()))?;
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let part = Part::reader_with_length(file, len)
            .file_name(ARCHIVE_NAME)
            .mime_str("application/zip")?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let resp = self
            .http
            .post(endpoint(&self.server, "upload"))
            .header(AUTHORIZATION, self.token.as_str())
            .multipart(form)
            .send()
            .with_context(|| format!("POST {}/upload", self.server))?;
        check_status(resp)?;

        Ok(TransferReport {
            stats,
            wire_bytes: len,
            elapsed: started.elapsed(),
        })
    }

    /// Replace `folder` with the server's copy.
    ///
    /// The local folder is only cleared once the whole archive has arrived.
    pub fn download(&self, folder: &Path, logger: &dyn Logger) -> Result<TransferReport> {
        logger.start("download", folder, &self.server);
        let res = self.download_inner(folder);
        report("download", &res, logger);
        res
    }

    fn download_inner(&self, folder: &Path) -> Result<TransferReport> {
        let started = Instant::now();
        let resp = self
            .http
            .get(endpoint(&self.server, "download"))
            .header(AUTHORIZATION, self.token.as_str())
            .send()
            .with_context(|| format!("GET {}/download", self.server))?;
        let mut resp = check_status(resp)?;

        let mut file = tempfile::tempfile().context("create temp archive")?;
        let wire_bytes = resp.copy_to(&mut file).context("receive archive")?;
        file.seek(SeekFrom::Start(0))?;

        clear_dir(folder, &[])?;
        let stats = archive::unpack(file, folder)
            .with_context(|| format!("extract into {}", folder.display()))?;

        Ok(TransferReport {
            stats,
            wire_bytes,
            elapsed: started.elapsed(),
        })
    }
}

fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    anyhow::bail!("server error ({}): {}", status.as_u16(), body.trim())
}

fn report(op: &str, res: &Result<TransferReport>, logger: &dyn Logger) {
    match res {
        Ok(r) => logger.done(op, &r.stats, r.wire_bytes, r.elapsed.as_secs_f64()),
        Err(e) => logger.error(op, &format!("{e:#}")),
    }
}
