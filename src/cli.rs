//! Shared CLI definitions for the client, daemon and token tool

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon options; every flag can also come from the environment
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "syncerch daemon: serves one folder over token-authenticated HTTP")]
pub struct ServerOpts {
    /// Storage directory replaced by uploads and served by downloads
    #[arg(long, env = "STORAGE_PATH", default_value = "/data")]
    pub storage: PathBuf,

    /// Line-delimited token file
    #[arg(long, env = "TOKENS_PATH", default_value = "/run/secrets/tokens.txt")]
    pub tokens: PathBuf,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 1244)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Upload bytes kept in memory before spilling to disk (MiB)
    #[arg(long, env = "MAX_MULTIPART_MB", default_value_t = 8)]
    pub max_multipart_mb: u64,

    /// Cap on the whole upload request (MiB, 0 = unlimited)
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 0)]
    pub max_upload_mb: u64,

    /// Token file poll interval in seconds
    #[arg(long, env = "TOKENS_REFRESH_SECS", default_value_t = 5)]
    pub tokens_refresh_secs: u64,

    /// Directory for upload spool files (defaults to a sibling of the storage directory)
    #[arg(long, env = "UPLOAD_TMP_PATH")]
    pub upload_tmp: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl ServerOpts {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn memory_limit(&self) -> usize {
        (self.max_multipart_mb.saturating_mul(1024 * 1024)).min(usize::MAX as u64) as usize
    }

    pub fn upload_limit(&self) -> Option<u64> {
        match self.max_upload_mb {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.tokens_refresh_secs.max(1))
    }

    /// Spool directory: explicit option, else `.<storage-name>-uploads` next to storage
    pub fn spool_dir(&self) -> PathBuf {
        if let Some(p) = &self.upload_tmp {
            return p.clone();
        }
        let name = self
            .storage
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "storage".to_string());
        self.storage.with_file_name(format!(".{name}-uploads"))
    }
}

/// Client options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "syncerch: replace a remote folder with a local one, or the reverse")]
pub struct ClientOpts {
    /// Client config file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Append transfer events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<ClientCommand>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum ClientCommand {
    /// Replace the remote folder with the local one
    Upload,
    /// Replace the local folder with the remote one
    Download,
    /// Print the active configuration (token masked)
    ShowConfig,
}

/// Token tool options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Append a new random token to the token file")]
pub struct TokenOpts {
    /// Token file to append to
    #[arg(long, env = "TOKENS_PATH", default_value = "./tokens.txt")]
    pub file: PathBuf,

    /// Token length in characters
    #[arg(long, default_value_t = crate::tokens::DEFAULT_TOKEN_LEN)]
    pub length: usize,
}
