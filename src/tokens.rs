//! Bearer token set backed by a line-delimited file
//!
//! The server loads the file once at startup and then polls its mtime,
//! swapping in a freshly parsed set whenever the file changes. Membership
//! checks hold the read lock only for the hash lookup. A reload parses the
//! file outside the lock and then replaces the whole set under the write
//! lock, so a check sees either the old set or the new one.

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Length of tokens minted by `syncerch-token`
pub const DEFAULT_TOKEN_LEN: usize = 64;

pub struct TokenStore {
    path: PathBuf,
    tokens: RwLock<Arc<HashSet<String>>>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl TokenStore {
    /// Load the token file. A missing or unreadable file leaves the set
    /// empty; the watcher picks the file up once it appears.
    pub fn load(path: &Path) -> Self {
        let store = Self {
            path: path.to_path_buf(),
            tokens: RwLock::new(Arc::new(HashSet::new())),
            last_modified: Mutex::new(None),
        };
        if let Err(e) = store.reload() {
            tracing::warn!(path = %path.display(), "no tokens loaded: {e:#}");
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Membership test against the current set
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.read().contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read and parse the file, then swap the whole set in one step.
    pub fn reload(&self) -> Result<usize> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read token file {}", self.path.display()))?;
        let fresh = Arc::new(parse_tokens(&text));
        let n = fresh.len();

        *self.tokens.write() = fresh;
        *self.last_modified.lock() = modified;
        tracing::info!(count = n, "tokens loaded");
        Ok(n)
    }

    /// Reload only if the file's mtime moved past the last load.
    ///
    /// Returns `Ok(true)` when a new set was swapped in. A stat failure is
    /// reported as `Ok(false)`; the current set stays in effect.
    pub fn refresh_if_changed(&self) -> Result<bool> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), "token file stat failed: {e}");
                return Ok(false);
            }
        };
        let advanced = match *self.last_modified.lock() {
            Some(prev) => modified > prev,
            None => true,
        };
        if !advanced {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    /// Poll the token file every `every` until `shutdown` fires.
    pub fn spawn_watcher(self: &Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let every = if every.is_zero() {
            Duration::from_secs(5)
        } else {
            every
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the startup load already ran
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = store.refresh_if_changed() {
                    tracing::warn!("token refresh skipped: {e:#}");
                }
            }
        })
    }
}

/// One token per line; surrounding whitespace trimmed, blank lines ignored
pub fn parse_tokens(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Random `[A-Za-z0-9]` token from the OS RNG
pub fn generate_token(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Append `token` as a new line, creating the file if needed
pub fn append_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open token file {}", path.display()))?;
    writeln!(f, "{token}").with_context(|| format!("write token file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Push the mtime forward so coarse-grained filesystems still see a change
    fn touch_future(path: &Path, secs: u64) {
        let f = fs::File::options().append(true).open(path).unwrap();
        f.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_parse_tokens_trims_and_skips_blanks() {
        let set = parse_tokens("abc123\n\n  def456  \r\n\t\nabc123\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("abc123"));
        assert!(set.contains("def456"));
    }

    #[test]
    fn test_load_and_contains() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.txt");
        fs::write(&path, "abc123\n").unwrap();

        let store = TokenStore::load(&path);
        assert!(store.contains("abc123"));
        assert!(!store.contains("abc12"));
        assert!(!store.contains(""));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_file_is_empty_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::load(&dir.path().join("absent.txt"));
        assert!(store.is_empty());
        assert!(!store.refresh_if_changed().unwrap());
    }

    #[test]
    fn test_refresh_only_when_mtime_advances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.txt");
        fs::write(&path, "first\n").unwrap();
        let store = TokenStore::load(&path);

        assert!(!store.refresh_if_changed().unwrap());

        append_token(&path, "second").unwrap();
        touch_future(&path, 2);
        assert!(store.refresh_if_changed().unwrap());
        assert!(store.contains("first"));
        assert!(store.contains("second"));

        assert!(!store.refresh_if_changed().unwrap());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.txt");
        fs::write(&path, "keep\n").unwrap();
        let store = TokenStore::load(&path);

        fs::remove_file(&path).unwrap();
        assert!(!store.refresh_if_changed().unwrap());
        assert!(store.contains("keep"));
    }

    #[test]
    fn test_reload_replaces_whole_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.txt");
        fs::write(&path, "old-a\nold-b\n").unwrap();
        let store = Arc::new(TokenStore::load(&path));

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    // never a mix of both sets and never empty
                    let n = store.len();
                    assert!(n == 2 || n == 3, "saw {n} tokens");
                }
            })
        };
        for i in 0..50 {
            let body = if i % 2 == 0 { "new-a\nnew-b\nnew-c\n" } else { "old-a\nold-b\n" };
            fs::write(&path, body).unwrap();
            store.reload().unwrap();
        }
        reader.join().unwrap();

        fs::write(&path, "new-a\n").unwrap();
        store.reload().unwrap();
        assert!(store.contains("new-a"));
        assert!(!store.contains("old-a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_generate_token_shape() {
        let t = generate_token(DEFAULT_TOKEN_LEN);
        assert_eq!(t.len(), 64);
        assert!(t.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(t, generate_token(DEFAULT_TOKEN_LEN));
    }

    #[test]
    fn test_append_token_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/tokens.txt");
        append_token(&path, "one").unwrap();
        append_token(&path, "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_watcher_picks_up_new_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.txt");
        fs::write(&path, "old\n").unwrap();
        let store = Arc::new(TokenStore::load(&path));
        let shutdown = CancellationToken::new();
        let handle = store.spawn_watcher(Duration::from_millis(50), shutdown.clone());

        assert!(!store.contains("fresh"));
        append_token(&path, "fresh").unwrap();
        touch_future(&path, 2);

        let mut seen = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            if store.contains("fresh") {
                seen = true;
                break;
            }
        }
        assert!(seen, "watcher never reloaded the token file");

        shutdown.cancel();
        handle.await.unwrap();
    }
}
