//! Client configuration persisted as `config.json`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::url::{expand_path, mask_token};

pub const DEFAULT_SERVER_URL: &str = "http://syncerch.meysner.ru";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            folder_path: String::new(),
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Read `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str::<ClientConfig>(&text)
                .with_context(|| format!("parse config {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ClientConfig::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("read config {}", path.display()))
            }
        };
        if cfg.server_url.trim().is_empty() {
            cfg.server_url = DEFAULT_SERVER_URL.to_string();
        }
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text + "\n")
            .with_context(|| format!("write config {}", path.display()))
    }

    /// True when token or folder still needs to be filled in
    pub fn is_incomplete(&self) -> bool {
        self.token.trim().is_empty() || self.folder_path.trim().is_empty()
    }

    /// Ask on the terminal for whatever is missing.
    pub fn prompt_missing(&mut self) -> Result<()> {
        if self.token.trim().is_empty() {
            let token: String = dialoguer::Input::new()
                .with_prompt("Token")
                .interact_text()
                .context("read token")?;
            self.token = token.trim().to_string();
        }
        if self.folder_path.trim().is_empty() {
            let folder: String = dialoguer::Input::new()
                .with_prompt("Folder path")
                .interact_text()
                .context("read folder path")?;
            self.folder_path = folder.trim().to_string();
        }
        if self.server_url.trim().is_empty() {
            self.server_url = DEFAULT_SERVER_URL.to_string();
        }
        Ok(())
    }

    /// Local folder with `~` and environment variables expanded
    pub fn folder(&self) -> PathBuf {
        expand_path(&self.folder_path)
    }

    /// Lines for `show-config` and the TUI header
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("server", self.server_url.clone()),
            ("folder", self.folder_path.clone()),
            ("token", mask_token(&self.token)),
        ]
    }
}
