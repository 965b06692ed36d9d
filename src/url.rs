//! Server URL and local folder path normalization for the client

use reqwest::Url;
use std::path::PathBuf;

/// Normalize a user-entered server address.
///
/// Adds `http://` when no scheme is given and drops trailing slashes.
/// Returns `None` for input that is empty or not an absolute http(s) URL.
pub fn normalize_server_url(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let lower = s.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        s.to_string()
    } else {
        format!("http://{s}")
    };
    let trimmed = with_scheme.trim_end_matches('/').to_string();
    let parsed = Url::parse(&trimmed).ok()?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return None;
    }
    Some(trimmed)
}

/// `<server>/<path>` without doubled slashes
pub fn endpoint(server: &str, path: &str) -> String {
    format!(
        "{}/{}",
        server.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Expand `$VAR` / `${VAR}` and a leading `~` in a folder path.
pub fn expand_path(input: &str) -> PathBuf {
    let expanded = expand_env(input.trim());
    let s = expanded.trim();
    if s == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = s.strip_prefix("~/").or_else(|| s.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

/// Unset variables expand to the empty string
fn expand_env(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let mut n = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                n.push(ch);
            }
            n
        } else {
            let mut n = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    n.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            n
        };
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&std::env::var(&name).unwrap_or_default());
        }
    }
    out
}

/// Show the first and last two characters of a token
pub fn mask_token(token: &str) -> String {
    let t = token.trim();
    let n = t.chars().count();
    if n <= 4 {
        return t.to_string();
    }
    let head: String = t.chars().take(2).collect();
    let tail: String = t.chars().skip(n - 2).collect();
    format!("{head}{}{tail}", "*".repeat(n - 4))
}
