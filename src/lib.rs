//! syncerch library
//!
//! Whole-folder replace over HTTP: zip packing and zip-slip-safe extraction,
//! a token-gated axum server, and a blocking client with a terminal menu.

pub mod archive;
pub mod cli;
pub mod client;
pub mod config;
pub mod logger;
pub mod logging;
pub mod paths;
pub mod progress;
pub mod server;
pub mod tokens;
pub mod tree;
pub mod tui;
pub mod url;
