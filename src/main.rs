//! syncerch client
//!
//! Without a subcommand opens the interactive menu; `upload`, `download` and
//! `show-config` run one action and exit.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use syncerch::cli::{ClientCommand, ClientOpts};
use syncerch::client::SyncClient;
use syncerch::config::ClientConfig;
use syncerch::logger::{Logger, NoopLogger, TextLogger};
use syncerch::progress::TransferSpinner;
use syncerch::tui;

fn main() -> Result<()> {
    let opts = ClientOpts::parse();

    let mut cfg = ClientConfig::load(&opts.config)?;
    if cfg.is_incomplete() && !matches!(opts.command, Some(ClientCommand::ShowConfig)) {
        cfg.prompt_missing()?;
        cfg.save(&opts.config)?;
    }

    let logger: Arc<dyn Logger> = match &opts.log_file {
        Some(p) => Arc::new(
            TextLogger::new(p).with_context(|| format!("open log file {}", p.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    match opts.command {
        None => tui::run(cfg, opts.config.clone(), logger),
        Some(ClientCommand::ShowConfig) => {
            println!("config: {}", opts.config.display());
            for (k, v) in cfg.describe() {
                println!("{k:>7}: {v}");
            }
            Ok(())
        }
        Some(ClientCommand::Upload) => transfer(&cfg, logger.as_ref(), true),
        Some(ClientCommand::Download) => transfer(&cfg, logger.as_ref(), false),
    }
}

fn transfer(cfg: &ClientConfig, logger: &dyn Logger, upload: bool) -> Result<()> {
    // Interrupting leaves the remote or local folder as the server/unpacker left it
    ctrlc::set_handler(|| {
        eprintln!("\nInterrupted");
        std::process::exit(130);
    })
    .context("install Ctrl+C handler")?;

    let folder = cfg.folder();
    let client = SyncClient::new(&cfg.server_url, &cfg.token)?;
    let spinner = TransferSpinner::new(&format!(
        "{} {} {} {}",
        if upload { "Uploading" } else { "Downloading" },
        folder.display(),
        if upload { "to" } else { "from" },
        client.server()
    ));

    let res = if upload {
        client.upload(&folder, logger)
    } else {
        client.download(&folder, logger)
    };
    match res {
        Ok(report) => {
            spinner.success(&report.summary());
            Ok(())
        }
        Err(e) => {
            spinner.failure(&format!("{e:#}"));
            Err(e)
        }
    }
}
