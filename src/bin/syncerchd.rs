use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use syncerch::cli::ServerOpts;
use syncerch::{logging, server};

fn main() -> Result<()> {
    let opts = ServerOpts::parse();
    logging::init_logging(opts.verbose, opts.json_logs)?;

    if opts.storage.exists() && !opts.storage.is_dir() {
        anyhow::bail!("Error: storage path is not a directory: {}", opts.storage.display());
    }

    // Security warning for 0.0.0.0 binding
    if opts.host == "0.0.0.0" {
        tracing::warn!("binding to 0.0.0.0 exposes the daemon on all interfaces; tokens travel in plain HTTP unless a TLS proxy sits in front");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(async {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            server::shutdown_signal().await;
            trigger.cancel();
        });
        server::run(&opts, shutdown).await
    })?;

    tracing::info!("bye");
    Ok(())
}
