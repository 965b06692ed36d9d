//! HTTP daemon: token-gated upload and download of a single storage folder

pub mod handlers;
pub mod storage;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::cli::ServerOpts;
use crate::tokens::TokenStore;
use storage::Storage;

/// In-flight requests get this long to finish after a shutdown signal
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Upload size handling
#[derive(Clone, Debug)]
pub struct UploadLimits {
    /// Where oversized upload bodies spill to
    pub spool_dir: PathBuf,
    /// Bytes kept in memory before spilling
    pub memory_limit: usize,
    /// Request body cap, `None` for unlimited
    pub max_upload: Option<u64>,
}

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub tokens: Arc<TokenStore>,
    pub limits: UploadLimits,
}

pub fn router(state: AppState) -> Router {
    let body_limit = match state.limits.max_upload {
        Some(n) => DefaultBodyLimit::max(n.min(usize::MAX as u64) as usize),
        None => DefaultBodyLimit::disable(),
    };

    let protected = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/download", get(handlers::download))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::require_token))
        .layer(body_limit);

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(protected)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` fires, then drain.
pub async fn serve_listener(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let app = router(state);
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut task = tokio::spawn(server.into_future());

    tokio::select! {
        res = &mut task => {
            res.context("server task panicked")?.context("server failed")?;
            return Ok(());
        }
        _ = shutdown.cancelled() => {}
    }

    tracing::info!("shutting down, draining in-flight requests");
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(res) => res.context("server task panicked")?.context("server failed")?,
        Err(_) => {
            tracing::warn!("drain timeout after {:?}, dropping remaining requests", DRAIN_TIMEOUT);
            task.abort();
        }
    }
    Ok(())
}

/// Build state from options, bind, and serve until `shutdown` fires.
pub async fn run(opts: &ServerOpts, shutdown: CancellationToken) -> Result<()> {
    std::fs::create_dir_all(&opts.storage)
        .with_context(|| format!("failed to create storage dir {}", opts.storage.display()))?;

    let mut spool_dir = opts.spool_dir();
    if let Err(e) = std::fs::create_dir_all(&spool_dir) {
        tracing::warn!(
            path = %spool_dir.display(),
            "cannot create upload spool dir ({e}), using system temp dir"
        );
        spool_dir = std::env::temp_dir();
    }

    let tokens = Arc::new(TokenStore::load(&opts.tokens));
    let watcher = tokens.spawn_watcher(opts.refresh_interval(), shutdown.clone());

    let state = AppState {
        storage: Arc::new(Storage::new(&opts.storage)),
        tokens,
        limits: UploadLimits {
            spool_dir,
            memory_limit: opts.memory_limit(),
            max_upload: opts.upload_limit(),
        },
    };

    let bind = opts.bind_addr();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    tracing::info!(
        bind = %bind,
        storage = %opts.storage.display(),
        tokens = %opts.tokens.display(),
        "listening"
    );

    let res = serve_listener(listener, state, shutdown.clone()).await;
    shutdown.cancel();
    let _ = watcher.await;
    res
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("received termination signal");
}
