use anyhow::Context;
use tracing_subscriber::EnvFilter;

use gitflow_backend::config::Config;
use gitflow_backend::db::Db;
use gitflow_backend::mcp;
use gitflow_backend::migrate::{Migrator, DEFAULT_MIGRATIONS_DIR};
use gitflow_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("configuration")?;

    // stdout belongs to the MCP transport; every log byte goes to stderr.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.app.log_level));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let db = Db::connect(&config.database).await.context("database")?;
    Migrator::new(db.clone(), DEFAULT_MIGRATIONS_DIR)
        .run(false)
        .await
        .context("migrations")?;

    let state = AppState::new(config, db);

    // Repair any credentialed remote URLs a crashed run may have left.
    if let Err(e) = state.scrub_stale_credentials().await {
        tracing::warn!(error = %e, "startup credential scrub incomplete");
    }

    // Background upkeep: OAuth state sweeper + daily stale-session cleanup.
    let sweeper = state.auth.spawn_state_sweeper();
    let janitor = spawn_session_janitor(state.clone());

    // OAuth callback listener, bound to the redirect URI's port.
    let port = state.config.callback_port();
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding OAuth callback listener on {addr}"))?;
    tracing::info!(%addr, "OAuth callback listener ready");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let http = {
        let app = gitflow_backend::create_router(state.clone());
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "OAuth callback listener failed");
            }
        })
    };

    // Propagate SIGINT/SIGTERM into the shutdown channel.
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });
    }

    tracing::info!("MCP server ready on stdio");
    mcp::server::run_stdio(state.clone(), shutdown_rx).await;

    // Drain: the stdio loop returned (EOF or signal). Stop the listener and
    // background tasks, then release the pool.
    let _ = shutdown_tx.send(true);
    let _ = http.await;
    sweeper.abort();
    janitor.abort();
    state.db.close().await;
    tracing::info!("shutdown complete");

    Ok(())
}

/// Abandon sessions idle for 30 days, once a day.
fn spawn_session_janitor(state: AppState) -> tokio::task::JoinHandle<()> {
    const STALE_DAYS: i64 = 30;
    const INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);
    tokio::spawn(async move {
        loop {
            if let Err(e) = state.sessions.cleanup_stale(STALE_DAYS).await {
                tracing::warn!(error = %e, "stale session cleanup failed");
            }
            tokio::time::sleep(INTERVAL).await;
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("shutdown signal received");
}
