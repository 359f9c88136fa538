//! Trek server binary: wire providers from the environment, open the
//! state database, and serve the API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trek_runtime::{NodeContext, SessionDriver, ThreadRegistry};
use trek_server::{AppState, router};
use trek_store::{ConnectionConfig, StateStore, new_file, run_migrations};
use trek_tools::PlaceholderFlights;

#[derive(Debug, Parser)]
#[command(name = "trek", about = "Trip-planning orchestration server")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "TREK_PORT", default_value_t = 8787)]
    port: u16,

    /// Path to the state database.
    #[arg(long, env = "TREK_DB", default_value = "trek.db")]
    db: PathBuf,

    /// Maximum concurrent runs across all threads.
    #[arg(long, env = "TREK_MAX_CONCURRENT", default_value_t = 8)]
    max_concurrent: usize,

    /// Per-lookup deadline in seconds.
    #[arg(long, env = "TREK_TOOL_TIMEOUT", default_value_t = 20)]
    tool_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let pool = new_file(&args.db, &ConnectionConfig::default())
        .with_context(|| format!("opening state database at {}", args.db.display()))?;
    {
        let conn = pool.get().context("checking out migration connection")?;
        let applied = run_migrations(&conn).context("running migrations")?;
        if applied > 0 {
            info!(applied, "applied schema migrations");
        }
    }
    let store = Arc::new(StateStore::new(pool));

    // Providers degrade to deterministic placeholders when keys are
    // missing; see trek-llm and trek-tools.
    let ctx = NodeContext::new(
        trek_llm::planner_from_env(),
        trek_tools::place_directory_from_env(),
        Arc::new(PlaceholderFlights::new()),
    )
    .with_tool_timeout(std::time::Duration::from_secs(args.tool_timeout));

    let registry = Arc::new(ThreadRegistry::new(args.max_concurrent));
    let driver = Arc::new(SessionDriver::new(Arc::clone(&store), ctx));
    let metrics = trek_server::metrics::install_recorder().context("installing metrics recorder")?;
    let state = AppState::new(store, Arc::clone(&registry), driver, metrics);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("server error")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(registry: Arc<ThreadRegistry>) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    info!("shutdown signal received, cancelling runs");
    registry.cancel_all();
}
