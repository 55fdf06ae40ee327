//! ultrai-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from the environment (fails fast on a missing
//!    `OPENROUTER_API_KEY`, per §7's "refused synchronously by the
//!    controller").
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Build the shared `AppState` (artifact store, progress tracker, live
//!    gateway client).
//! 4. Build the Axum router and start the HTTP server with graceful
//!    shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use ultrai_orchestrator::api::{router, AppState};
use ultrai_orchestrator::config::Config;
use ultrai_orchestrator::gateway::OpenRouterGateway;
use ultrai_orchestrator::progress::ProgressTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "ultrai-server starting");

    let state = AppState {
        store: Arc::new(ultrai_orchestrator::artifact::ArtifactStore::new(config.runs_base.clone())),
        tracker: Arc::new(ProgressTracker::new()),
        gateway: Arc::new(OpenRouterGateway::new()),
        config: Arc::new(config),
    };

    let app = router(state);
    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let addr: SocketAddr = bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("ultrai-server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
