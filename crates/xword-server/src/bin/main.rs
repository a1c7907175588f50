use std::net::SocketAddr;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xword_server::config::Config;

/// How long in-flight connections get to finish after the shutdown signal.
const DRAIN_WINDOW: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "refusing to start: invalid configuration");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let (app, state) = match xword_server::build_app(config).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "failed to initialize event store");
            std::process::exit(1);
        }
    };

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");
    info!(%addr, mode = ?state.config.mode, "listening");

    // On ctrl-c: stop accepting, close every live connection, then report
    // back so the drain window below starts counting.
    let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = {
        let state = state.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down, draining connections");
            for conn in state.connections.iter() {
                conn.kill.kill("SERVER_SHUTDOWN");
            }
            let _ = drained_tx.send(());
        }
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown);

    // The graceful path waits for every connection task; a wedged connection
    // must not hold the process past the drain window.
    tokio::select! {
        result = server => {
            result.expect("server error");
            info!("shutdown complete");
        }
        _ = async {
            let _ = drained_rx.await;
            tokio::time::sleep(DRAIN_WINDOW).await;
        } => {
            warn!("connections did not drain within {DRAIN_WINDOW:?}, forcing exit");
        }
    }
}
