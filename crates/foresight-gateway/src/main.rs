//! Foresight node entry point.

use std::time::Duration;

use foresight_gateway::{AppState, router};
use foresight_types::constants::WS_SWEEP_INTERVAL_SECS;
use foresight_types::{ForesightError, NodeConfig, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("FORESIGHT_LOG_JSON").is_ok_and(|v| v == "1") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = NodeConfig::from_env()?;
    let listen_addr = config.server.listen_addr;
    let sweep_secs = config.sweep_interval_secs.max(1);
    let flush_secs = config.settlement.flush_interval_secs.max(1);
    info!(
        role = ?config.cluster.role,
        %listen_addr,
        "starting foresight node"
    );

    let state = AppState::from_config(config).await?;

    // Unconfirmed batches from a previous run go out before new fills.
    let recovered = state.settler.resubmit_recovered().await;
    if recovered > 0 {
        info!(recovered, "resubmitted recovered settlement batches");
    }

    let engine = state.engine.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_secs));
        loop {
            ticker.tick().await;
            let evicted = engine.sweep_expired().await;
            if evicted > 0 {
                info!(evicted, "expiry sweep evicted orders");
            }
        }
    });

    let settler = state.settler.clone();
    tokio::spawn(async move {
        let mut fast = tokio::time::interval(Duration::from_secs(1));
        let mut slow = tokio::time::interval(Duration::from_secs(flush_secs));
        loop {
            tokio::select! {
                _ = fast.tick() => {
                    settler.flush_ready().await;
                }
                _ = slow.tick() => {
                    settler.flush_all().await;
                }
            }
        }
    });

    let hub = state.hub.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(WS_SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            hub.sweep_stale();
        }
    });

    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| ForesightError::Configuration(format!("bind {listen_addr}: {e}")))?;
    info!(%listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ForesightError::Internal(format!("server: {e}")))?;

    info!("shutting down, flushing settlement queues");
    let flushed = state.settler.flush_all().await;
    if flushed > 0 {
        info!(flushed, "final settlement flush");
    }
    state.hub.close_all();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "ctrl-c handler failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => warn!(%err, "sigterm handler failed"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
