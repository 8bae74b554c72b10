//! FinPocket news pipeline: binary entrypoint.
//! Boots the ingest → enrich → fan-out runner and the read/relay API side by side.

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finpocket_pipeline::app::{self, Resources};
use finpocket_pipeline::metrics::Metrics;
use finpocket_pipeline::{api, PipelineConfig};

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn wait_for_ctrl_c(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested");
    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load()?;
    let metrics = Metrics::init()?;
    let res = Resources::from_config(&cfg)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = tokio::net::TcpListener::bind(&cfg.api.bind)
        .await
        .with_context(|| format!("binding api on {}", cfg.api.bind))?;
    tracing::info!(target: "api", bind = %cfg.api.bind, "api listening");
    let router = api::router(res.api_state(&cfg), Some(&metrics));
    let mut api_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::spawn(wait_for_ctrl_c(shutdown_tx));

    let summary = app::run_pipeline(&cfg, &res, shutdown_rx).await;
    if summary.is_err() {
        server.abort();
    }

    match server.await {
        Ok(Err(e)) => tracing::error!(target: "api", error = %e, "api server error"),
        Err(e) if !e.is_cancelled() => tracing::error!(target: "api", error = %e, "api task panicked"),
        _ => {}
    }
    res.close().await;

    let summary = summary?;
    tracing::info!(
        cycles = summary.cycles,
        emitted = summary.totals.emitted,
        failed = summary.totals.failed,
        "bye"
    );
    Ok(())
}
