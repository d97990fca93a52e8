use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::join_all;
use metrics_exporter_prometheus::PrometheusHandle;
use rtc_probe::{CloseReason, Negotiator, SessionRegistry, WebRtcTransport};
use tokio::{signal, time::Instant};
use tracing::info;

mod client_log;
mod config;
mod routes;
mod state;
mod telemetry;

use config::{Cli, ServerConfig};
use state::AppState;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let _tracing = telemetry::init_tracing()?;
    let metrics = telemetry::install_metrics()?;

    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        packet_count = config.probe.packet_count,
        packet_spacing_ms = config.probe.packet_spacing.as_millis() as u64,
        session_ttl_secs = config.probe.session_ttl.as_secs(),
        ice_servers = config.ice.servers.len(),
        "starting speedprobe server"
    );

    run(config, metrics).await
}

async fn run(config: ServerConfig, metrics: PrometheusHandle) -> Result<()> {
    let transport =
        WebRtcTransport::new(&config.ice).context("failed to configure WebRTC transport")?;
    let negotiator = Negotiator::new(Arc::new(transport), config.probe.clone());
    let state = AppState::new(negotiator, config.limits).with_metrics(metrics);
    let registry = state.registry().clone();

    let router = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;

    info!("speedprobe listening on {}", config.listen_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server shutdown with error")?;

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        active_sessions = registry.len(),
        "shutdown signal received; draining probe sessions"
    );
    drain_sessions(&registry, config.shutdown_grace).await;
    info!("graceful shutdown complete");

    Ok(())
}

/// Give running probes until `grace` to finish, then close whatever is left.
async fn drain_sessions(registry: &SessionRegistry, grace: Duration) {
    let deadline = Instant::now() + grace;
    while !registry.is_empty() && Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }

    let remaining = registry.sessions();
    if remaining.is_empty() {
        return;
    }
    info!(sessions = remaining.len(), "closing probe sessions still open");
    join_all(
        remaining
            .iter()
            .map(|session| session.close(CloseReason::Shutdown)),
    )
    .await;
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
