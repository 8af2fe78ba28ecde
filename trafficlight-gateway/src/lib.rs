pub mod analytics;
pub mod config;
pub mod dispatcher;
pub mod enrichment;
pub mod error;
pub mod extract;
pub mod health;
pub mod proxy;
pub mod router_routes;
pub mod routing;
pub mod side_effects;

use std::net::SocketAddr;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use config::GatewayConfig;
use routing::{build_app, GatewayComponents};

/// Handle returned when the gateway is started programmatically.
pub struct GatewayHandle {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
}

impl GatewayHandle {
    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

/// Serves the gateway on `config.bind_address` with the given collaborators.
pub async fn start_gateway(
    config: GatewayConfig,
    components: GatewayComponents,
) -> anyhow::Result<GatewayHandle> {
    if config.tls().is_some() {
        bail!("programmatic gateway does not support TLS");
    }

    let app = build_app(components, &config);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("invalid gateway bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind gateway listener")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read socket address")?;
    info!(%actual_addr, "starting trafficlight-gateway");

    let (tx, rx) = oneshot::channel();
    let router = app.router;
    let purge = app.maintenance.spawn();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await
            .ok();
        purge.abort();
    });

    Ok(GatewayHandle {
        addr: actual_addr,
        shutdown: tx,
    })
}
