use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info};
use trafficlight_core::config::CoreConfig;
use trafficlight_gateway::config::GatewayConfig;
use trafficlight_gateway::routing::{build_app, preflight_rules, GatewayComponents};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let core = CoreConfig::from_env().context("failed to load core configuration")?;
    if let Err(err) = trafficlight_core::logging::init_tracing(Some(&core.log_level)) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let config = GatewayConfig::from_env().context("failed to load gateway configuration")?;
    let components = GatewayComponents::from_config(&config).await?;
    preflight_rules(components.rules.as_ref()).await;

    let app = build_app(components, &config);
    app.maintenance.spawn();

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("invalid bind address")?;

    let shutdown = shutdown_signal();

    if let Some(tls) = config.tls() {
        let tls_config = tls
            .load()
            .await
            .context("failed to load TLS certificates")?;
        info!(%addr, node = %core.node_name, "starting trafficlight-gateway with TLS");
        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            signal_handle.graceful_shutdown(None);
        });
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.router.into_make_service())
            .await
            .context("gateway server terminated with TLS error")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind TCP listener")?;
        let actual_addr = listener
            .local_addr()
            .context("failed to read socket address")?;
        info!(%actual_addr, node = %core.node_name, "starting trafficlight-gateway");

        if let Err(err) = axum::serve(listener, app.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(?err, "gateway server terminated with error");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
