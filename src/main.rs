use anyhow::Context;
use std::sync::Arc;
use tokio::{net::TcpListener, signal, sync::mpsc};
use tracing::info;

use storefront_api::{
    app_router,
    config::{init_tracing, load_config},
    db::{establish_connection, run_migrations},
    events::{process_events, EventSender},
    handlers::AppServices,
    services::gateway::PaymentGatewayClient,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);

    info!(
        environment = %config.environment,
        "Starting storefront API"
    );

    let db = Arc::new(
        establish_connection(&config)
            .await
            .context("failed to connect to database")?,
    );
    if config.auto_migrate {
        run_migrations(&db).await.context("migrations failed")?;
    }

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    let gateway = Arc::new(PaymentGatewayClient::new(config.gateway.clone()));
    let services = AppServices::new(db.clone(), event_sender.clone(), gateway, &config);

    let config = Arc::new(config);
    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };

    let app = app_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
