//! Ticket desk HTTP server.

use gatepass_core::delivery::DeliveryChannel;
use gatepass_core::registry::RegistrationGateway;
use gatepass_mailer::{ConsoleChannel, RelayChannel, SmtpChannel};
use gatepass_postgres::PostgresGateway;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use ticket_desk::config::{Config, DeliveryMode};
use ticket_desk::pipeline::{TicketEnvironment, TicketPipeline};
use ticket_desk::qr::QrEncoder;
use ticket_desk::server::{AppState, build_router};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ticket_desk=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ticket desk");

    let config = Config::from_env()?;
    info!(
        delivery_mode = config.delivery.mode.name(),
        database = config.postgres.url.is_some(),
        metrics = config.server.metrics_enabled,
        "Configuration loaded"
    );

    if config.server.metrics_enabled {
        let addr: SocketAddr =
            format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(address = %addr, "Prometheus exporter listening");
    }

    // Registration store (optional: without it the desk runs on CSV imports)
    let gateway: Option<Arc<dyn RegistrationGateway>> = match &config.postgres.url {
        Some(url) => {
            info!("Connecting to registration database...");
            let gateway = PostgresGateway::connect(url, config.postgres.max_connections).await?;
            if config.postgres.run_migrations {
                gateway.migrate().await?;
                info!("Migrations applied");
            }
            Some(Arc::new(gateway))
        },
        None => {
            warn!("DATABASE_URL not set, running on CSV imports only");
            None
        },
    };

    let channel: Arc<dyn DeliveryChannel> = match &config.delivery.mode {
        DeliveryMode::Console => Arc::new(ConsoleChannel::new(config.event.clone())),
        DeliveryMode::Relay { endpoint } => Arc::new(RelayChannel::new(
            endpoint.clone(),
            config.delivery.request_timeout,
        )?),
        DeliveryMode::Smtp(settings) => {
            let smtp = SmtpChannel::new(settings.clone(), config.event.clone())?;
            if let Err(e) = smtp.test_connection().await {
                warn!(error = %e, "SMTP server not reachable yet, sends will fail until it is");
            }
            Arc::new(smtp)
        },
    };

    let env = TicketEnvironment::new(Arc::clone(&channel), gateway)
        .with_encoder(QrEncoder::new(
            config.pipeline.qr_width,
            config.pipeline.qr_margin,
        ))
        .with_delivery_timeout(config.pipeline.delivery_timeout)
        .with_ledger_policy(config.pipeline.ledger_retry.clone());
    let pipeline = Arc::new(
        TicketPipeline::new(env).with_inter_send_delay(config.pipeline.send_delay),
    );

    if pipeline.has_gateway() {
        match pipeline.refresh_from_store().await {
            Ok(rows) => info!(rows = rows.len(), "Loaded registrations"),
            Err(e) => error!(error = %e, "Failed to load registrations"),
        }
    }

    let app = build_router(AppState::new(Arc::clone(&pipeline), channel));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for in-flight sends...");
    if let Err(e) = pipeline.shutdown(config.server.shutdown_timeout).await {
        warn!(error = %e, "In-flight sends did not finish before shutdown");
    }

    info!("Ticket desk stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
