use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use chopnow_api as api;

use api::models::PaymentFlow;
use api::services::catalog::{CatalogReader, CatalogResolver, SeaOrmCatalogReader};
use api::services::notifications::{HttpNotifier, NotificationDispatcher, Notifier};
use api::services::order_assembly::OrderAssembler;
use api::services::orders::{OrderStore, SeaOrmOrderStore};
use api::services::payments::PaymentFlowCoordinator;
use api::services::verification_code::CodeIssuer;
use api::gateway::{HttpPaymentGateway, PaymentGateway};
use api::webhooks::WebhookGuard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = Arc::new(
        api::db::connect(&cfg)
            .await
            .context("failed to connect to database")?,
    );
    api::db::run_migrations(&db)
        .await
        .context("failed to run database migrations")?;

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.notifications.timeout_secs))
        .build()
        .context("failed to build http client")?;

    let notifier: Arc<dyn Notifier> =
        Arc::new(HttpNotifier::new(http.clone(), cfg.notifications.endpoint.clone()));
    let notifications = NotificationDispatcher::new(
        notifier,
        cfg.notifications.channel_id.clone(),
        cfg.notifications.max_attempts,
    );

    let store: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(db.clone()));
    let catalog: Arc<dyn CatalogReader> = Arc::new(SeaOrmCatalogReader::new(db.clone()));

    let assembler = OrderAssembler::new(
        CatalogResolver::new(catalog),
        cfg.fees.clone(),
        CodeIssuer::new(cfg.ordering.code_prefix.clone()),
        cfg.ordering.pickup_address.clone(),
    );

    let gateway: Option<Arc<dyn PaymentGateway>> = match cfg.payment.flow {
        PaymentFlow::Gateway => {
            info!("gateway settlement flow active");
            Some(Arc::new(HttpPaymentGateway::new(http.clone(), &cfg.gateway)))
        }
        PaymentFlow::Manual => {
            info!("manual settlement flow active");
            None
        }
    };

    let payments = Arc::new(PaymentFlowCoordinator::new(
        cfg.payment.flow,
        assembler,
        store.clone(),
        gateway,
        notifications.clone(),
        event_sender.clone(),
        cfg.payment.bank.clone(),
    ));

    let webhooks = Arc::new(WebhookGuard::new(
        cfg.gateway.webhook_secret.clone(),
        store.clone(),
        notifications,
        event_sender.clone(),
    ));

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        store,
        payments,
        webhooks,
    };

    let app = api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, environment = %cfg.environment, "chopnow-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
