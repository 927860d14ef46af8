use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use mjengo_connect::api;
use mjengo_connect::config::AppConfig;
use mjengo_connect::database::init_pool_from_config;
use mjengo_connect::database::payment_log_repository::PaymentLogRepository;
use mjengo_connect::database::subscription_repository::SubscriptionRepository;
use mjengo_connect::database::wallet_repository::WalletRepository;
use mjengo_connect::health::{health_handler, liveness_handler, HealthChecker};
use mjengo_connect::logging::init_tracing;
use mjengo_connect::middleware::logging::UuidRequestId;
use mjengo_connect::payments::kopokopo::KopoKopoClient;
use mjengo_connect::services::payment::PaymentService;
use mjengo_connect::services::reconciliation::ReconciliationService;
use mjengo_connect::services::subscription::SubscriptionService;
use mjengo_connect::services::wallet::WalletService;
use mjengo_connect::workers::{PendingPaymentSweeper, SweeperConfig};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Mjengo Connect backend service"
    );

    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        anyhow::anyhow!(e)
    })?;
    info!(
        max_connections = config.database.max_connections,
        "Database connection pool initialized"
    );

    let gateway = Arc::new(KopoKopoClient::new(config.kopokopo.clone())?);
    info!(base_url = %config.kopokopo.base_url, "KopoKopo gateway client initialized");

    let wallet_repo = Arc::new(WalletRepository::new(db_pool.clone()));
    let payment_log_repo = Arc::new(PaymentLogRepository::new(db_pool.clone()));
    let subscription_repo = Arc::new(SubscriptionRepository::new(db_pool.clone()));

    let wallet_service = Arc::new(WalletService::new(wallet_repo));
    let reconciliation_service = Arc::new(ReconciliationService::new(
        payment_log_repo.clone(),
        wallet_service.clone(),
    ));
    let payment_service = Arc::new(PaymentService::new(
        gateway.clone(),
        payment_log_repo.clone(),
        wallet_service.clone(),
        reconciliation_service.clone(),
    ));
    let subscription_service = Arc::new(SubscriptionService::new(
        subscription_repo,
        wallet_service.clone(),
    ));

    let health_checker = HealthChecker::new(db_pool.clone());

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sweeper_enabled = std::env::var("SWEEPER_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    let mut sweeper_handle = None;
    if sweeper_enabled {
        let sweeper_config = SweeperConfig::from_env();
        info!(
            poll_interval_secs = sweeper_config.poll_interval.as_secs(),
            batch_size = sweeper_config.batch_size,
            "Starting pending payment sweeper"
        );
        let sweeper = PendingPaymentSweeper::new(
            sweeper_config,
            gateway.clone(),
            payment_log_repo.clone(),
            reconciliation_service.clone(),
        );
        sweeper_handle = Some(tokio::spawn(sweeper.run(worker_shutdown_rx)));
    } else {
        info!("Pending payment sweeper disabled (SWEEPER_ENABLED=false)");
    }

    let wallet_routes = Router::new()
        .route("/wallet/deposit", post(api::wallet::deposit))
        .route("/wallet/withdraw", post(api::wallet::withdraw))
        .route("/wallet/balance", get(api::wallet::balance))
        .route("/wallet/transactions", get(api::wallet::transactions))
        .route("/wallet/details", get(api::wallet::details))
        .with_state(api::wallet::WalletApiState {
            wallet: wallet_service.clone(),
        });

    let payment_routes = Router::new()
        .route("/wallet/add-funds/kopokopo", post(api::payments::add_funds))
        .route(
            "/wallet/payment-status/{payment_request_id}",
            get(api::payments::payment_status),
        )
        .with_state(api::payments::PaymentApiState {
            payments: payment_service,
        });

    let webhook_routes = Router::new()
        .route(
            "/wallet/kopokopo/webhook",
            post(api::webhooks::kopokopo_webhook),
        )
        .with_state(api::webhooks::WebhookState {
            reconciliation: reconciliation_service,
            api_key: gateway.webhook_api_key().map(|k| k.to_string()),
        });

    let subscription_routes = Router::new()
        .route(
            "/subscriptions/premium",
            post(api::subscriptions::subscribe_premium),
        )
        .with_state(api::subscriptions::SubscriptionApiState {
            subscriptions: subscription_service,
        });

    let health_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/health/ready", get(health_handler))
        .with_state(health_checker);

    let app = Router::new()
        .route("/", get(root))
        .route("/health/live", get(liveness_handler))
        .merge(health_routes)
        .merge(wallet_routes)
        .merge(payment_routes)
        .merge(webhook_routes)
        .merge(subscription_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for sweeper shutdown");
        }
    }

    info!("Server shutdown complete");

    Ok(())
}

async fn root() -> &'static str {
    "Welcome to Mjengo Connect API"
}
