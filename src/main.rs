use marketplace_payouts::api::{self, AppState};
use marketplace_payouts::cache::{self, Cache, InMemoryCache, RedisCache, RedisPoolConfig};
use marketplace_payouts::config::AppConfig;
use marketplace_payouts::database::{self, PgPayoutStore};
use marketplace_payouts::health::HealthChecker;
use marketplace_payouts::logging::init_tracing;
use marketplace_payouts::middleware::logging::{request_logging_middleware, UuidRequestId};
use marketplace_payouts::payments::{PaystackProvider, TransferGateway};
use marketplace_payouts::payouts::{InMemoryPayoutStore, PayoutStore};
use marketplace_payouts::services::{
    LoggingNotifier, OrchestratorConfig, PayoutNotifier, PayoutOrchestrator,
};
use marketplace_payouts::workers::{PayoutReconciler, PayoutReconcilerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        skip_externals = config.skip_externals,
        "🚀 Starting payout service"
    );

    // Persistence
    let (store, db_pool) = match &config.database {
        Some(db_config) => {
            info!("📊 Initializing database connection pool...");
            let pool = database::init_pool_from_config(db_config)
                .await
                .map_err(|e| {
                    error!("Failed to initialize database pool: {}", e);
                    e
                })?;
            if db_config.run_migrations {
                database::run_migrations(&pool).await?;
            }
            info!(
                max_connections = pool.options().get_max_connections(),
                "✅ Database connection pool initialized"
            );
            let store: Arc<dyn PayoutStore> = Arc::new(PgPayoutStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true), using in-memory store");
            let store: Arc<dyn PayoutStore> = Arc::new(InMemoryPayoutStore::new());
            (store, None)
        }
    };

    // Cache
    let (recipient_cache, webhook_cache, redis_pool) = if config.skip_externals {
        info!("⏭️  Skipping Redis initialization (SKIP_EXTERNALS=true), using in-memory cache");
        let recipients: Arc<dyn Cache<String>> = Arc::new(InMemoryCache::<String>::new());
        let webhooks: Arc<dyn Cache<String>> = Arc::new(InMemoryCache::<String>::new());
        (recipients, webhooks, None)
    } else {
        info!("🔄 Initializing Redis cache connection pool...");
        let pool = cache::init_cache_pool(RedisPoolConfig::from_app(&config.cache)).await?;
        let redis: Arc<dyn Cache<String>> = Arc::new(RedisCache::new(pool.clone()));
        (redis.clone(), redis, Some(pool))
    };

    // Gateway and orchestrator
    let gateway: Arc<dyn TransferGateway> = Arc::new(PaystackProvider::from_env()?);
    let notifier: Arc<dyn PayoutNotifier> = Arc::new(LoggingNotifier::default());
    let orchestrator_config = OrchestratorConfig::from_env();
    info!(
        gateway = gateway.name(),
        currency = %orchestrator_config.currency,
        min_withdrawal = %orchestrator_config.min_withdrawal_amount,
        "✅ Payout orchestrator configured"
    );
    let orchestrator = Arc::new(PayoutOrchestrator::new(
        store.clone(),
        gateway,
        recipient_cache,
        notifier,
        orchestrator_config,
    ));

    let health_checker = HealthChecker::new(db_pool, redis_pool);

    // Reconciler
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let reconciler_enabled = std::env::var("PAYOUT_RECONCILER_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    let reconciler_handle = if reconciler_enabled {
        let reconciler = PayoutReconciler::new(
            store,
            orchestrator.clone(),
            PayoutReconcilerConfig::from_env(),
        );
        Some(tokio::spawn(reconciler.run(worker_shutdown_rx)))
    } else {
        info!("Payout reconciler disabled (PAYOUT_RECONCILER_ENABLED=false)");
        None
    };

    let app = api::router(AppState {
        orchestrator,
        webhook_cache,
        health_checker,
    })
    .layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = config.server.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = reconciler_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            warn!("Timed out waiting for payout reconciler shutdown");
        }
    }

    info!("👋 Server shutdown complete");
    Ok(())
}
