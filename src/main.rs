use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderdesk::config::AppConfig;
use orderdesk::middleware::{RateLimitConfig, RateLimiter};
use orderdesk::repositories::UserRepository;
use orderdesk::services::liquidation_worker::{requeue_unfinished, spawn_workers};
use orderdesk::services::{AuthService, LiquidationQueue, LiquidationService, TokenBlacklistService};
use orderdesk::utils::FileStorage;
use orderdesk::{create_app, AppServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides; INFO by default so SQL is not logged in production
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "orderdesk=info,tower_http=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&config.database_pool).await?;

    if let Some(bootstrap) = &config.bootstrap_admin {
        let auth_service = AuthService::new(
            UserRepository::new(config.database_pool.clone()),
            &config.jwt_secret,
        );
        if auth_service.ensure_bootstrap_admin(bootstrap).await? {
            tracing::warn!("Bootstrap admin created; change its password after the first login");
        }
    }

    let token_blacklist = Arc::new(TokenBlacklistService::new());
    token_blacklist.spawn_cleanup();

    let login_rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::login()));
    login_rate_limiter.spawn_cleanup();

    let storage = FileStorage::new(&config.file_storage_path)?;
    let liquidations = Arc::new(LiquidationService::new(
        config.database_pool.clone(),
        storage,
        config.liquidation.max_upload_bytes,
    ));
    let (liquidation_queue, receiver) = LiquidationQueue::new(config.liquidation.queue_capacity);
    spawn_workers(config.liquidation.workers, receiver, liquidations.clone());
    tracing::info!("Started {} liquidation worker(s)", config.liquidation.workers.max(1));

    {
        // the queue is bounded, so requeueing waits for the workers
        let liquidations = liquidations.clone();
        let queue = liquidation_queue.clone();
        tokio::spawn(async move {
            if let Err(e) = requeue_unfinished(&liquidations, &queue).await {
                tracing::error!("Failed to requeue unfinished liquidations: {}", e);
            }
        });
    }

    let app = create_app(
        config.clone(),
        AppServices {
            token_blacklist,
            login_rate_limiter,
            liquidations,
            liquidation_queue,
        },
    );

    let addr: SocketAddr = config.server_address().parse()?;

    if let Some(tls) = &config.tls {
        let rustls_config = tls.rustls_config().await?;
        tracing::info!("Starting orderdesk with TLS on https://{}", addr);

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
    } else {
        tracing::info!("Starting orderdesk on http://{}", addr);
        tracing::warn!("TLS is disabled; set TLS_ENABLED=true outside local development");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}
