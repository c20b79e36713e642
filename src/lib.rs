pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Extension, Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::handlers::{admin, auth, documents, liquidations, marketplace, orders, scan};
use crate::middleware::{
    admin_middleware, auth_middleware, metrics_handler, metrics_middleware, rate_limit_middleware,
    request_id_middleware, supervisor_middleware, RateLimiter,
};
use crate::services::{LiquidationQueue, LiquidationService, TokenBlacklistService};

/// Shared services handed to the router as request extensions.
#[derive(Clone)]
pub struct AppServices {
    pub token_blacklist: Arc<TokenBlacklistService>,
    pub login_rate_limiter: Arc<RateLimiter>,
    pub liquidations: Arc<LiquidationService>,
    pub liquidation_queue: LiquidationQueue,
}

pub fn create_app(config: AppConfig, services: AppServices) -> Router {
    let cors = cors_layer(&config.cors_origins);
    let upload_limit = config.liquidation.max_upload_bytes + 1024 * 1024;

    // Role guards sit inside auth_middleware: the last layer added runs first.
    let operator = || axum_middleware::from_fn_with_state(config.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(Extension(services.login_rate_limiter.clone()))
        .merge(
            Router::new()
                .route("/logout", post(auth::logout))
                .route("/profile", get(auth::get_profile))
                .layer(operator()),
        );

    let operator_routes = Router::new()
        .route("/dashboard", get(marketplace::dashboard))
        .route("/marketplaces", get(marketplace::list_marketplaces))
        .route("/marketplaces/:slug/orders", get(marketplace::list_marketplace_orders))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/export.csv", get(orders::export_orders))
        .route("/orders/:id", get(orders::get_order).put(orders::update_order))
        .route("/scan/order", post(scan::scan_order))
        .route("/scan/products", get(scan::find_orders_for_product))
        .route("/scan/orders/:id/items", post(scan::scan_item))
        .route("/scan/orders/:id/reset", post(scan::reset_scan))
        .route("/scan/orders/:id/progress", get(scan::scan_progress))
        .route("/scan/orders/:id/events", get(scan::scan_events))
        .route("/documents/kinds", get(documents::list_document_kinds))
        .route("/documents/:kind", post(documents::generate_document))
        .route("/barcodes", get(documents::barcode_png))
        .layer(operator());

    let supervisor_routes = Router::new()
        .route("/orders/:id", axum::routing::delete(orders::delete_order))
        .route("/orders/bulk/status", post(orders::bulk_update_status))
        .route("/orders/bulk/carrier", post(orders::bulk_update_carrier))
        .route(
            "/liquidations",
            get(liquidations::list_liquidations)
                .post(liquidations::upload_liquidation)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/liquidations/:id", get(liquidations::get_liquidation))
        .route("/liquidations/:id/lines", get(liquidations::liquidation_lines))
        .route("/liquidations/:id/export.csv", get(liquidations::export_liquidation))
        .layer(axum_middleware::from_fn(supervisor_middleware))
        .layer(operator());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route("/users/:id/active", put(admin::set_user_active))
        .layer(axum_middleware::from_fn(admin_middleware))
        .layer(operator());

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", operator_routes.merge(supervisor_routes))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(metrics_middleware))
                .layer(cors),
        )
        .layer(Extension(services.token_blacklist))
        .layer(Extension(services.liquidations))
        .layer(Extension(services.liquidation_queue))
        .with_state(config)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    for origin in origins {
        if origin.starts_with("http://") && !origin.contains("localhost") {
            tracing::warn!("Insecure HTTP origin in CORS: {} (use HTTPS in production)", origin);
        }
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    tracing::info!("CORS configured with {} allowed origins", allowed.len());

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_credentials(true)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
        ])
        .expose_headers([header::CONTENT_DISPOSITION])
}
