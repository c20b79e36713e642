use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    middleware::{error_handling::Result, Claims},
    models::{
        order::OrderSummary,
        scan::{ProductLookupQuery, ScanEvent, ScanItemRequest, ScanItemResponse, ScanOrderRequest, ScanProgress},
    },
    services::{scan_service::OrderLookup, ScanService},
};

fn scan_service(config: &AppConfig) -> ScanService {
    ScanService::new(config.database_pool.clone(), &config.scan)
}

/// POST /api/scan/order
///
/// 200 with the order when one matches, 409 with the candidates when the
/// code fits several orders.
pub async fn scan_order(
    State(config): State<AppConfig>,
    Json(request): Json<ScanOrderRequest>,
) -> Result<Response> {
    match scan_service(&config).scan_order(request).await? {
        OrderLookup::Found(found) => Ok(Json(*found).into_response()),
        OrderLookup::Ambiguous(candidates) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "The scanned code matches more than one order",
                "status": 409,
                "candidates": candidates,
            })),
        )
            .into_response()),
    }
}

/// POST /api/scan/orders/:id/items
pub async fn scan_item(
    State(config): State<AppConfig>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ScanItemRequest>,
) -> Result<Json<ScanItemResponse>> {
    let response = scan_service(&config)
        .scan_item(order_id, claims.user_id, request)
        .await?;
    Ok(Json(response))
}

/// POST /api/scan/orders/:id/reset
pub async fn reset_scan(
    State(config): State<AppConfig>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ScanProgress>> {
    let progress = scan_service(&config).reset_scan(order_id).await?;
    tracing::info!("Scan of order {} reset by {}", order_id, claims.user_id);
    Ok(Json(progress))
}

/// GET /api/scan/orders/:id/progress
pub async fn scan_progress(
    State(config): State<AppConfig>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ScanProgress>> {
    let progress = scan_service(&config).scan_progress(order_id).await?;
    Ok(Json(progress))
}

/// GET /api/scan/orders/:id/events
pub async fn scan_events(
    State(config): State<AppConfig>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<ScanEvent>>> {
    let events = scan_service(&config).scan_events(order_id).await?;
    Ok(Json(events))
}

/// GET /api/scan/products?code=...
pub async fn find_orders_for_product(
    State(config): State<AppConfig>,
    Query(query): Query<ProductLookupQuery>,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = scan_service(&config).find_orders_for_product(&query.code).await?;
    Ok(Json(orders))
}
