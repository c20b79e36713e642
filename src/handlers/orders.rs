use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    middleware::error_handling::Result,
    models::{
        order::{
            BulkCarrierRequest, BulkStatusRequest, BulkUpdateResponse, CreateOrderRequest,
            OrderFilter, OrderSummary, OrderWithItems, UpdateOrderRequest,
        },
        Paginated, Pagination,
    },
    services::OrderService,
};

/// GET /api/orders
pub async fn list_orders(
    State(config): State<AppConfig>,
    Query(filter): Query<OrderFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<OrderSummary>>> {
    let orders = OrderService::new(config.database_pool.clone())
        .list(&filter, &pagination)
        .await?;
    Ok(Json(orders))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(config): State<AppConfig>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderWithItems>> {
    let order = OrderService::new(config.database_pool.clone()).get(order_id).await?;
    Ok(Json(order))
}

/// POST /api/orders
pub async fn create_order(
    State(config): State<AppConfig>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let order = OrderService::new(config.database_pool.clone()).create(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// PUT /api/orders/:id
pub async fn update_order(
    State(config): State<AppConfig>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<OrderWithItems>> {
    let order = OrderService::new(config.database_pool.clone())
        .update(order_id, request)
        .await?;
    Ok(Json(order))
}

/// DELETE /api/orders/:id (supervisor)
pub async fn delete_order(
    State(config): State<AppConfig>,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode> {
    OrderService::new(config.database_pool.clone()).delete(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/orders/bulk/status (supervisor)
pub async fn bulk_update_status(
    State(config): State<AppConfig>,
    Json(request): Json<BulkStatusRequest>,
) -> Result<Json<BulkUpdateResponse>> {
    let response = OrderService::new(config.database_pool.clone())
        .bulk_update_status(request)
        .await?;
    Ok(Json(response))
}

/// POST /api/orders/bulk/carrier (supervisor)
pub async fn bulk_update_carrier(
    State(config): State<AppConfig>,
    Json(request): Json<BulkCarrierRequest>,
) -> Result<Json<BulkUpdateResponse>> {
    let response = OrderService::new(config.database_pool.clone())
        .bulk_update_carrier(request)
        .await?;
    Ok(Json(response))
}

/// GET /api/orders/export.csv
pub async fn export_orders(
    State(config): State<AppConfig>,
    Query(filter): Query<OrderFilter>,
) -> Result<Response> {
    let csv = OrderService::new(config.database_pool.clone())
        .export_csv(&filter)
        .await?;
    let filename = format!("orders-{}.csv", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
    Ok(csv_response(filename, csv))
}

pub(crate) fn csv_response(filename: String, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}
