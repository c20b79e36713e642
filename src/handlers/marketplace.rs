use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    config::AppConfig,
    middleware::error_handling::{AppError, Result},
    models::{
        dashboard::DashboardSummary,
        marketplace::{Marketplace, MarketplaceSummary},
        order::{OrderFilter, OrderSummary},
        Paginated, Pagination,
    },
    services::{DashboardService, OrderService},
};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Only count orders purchased in the last N days.
    pub days: Option<i64>,
}

/// GET /api/marketplaces
pub async fn list_marketplaces(
    State(config): State<AppConfig>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<MarketplaceSummary>>> {
    let since = match query.days {
        Some(days) if days > 0 => Some(chrono::Utc::now() - chrono::Duration::days(days)),
        Some(_) => {
            return Err(AppError::BadRequest("days must be positive".to_string()));
        }
        None => None,
    };
    let summaries = OrderService::new(config.database_pool.clone())
        .marketplace_summaries(since)
        .await?;
    Ok(Json(summaries))
}

/// GET /api/marketplaces/:slug/orders
pub async fn list_marketplace_orders(
    State(config): State<AppConfig>,
    Path(slug): Path<String>,
    Query(mut filter): Query<OrderFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<OrderSummary>>> {
    let marketplace: Marketplace = slug
        .parse()
        .map_err(|_| AppError::BadRequest("Unknown marketplace".to_string()))?;
    filter.marketplace = Some(marketplace);

    let orders = OrderService::new(config.database_pool.clone())
        .list(&filter, &pagination)
        .await?;
    Ok(Json(orders))
}

/// GET /api/dashboard
pub async fn dashboard(State(config): State<AppConfig>) -> Result<Json<DashboardSummary>> {
    let summary = DashboardService::new(config.database_pool.clone()).summary().await?;
    Ok(Json(summary))
}
