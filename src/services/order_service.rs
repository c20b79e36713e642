use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::marketplace::{Marketplace, MarketplaceSummary};
use crate::models::order::{
    BulkCarrierRequest, BulkItemOutcome, BulkItemResult, BulkStatusRequest, BulkUpdateResponse,
    CreateOrderRequest, OrderFilter, MAX_AMOUNT, OrderStatus, OrderSummary, OrderWithItems, UpdateOrderRequest,
};
use crate::models::{Paginated, Pagination};
use crate::repositories::OrderRepository;
use crate::services::product_matcher::normalize_code;
use crate::utils::log_sanitizer::sanitize_for_log;

pub struct OrderService {
    repo: OrderRepository,
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: OrderRepository::new(pool),
        }
    }

    pub async fn list(
        &self,
        filter: &OrderFilter,
        pagination: &Pagination,
    ) -> Result<Paginated<OrderSummary>> {
        let (items, total) = self.repo.list(filter, pagination).await?;
        Ok(Paginated::new(items, pagination, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<OrderWithItems> {
        self.repo
            .find_with_items(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    pub async fn create(&self, request: CreateOrderRequest) -> Result<OrderWithItems> {
        request.validate()?;

        let suborder = request.suborder_number.trim();
        if self.repo.exists(request.marketplace, suborder).await? {
            return Err(AppError::Conflict(format!(
                "Order {} already exists for {}",
                suborder,
                request.marketplace.display_name()
            )));
        }

        let total = match request.total_amount {
            Some(total) => total,
            None => request
                .computed_total()
                .filter(|total| *total <= MAX_AMOUNT)
                .ok_or_else(|| AppError::InvalidInput("Order total is too large".to_string()))?,
        };

        let alternate_codes: Vec<Vec<String>> = request
            .items
            .iter()
            .map(|item| normalized_codes(&item.alternate_codes))
            .collect();

        let order = self.repo.create(&request, total, &alternate_codes).await?;
        tracing::info!(
            "Order {} created: {} {} ({} items)",
            order.order.id,
            order.order.marketplace,
            sanitize_for_log(&order.order.suborder_number),
            order.items.len()
        );
        Ok(order)
    }

    pub async fn update(&self, id: Uuid, request: UpdateOrderRequest) -> Result<OrderWithItems> {
        request.validate()?;

        let current = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        if let Some(next) = request.status {
            ensure_transition(current.status, next)?;
        }

        if self.repo.update(id, &request, current.status).await?.is_none() {
            if self.repo.find_by_id(id).await?.is_none() {
                return Err(AppError::NotFound("Order not found".to_string()));
            }
            return Err(AppError::Conflict(
                "Order status changed while updating, reload and try again".to_string(),
            ));
        }
        if let Some(next) = request.status {
            tracing::info!("Order {} status {} -> {}", id, current.status, next);
        }

        self.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Cancelled) {
            return Err(AppError::BadRequest(format!(
                "Only pending or cancelled orders can be deleted (order is {})",
                order.status
            )));
        }

        if !self.repo.delete(id).await? {
            return Err(AppError::Conflict(
                "Order status changed before it could be deleted".to_string(),
            ));
        }
        tracing::info!("Order {} deleted", id);
        Ok(())
    }

    pub async fn bulk_update_status(&self, request: BulkStatusRequest) -> Result<BulkUpdateResponse> {
        request.validate()?;
        let ids = dedup_ids(&request.order_ids);
        let (orders, _) = self.repo.find_many_with_items(&ids).await?;
        let current: BTreeMap<Uuid, OrderStatus> =
            orders.iter().map(|o| (o.order.id, o.order.status)).collect();

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match current.get(&id) {
                None => skipped("Order not found"),
                Some(status) if !status.can_transition_to(request.status) => {
                    skipped(&format!("Cannot change status from {} to {}", status, request.status))
                }
                Some(status) => {
                    if self.repo.update_status_guarded(id, *status, request.status).await? {
                        BulkItemOutcome::Updated
                    } else {
                        skipped("Order changed concurrently")
                    }
                }
            };
            results.push(BulkItemResult { order_id: id, outcome });
        }

        let response = BulkUpdateResponse::from_results(results);
        tracing::info!(
            "Bulk status -> {}: {} updated, {} skipped",
            request.status,
            response.updated,
            response.skipped
        );
        Ok(response)
    }

    pub async fn bulk_update_carrier(&self, request: BulkCarrierRequest) -> Result<BulkUpdateResponse> {
        request.validate()?;
        let ids = dedup_ids(&request.order_ids);
        let (orders, _) = self.repo.find_many_with_items(&ids).await?;
        let current: BTreeMap<Uuid, OrderStatus> =
            orders.iter().map(|o| (o.order.id, o.order.status)).collect();

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match current.get(&id) {
                None => skipped("Order not found"),
                Some(status) if !status.awaiting_dispatch() => {
                    skipped(&format!("Carrier cannot change once the order is {}", status))
                }
                Some(_) => {
                    let tracking = request.tracking_numbers.get(&id).map(String::as_str);
                    if self.repo.update_carrier_guarded(id, request.carrier, tracking).await? {
                        BulkItemOutcome::Updated
                    } else {
                        skipped("Order changed concurrently")
                    }
                }
            };
            results.push(BulkItemResult { order_id: id, outcome });
        }

        let response = BulkUpdateResponse::from_results(results);
        tracing::info!(
            "Bulk carrier -> {}: {} updated, {} skipped",
            request.carrier,
            response.updated,
            response.skipped
        );
        Ok(response)
    }

    pub async fn export_csv(&self, filter: &OrderFilter) -> Result<Vec<u8>> {
        let orders = self.repo.list_for_export(filter).await?;
        write_orders_csv(&orders)
    }

    /// One summary per channel, including channels without orders.
    pub async fn marketplace_summaries(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MarketplaceSummary>> {
        let breakdown = self.repo.marketplace_breakdown(since).await?;
        Ok(build_summaries(breakdown))
    }
}

fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid status transition from {} to {}",
            from, to
        )))
    }
}

fn skipped(reason: &str) -> BulkItemOutcome {
    BulkItemOutcome::Skipped {
        reason: reason.to_string(),
    }
}

fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn normalized_codes(codes: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = codes
        .iter()
        .map(|c| normalize_code(c))
        .filter(|c| !c.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

pub(crate) fn build_summaries(
    breakdown: Vec<(String, String, i64, Decimal)>,
) -> Vec<MarketplaceSummary> {
    let mut summaries: Vec<MarketplaceSummary> =
        Marketplace::ALL.iter().map(|m| MarketplaceSummary::empty(*m)).collect();

    for (marketplace, status, count, amount) in breakdown {
        let Ok(marketplace) = marketplace.parse::<Marketplace>() else {
            tracing::warn!("Unknown marketplace in orders table: {}", marketplace);
            continue;
        };
        if let Some(summary) = summaries.iter_mut().find(|s| s.marketplace == marketplace) {
            summary.total_orders += count;
            summary.total_amount += amount;
            *summary.orders_by_status.entry(status).or_insert(0) += count;
        }
    }
    summaries
}

fn write_orders_csv(orders: &[OrderSummary]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "marketplace",
            "suborder_number",
            "customer_name",
            "commune",
            "carrier",
            "tracking_number",
            "status",
            "items",
            "units",
            "total_amount",
            "purchased_at",
            "dispatch_deadline",
            "scan_verified_at",
        ])
        .map_err(|e| AppError::Internal(e.into()))?;

    for order in orders {
        writer
            .write_record([
                order.marketplace.slug().to_string(),
                order.suborder_number.clone(),
                order.customer_name.clone(),
                order.commune.clone().unwrap_or_default(),
                order.carrier.map(|c| c.as_str().to_string()).unwrap_or_default(),
                order.tracking_number.clone().unwrap_or_default(),
                order.status.as_str().to_string(),
                order.item_count.to_string(),
                order.unit_count.to_string(),
                order.total_amount.to_string(),
                order.purchased_at.to_rfc3339(),
                order.dispatch_deadline.map(|d| d.to_rfc3339()).unwrap_or_default(),
                order.scan_verified_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ])
            .map_err(|e| AppError::Internal(e.into()))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CSV flush failed: {}", e)))
}
