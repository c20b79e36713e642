use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::ScanSettings;
use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::metrics::record_scan;
use crate::models::marketplace::Marketplace;
use crate::models::order::{Order, OrderStatus, OrderSummary, OrderWithItems};
use crate::models::scan::{
    MatchKind, MatchOutcome, NewScanEvent, OrderCandidate, ScanEvent, ScanItemRequest,
    ScanItemResponse, ScanOrderRequest, ScanOrderResponse, ScanProgress,
};
use crate::repositories::{OrderRepository, ScanEventRepository};
use crate::services::documents::barcode::{code128_png_base64, is_code128_encodable};
use crate::services::product_matcher::{code_variants, ProductMatcher};
use crate::utils::log_sanitizer::sanitize_for_log;

/// Result of looking an order up by a scanned label.
#[derive(Debug)]
pub enum OrderLookup {
    Found(Box<ScanOrderResponse>),
    Ambiguous(Vec<OrderCandidate>),
}

pub struct ScanService {
    orders: OrderRepository,
    events: ScanEventRepository,
    matcher: ProductMatcher,
}

impl ScanService {
    pub fn new(pool: PgPool, settings: &ScanSettings) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            events: ScanEventRepository::new(pool),
            matcher: ProductMatcher::new(settings.auto_accept_confidence),
        }
    }

    /// Exact suborder, then tracking number, then normalized suborder forms.
    pub async fn scan_order(&self, request: ScanOrderRequest) -> Result<OrderLookup> {
        request.validate()?;
        let code = request.code.trim();

        let mut hits = self.orders.find_by_suborder_exact(code).await?;
        if hits.is_empty() {
            hits = self.orders.find_by_tracking(code).await?;
        }
        if hits.is_empty() {
            let variants = suborder_variants(code);
            if !variants.is_empty() {
                hits = self.orders.find_by_suborder_variants(&variants).await?;
            }
        }

        match hits.len() {
            0 => {
                record_scan("order_not_found");
                tracing::info!("No order for scanned code {}", sanitize_for_log(code));
                Err(AppError::NotFound(format!("No order matches code {}", code)))
            }
            1 => {
                let order = self.load(hits[0].id).await?;
                let suborder = order.order.suborder_number.as_str();
                let barcode_png = if is_code128_encodable(suborder) {
                    Some(code128_png_base64(suborder)?)
                } else {
                    None
                };
                record_scan("order_found");
                Ok(OrderLookup::Found(Box::new(ScanOrderResponse {
                    progress: ScanProgress::of(&order),
                    order,
                    barcode_png,
                })))
            }
            _ => {
                record_scan("order_ambiguous");
                Ok(OrderLookup::Ambiguous(hits.into_iter().map(candidate).collect()))
            }
        }
    }

    pub async fn scan_item(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        request: ScanItemRequest,
    ) -> Result<ScanItemResponse> {
        request.validate()?;
        let order = self.load(order_id).await?;
        ensure_scannable(&order.order)?;

        let report = self.matcher.match_code(&request.code, &order.items);

        let target = match (request.force_item_id, &report.outcome) {
            (Some(forced), outcome) => {
                let confidence = forced_confidence(outcome, forced).ok_or_else(|| {
                    AppError::BadRequest(
                        "Only an item suggested for this code can be confirmed".to_string(),
                    )
                })?;
                Some((forced, MatchKind::Manual, confidence))
            }
            (
                None,
                MatchOutcome::Matched {
                    item_id,
                    kind,
                    confidence,
                },
            ) => Some((*item_id, *kind, *confidence)),
            (None, _) => None,
        };

        let Some((item_id, kind, confidence)) = target else {
            self.record(&order, user_id, &request, None, None, best_confidence(&report.outcome), false)
                .await?;
            record_scan(report.outcome.label());
            return Ok(ScanItemResponse {
                accepted: false,
                report,
                progress: ScanProgress::of(&order),
                order_completed: false,
            });
        };

        let incremented = self
            .orders
            .increment_scanned(order_id, item_id, request.quantity)
            .await?;
        if incremented.is_none() {
            self.record(&order, user_id, &request, Some(item_id), Some(kind), confidence, false)
                .await?;
            record_scan("over_scan");
            let remaining = order
                .items
                .iter()
                .find(|i| i.id == item_id)
                .map(|i| i.remaining_to_scan())
                .unwrap_or(0);
            return Err(AppError::BadRequest(format!(
                "Over-scan: only {} more unit(s) of this item are expected",
                remaining
            )));
        }

        self.record(&order, user_id, &request, Some(item_id), Some(kind), confidence, true)
            .await?;
        record_scan(if kind == MatchKind::Manual { "manual" } else { "matched" });

        let mut refreshed = self.load(order_id).await?;
        let mut progress = ScanProgress::of(&refreshed);
        let mut order_completed = false;
        if progress.complete && refreshed.order.scan_verified_at.is_none() {
            refreshed.order = self.complete(&refreshed.order).await?;
            progress = ScanProgress::of(&refreshed);
            order_completed = true;
        }

        Ok(ScanItemResponse {
            accepted: true,
            report,
            progress,
            order_completed,
        })
    }

    /// Fully scanned: pending/processing orders end up packed.
    async fn complete(&self, order: &Order) -> Result<Order> {
        let mut status = order.status;
        if status == OrderStatus::Pending
            && self
                .orders
                .update_status_guarded(order.id, OrderStatus::Pending, OrderStatus::Processing)
                .await?
        {
            status = OrderStatus::Processing;
        }
        let next = (status == OrderStatus::Processing).then_some(OrderStatus::Packed);

        let updated = self
            .orders
            .mark_scan_verified(order.id, next)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        tracing::info!(
            "Order {} fully scanned, status {}",
            updated.id,
            updated.status.as_str()
        );
        Ok(updated)
    }

    pub async fn reset_scan(&self, order_id: Uuid) -> Result<ScanProgress> {
        if !self.orders.reset_scan(order_id).await? {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        tracing::info!("Scan progress reset for order {}", order_id);
        Ok(ScanProgress::of(&self.load(order_id).await?))
    }

    pub async fn scan_progress(&self, order_id: Uuid) -> Result<ScanProgress> {
        Ok(ScanProgress::of(&self.load(order_id).await?))
    }

    pub async fn scan_events(&self, order_id: Uuid) -> Result<Vec<ScanEvent>> {
        if self.orders.find_by_id(order_id).await?.is_none() {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        self.events.for_order(order_id).await
    }

    /// Open orders waiting for a product, by exact code equality on its GTIN/SKU forms.
    pub async fn find_orders_for_product(&self, code: &str) -> Result<Vec<OrderSummary>> {
        let variants = code_variants(code);
        if variants.is_empty() {
            return Err(AppError::BadRequest("Product code is required".to_string()));
        }
        self.orders.find_open_with_product(&variants).await
    }

    async fn load(&self, order_id: Uuid) -> Result<OrderWithItems> {
        self.orders
            .find_with_items(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        order: &OrderWithItems,
        user_id: Uuid,
        request: &ScanItemRequest,
        item_id: Option<Uuid>,
        kind: Option<MatchKind>,
        confidence: f64,
        accepted: bool,
    ) -> Result<()> {
        self.events
            .record(&NewScanEvent {
                order_id: order.order.id,
                user_id: Some(user_id),
                scanned_code: request.code.trim().to_string(),
                order_item_id: item_id,
                match_kind: kind,
                confidence,
                accepted,
                quantity: request.quantity,
            })
            .await?;
        Ok(())
    }
}

fn ensure_scannable(order: &Order) -> Result<()> {
    match order.status {
        OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Packed => Ok(()),
        status => Err(AppError::BadRequest(format!(
            "Orders in status {} cannot be scanned",
            status.as_str()
        ))),
    }
}

/// Confidence of `item_id` when the operator confirms it for this outcome.
/// `None` unless the matcher offered that item.
fn forced_confidence(outcome: &MatchOutcome, item_id: Uuid) -> Option<f64> {
    match outcome {
        MatchOutcome::Matched {
            item_id: matched,
            confidence,
            ..
        } => (*matched == item_id).then_some(*confidence),
        MatchOutcome::Ambiguous { candidates } | MatchOutcome::Suggested { candidates } => {
            candidates
                .iter()
                .find(|c| c.item_id == item_id)
                .map(|c| c.confidence)
        }
        MatchOutcome::NoMatch => None,
    }
}

fn best_confidence(outcome: &MatchOutcome) -> f64 {
    match outcome {
        MatchOutcome::Matched { confidence, .. } => *confidence,
        MatchOutcome::Ambiguous { candidates } | MatchOutcome::Suggested { candidates } => {
            candidates.first().map(|c| c.confidence).unwrap_or(0.0)
        }
        MatchOutcome::NoMatch => 0.0,
    }
}

fn candidate(order: Order) -> OrderCandidate {
    OrderCandidate {
        id: order.id,
        marketplace: order.marketplace,
        suborder_number: order.suborder_number,
        customer_name: order.customer_name,
        status: order.status,
    }
}

/// Upper-case forms a scanned label may correspond to: without `#`, without a
/// channel prefix such as `ML-`, and without leading zeros.
pub fn suborder_variants(code: &str) -> Vec<String> {
    let base: String = code
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '#')
        .collect();
    if base.is_empty() {
        return Vec::new();
    }

    let mut variants = vec![base.clone()];
    for marketplace in Marketplace::ALL {
        for prefix in marketplace.suborder_prefixes() {
            if let Some(rest) = base.strip_prefix(prefix) {
                if !rest.is_empty() {
                    variants.push(rest.to_string());
                }
            }
        }
    }

    let unpadded: Vec<String> = variants
        .iter()
        .map(|v| v.trim_start_matches('0').to_string())
        .filter(|v| !v.is_empty())
        .collect();
    variants.extend(unpadded);
    variants.sort();
    variants.dedup();
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scan::MatchCandidate;

    #[test]
    fn test_suborder_variants_strip_prefix_hash_and_zeros() {
        let variants = suborder_variants(" ml-0002000004567 ");
        assert!(variants.contains(&"ML-0002000004567".to_string()));
        assert!(variants.contains(&"0002000004567".to_string()));
        assert!(variants.contains(&"2000004567".to_string()));

        let variants = suborder_variants("#1043");
        assert_eq!(variants, vec!["1043".to_string()]);
    }

    #[test]
    fn test_suborder_variants_empty() {
        assert!(suborder_variants("  # ").is_empty());
        assert_eq!(suborder_variants("000"), vec!["000".to_string()]);
    }

    fn order_in(status: OrderStatus) -> Order {
        let mut entry = crate::services::documents::test_support::sample_order("1");
        entry.order.status = status;
        entry.order
    }

    #[test]
    fn test_only_open_orders_are_scannable() {
        assert!(ensure_scannable(&order_in(OrderStatus::Pending)).is_ok());
        assert!(ensure_scannable(&order_in(OrderStatus::Packed)).is_ok());
        for status in [
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            assert!(matches!(
                ensure_scannable(&order_in(status)),
                Err(AppError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn test_forced_confidence_comes_from_candidates() {
        let id = Uuid::new_v4();
        let outcome = MatchOutcome::Suggested {
            candidates: vec![MatchCandidate {
                item_id: id,
                sku: None,
                ean: None,
                product_name: "Mouse".to_string(),
                kind: MatchKind::Similarity,
                confidence: 0.71,
                fully_scanned: false,
            }],
        };
        assert_eq!(forced_confidence(&outcome, id), Some(0.71));
        assert_eq!(forced_confidence(&outcome, Uuid::new_v4()), None);
        assert_eq!(best_confidence(&outcome), 0.71);
        assert_eq!(best_confidence(&MatchOutcome::NoMatch), 0.0);
    }

    #[test]
    fn test_forcing_requires_an_offered_item() {
        let matched = Uuid::new_v4();
        let other = Uuid::new_v4();
        let outcome = MatchOutcome::Matched {
            item_id: matched,
            kind: MatchKind::ExactSku,
            confidence: 1.0,
        };
        assert_eq!(forced_confidence(&outcome, matched), Some(1.0));
        assert_eq!(forced_confidence(&outcome, other), None);
        assert_eq!(forced_confidence(&MatchOutcome::NoMatch, matched), None);

        let outcome = MatchOutcome::Ambiguous { candidates: Vec::new() };
        assert_eq!(forced_confidence(&outcome, other), None);
    }
}
