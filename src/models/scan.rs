use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::order::{OrderItem, OrderWithItems};
use super::ParseEnumError;

/// How a scanned code was tied to an order item, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactEan,
    ExactSku,
    Normalized,
    Containment,
    Similarity,
    /// Operator confirmed a suggestion by picking the item.
    Manual,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::ExactEan => "exact_ean",
            MatchKind::ExactSku => "exact_sku",
            MatchKind::Normalized => "normalized",
            MatchKind::Containment => "containment",
            MatchKind::Similarity => "similarity",
            MatchKind::Manual => "manual",
        }
    }
}

impl std::str::FromStr for MatchKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_ean" => Ok(MatchKind::ExactEan),
            "exact_sku" => Ok(MatchKind::ExactSku),
            "normalized" => Ok(MatchKind::Normalized),
            "containment" => Ok(MatchKind::Containment),
            "similarity" => Ok(MatchKind::Similarity),
            "manual" => Ok(MatchKind::Manual),
            _ => Err(ParseEnumError::new("match kind", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchCandidate {
    pub item_id: Uuid,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub product_name: String,
    pub kind: MatchKind,
    pub confidence: f64,
    pub fully_scanned: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        item_id: Uuid,
        kind: MatchKind,
        confidence: f64,
    },
    Ambiguous {
        candidates: Vec<MatchCandidate>,
    },
    Suggested {
        candidates: Vec<MatchCandidate>,
    },
    NoMatch,
}

impl MatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Matched { .. } => "matched",
            MatchOutcome::Ambiguous { .. } => "ambiguous",
            MatchOutcome::Suggested { .. } => "suggested",
            MatchOutcome::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub normalized_code: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScanOrderRequest {
    #[validate(length(min = 1, max = 128, message = "Scanned code is required"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScanItemRequest {
    #[validate(length(min = 1, max = 128, message = "Scanned code is required"))]
    pub code: String,
    #[serde(default = "default_scan_quantity")]
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
    /// Confirms a suggested or ambiguous match.
    pub force_item_id: Option<Uuid>,
}

fn default_scan_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemProgress {
    pub item_id: Uuid,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub product_name: String,
    pub required: i32,
    pub scanned: i32,
    pub complete: bool,
}

impl From<&OrderItem> for ItemProgress {
    fn from(item: &OrderItem) -> Self {
        Self {
            item_id: item.id,
            sku: item.sku.clone(),
            ean: item.ean.clone(),
            product_name: item.product_name.clone(),
            required: item.quantity,
            scanned: item.scanned_quantity,
            complete: item.is_fully_scanned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub order_id: Uuid,
    pub items: Vec<ItemProgress>,
    pub units_required: i32,
    pub units_scanned: i32,
    pub complete: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

impl ScanProgress {
    pub fn of(order: &OrderWithItems) -> Self {
        let items: Vec<ItemProgress> = order.items.iter().map(ItemProgress::from).collect();
        let units_required = items.iter().map(|i| i.required).sum();
        let units_scanned = items.iter().map(|i| i.scanned.min(i.required)).sum();
        let complete = !items.is_empty() && items.iter().all(|i| i.complete);
        Self {
            order_id: order.order.id,
            items,
            units_required,
            units_scanned,
            complete,
            verified_at: order.order.scan_verified_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub scanned_code: String,
    pub order_item_id: Option<Uuid>,
    pub match_kind: Option<MatchKind>,
    pub confidence: f64,
    pub accepted: bool,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScanEvent {
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub scanned_code: String,
    pub order_item_id: Option<Uuid>,
    pub match_kind: Option<MatchKind>,
    pub confidence: f64,
    pub accepted: bool,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct ScanOrderResponse {
    pub order: OrderWithItems,
    pub progress: ScanProgress,
    /// Code128 of the suborder number, base64 PNG. `None` when the suborder
    /// is not printable ASCII.
    pub barcode_png: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanItemResponse {
    pub accepted: bool,
    pub report: MatchReport,
    pub progress: ScanProgress,
    pub order_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderCandidate {
    pub id: Uuid,
    pub marketplace: super::marketplace::Marketplace,
    pub suborder_number: String,
    pub customer_name: String,
    pub status: super::order::OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ProductLookupQuery {
    pub code: String,
}
