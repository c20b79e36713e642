use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::marketplace::Marketplace;
use super::ParseEnumError;

pub const MAX_BULK_ORDERS: usize = 500;
/// Largest amount a NUMERIC(14, 2) column holds.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);
pub const MAX_ITEM_QUANTITY: i32 = 100_000;
/// Code128 on labels and scan screens only carries printable ASCII.
pub const MAX_BARCODE_FIELD_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Packed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Packed => "packed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Orders still waiting to leave the warehouse.
    pub fn awaiting_dispatch(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Packed
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (a, b) if *a == b => false,
            (Pending, Processing) => true,
            (Processing, Packed) => true,
            (Packed, Processing) => true,
            (Packed, Shipped) => true,
            (Shipped, Delivered) => true,
            (Shipped, Returned) | (Delivered, Returned) => true,
            (Pending, Cancelled) | (Processing, Cancelled) | (Packed, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ParseEnumError::new("order status", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    Chilexpress,
    Starken,
    BlueExpress,
    CorreosChile,
    MarketplaceLogistics,
    OwnFleet,
}

impl Carrier {
    pub const ALL: [Carrier; 6] = [
        Carrier::Chilexpress,
        Carrier::Starken,
        Carrier::BlueExpress,
        Carrier::CorreosChile,
        Carrier::MarketplaceLogistics,
        Carrier::OwnFleet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Chilexpress => "chilexpress",
            Carrier::Starken => "starken",
            Carrier::BlueExpress => "blue_express",
            Carrier::CorreosChile => "correos_chile",
            Carrier::MarketplaceLogistics => "marketplace_logistics",
            Carrier::OwnFleet => "own_fleet",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Carrier::Chilexpress => "Chilexpress",
            Carrier::Starken => "Starken",
            Carrier::BlueExpress => "Blue Express",
            Carrier::CorreosChile => "Correos de Chile",
            Carrier::MarketplaceLogistics => "Marketplace logistics",
            Carrier::OwnFleet => "Own fleet",
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Carrier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "correos" | "correos_de_chile" => return Ok(Carrier::CorreosChile),
            "bluexpress" | "blue" => return Ok(Carrier::BlueExpress),
            _ => {}
        }
        Carrier::ALL
            .into_iter()
            .find(|carrier| carrier.as_str() == key)
            .ok_or_else(|| ParseEnumError::new("carrier", s))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub marketplace: Marketplace,
    pub suborder_number: String,
    pub customer_name: String,
    pub customer_document: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub shipping_address: String,
    pub commune: Option<String>,
    pub region: Option<String>,
    pub carrier: Option<Carrier>,
    pub tracking_number: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub shipping_cost: Decimal,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    pub purchased_at: DateTime<Utc>,
    pub dispatch_deadline: Option<DateTime<Utc>>,
    pub scan_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub alternate_codes: Vec<String>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub scanned_quantity: i32,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }

    pub fn remaining_to_scan(&self) -> i32 {
        (self.quantity - self.scanned_quantity).max(0)
    }

    pub fn is_fully_scanned(&self) -> bool {
        self.scanned_quantity >= self.quantity
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    pub fn total_units(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Listing row; items are summarised rather than embedded.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub marketplace: Marketplace,
    pub suborder_number: String,
    pub customer_name: String,
    pub commune: Option<String>,
    pub carrier: Option<Carrier>,
    pub tracking_number: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub item_count: i64,
    pub unit_count: i64,
    pub purchased_at: DateTime<Utc>,
    pub dispatch_deadline: Option<DateTime<Utc>>,
    pub scan_verified_at: Option<DateTime<Utc>>,
}

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::new("non_negative"));
    }
    if *amount > MAX_AMOUNT {
        return Err(ValidationError::new("amount_too_large"));
    }
    Ok(())
}

/// Suborder and tracking numbers are printed as Code128.
fn validate_barcode_text(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_BARCODE_FIELD_LEN
        || !value.chars().all(|c| c.is_ascii_graphic() || c == ' ')
    {
        return Err(ValidationError::new("barcode_text"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderItemRequest {
    #[validate(length(max = 64, message = "SKU too long"))]
    pub sku: Option<String>,
    #[validate(length(max = 32, message = "EAN too long"))]
    pub ean: Option<String>,
    #[serde(default)]
    pub alternate_codes: Vec<String>,
    #[validate(length(min = 1, max = 300, message = "Product name is required"))]
    pub product_name: String,
    #[validate(range(min = 1, max = 100_000, message = "Quantity must be between 1 and 100000"))]
    pub quantity: i32,
    #[validate(custom(function = "validate_amount", message = "Unit price must be between 0 and 999999999999.99"))]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub marketplace: Marketplace,
    #[validate(length(min = 1, max = 64, message = "Suborder number is required"))]
    #[validate(custom(function = "validate_barcode_text", message = "Suborder number must be printable ASCII"))]
    pub suborder_number: String,
    #[validate(length(min = 1, max = 200, message = "Customer name is required"))]
    pub customer_name: String,
    pub customer_document: Option<String>,
    pub customer_phone: Option<String>,
    #[validate(email(message = "Invalid customer email"))]
    pub customer_email: Option<String>,
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub shipping_address: String,
    pub commune: Option<String>,
    pub region: Option<String>,
    pub carrier: Option<Carrier>,
    #[validate(custom(function = "validate_barcode_text", message = "Tracking number must be printable ASCII, at most 64 characters"))]
    pub tracking_number: Option<String>,
    #[validate(custom(function = "validate_amount", message = "Total amount must be between 0 and 999999999999.99"))]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    #[validate(custom(function = "validate_amount", message = "Shipping cost must be between 0 and 999999999999.99"))]
    pub shipping_cost: Decimal,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub dispatch_deadline: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "Order needs at least one item"))]
    #[validate(nested)]
    pub items: Vec<CreateOrderItemRequest>,
}

impl CreateOrderRequest {
    /// Σ(quantity × unit price) + shipping, used when the channel did not send a total.
    /// `None` when the sum does not fit a Decimal.
    pub fn computed_total(&self) -> Option<Decimal> {
        self.items.iter().try_fold(self.shipping_cost, |total, item| {
            item.unit_price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| total.checked_add(line))
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOrderRequest {
    #[validate(length(min = 1, max = 200, message = "Customer name cannot be empty"))]
    pub customer_name: Option<String>,
    pub customer_document: Option<String>,
    pub customer_phone: Option<String>,
    #[validate(email(message = "Invalid customer email"))]
    pub customer_email: Option<String>,
    #[validate(length(min = 1, message = "Shipping address cannot be empty"))]
    pub shipping_address: Option<String>,
    pub commune: Option<String>,
    pub region: Option<String>,
    pub carrier: Option<Carrier>,
    #[validate(custom(function = "validate_barcode_text", message = "Tracking number must be printable ASCII, at most 64 characters"))]
    pub tracking_number: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    pub dispatch_deadline: Option<DateTime<Utc>>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub marketplace: Option<Marketplace>,
    pub status: Option<OrderStatus>,
    pub carrier: Option<Carrier>,
    pub search: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkStatusRequest {
    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 orders per request"))]
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkCarrierRequest {
    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 orders per request"))]
    pub order_ids: Vec<Uuid>,
    pub carrier: Carrier,
    /// Optional tracking number per order id.
    #[serde(default)]
    pub tracking_numbers: HashMap<Uuid, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BulkItemOutcome {
    Updated,
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub outcome: BulkItemOutcome,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateResponse {
    pub updated: usize,
    pub skipped: usize,
    pub results: Vec<BulkItemResult>,
}

impl BulkUpdateResponse {
    pub fn from_results(results: Vec<BulkItemResult>) -> Self {
        let updated = results
            .iter()
            .filter(|r| r.outcome == BulkItemOutcome::Updated)
            .count();
        Self {
            updated,
            skipped: results.len() - updated,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Packed));
        assert!(Packed.can_transition_to(Shipped));
        assert!(Packed.can_transition_to(Processing));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Returned));
        assert!(Pending.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Returned.can_transition_to(Shipped));
        assert!(!Packed.can_transition_to(Packed));
    }

    #[test]
    fn test_terminal_statuses_have_no_exit() {
        for from in [OrderStatus::Cancelled, OrderStatus::Returned] {
            assert!(from.is_terminal());
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_carrier_aliases() {
        assert_eq!("Blue Express".parse::<Carrier>().unwrap(), Carrier::BlueExpress);
        assert_eq!("correos de chile".parse::<Carrier>().unwrap(), Carrier::CorreosChile);
        assert_eq!("starken".parse::<Carrier>().unwrap(), Carrier::Starken);
        assert!("dhl".parse::<Carrier>().is_err());
    }

    #[test]
    fn test_computed_total_includes_shipping() {
        let request: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "marketplace": "paris",
            "suborder_number": "PA-1",
            "customer_name": "Ana",
            "shipping_address": "Av. Siempre Viva 742",
            "shipping_cost": "3990",
            "items": [
                {"sku": "A", "product_name": "Lamp", "quantity": 2, "unit_price": "10000"},
                {"sku": "B", "product_name": "Bulb", "quantity": 1, "unit_price": "1990"}
            ]
        }))
        .unwrap();
        assert_eq!(request.computed_total(), Some(dec!(25980)));
        assert!(request.validate().is_ok());
    }

    fn request_with(item: serde_json::Value, tracking: Option<&str>) -> CreateOrderRequest {
        serde_json::from_value(serde_json::json!({
            "marketplace": "walmart",
            "suborder_number": "WM-77",
            "customer_name": "Ana",
            "shipping_address": "Calle 1",
            "tracking_number": tracking,
            "items": [item]
        }))
        .unwrap()
    }

    #[test]
    fn test_oversized_prices_are_rejected_before_totals() {
        let request = request_with(
            serde_json::json!({"product_name": "Lamp", "quantity": 2, "unit_price": "79228162514264337593543950335"}),
            None,
        );
        assert!(request.validate().is_err());
        assert_eq!(request.computed_total(), None);

        let request = request_with(
            serde_json::json!({"product_name": "Lamp", "quantity": 100000, "unit_price": "999999999999.99"}),
            None,
        );
        assert!(request.validate().is_ok());
        assert_eq!(request.computed_total(), Some(dec!(99999999999999000)));
        assert_eq!(MAX_AMOUNT, dec!(999999999999.99));
    }

    #[test]
    fn test_tracking_and_suborder_must_be_barcode_safe() {
        let item = serde_json::json!({"product_name": "Lamp", "quantity": 1, "unit_price": "1000"});
        assert!(request_with(item.clone(), Some("CHX-123 456")).validate().is_ok());
        assert!(request_with(item.clone(), Some("CHX-Ñ123")).validate().is_err());
        assert!(request_with(item.clone(), Some(&"9".repeat(65))).validate().is_err());

        let mut request = request_with(item, None);
        request.suborder_number = "pedido\n1".to_string();
        assert!(request.validate().is_err());

        let update = UpdateOrderRequest {
            tracking_number: Some("STK\u{7f}".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_create_order_requires_items() {
        let request: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "marketplace": "ripley",
            "suborder_number": "R-1",
            "customer_name": "Ana",
            "shipping_address": "Calle 1",
            "items": []
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_bulk_response_counts() {
        let id = Uuid::new_v4();
        let response = BulkUpdateResponse::from_results(vec![
            BulkItemResult { order_id: id, outcome: BulkItemOutcome::Updated },
            BulkItemResult {
                order_id: id,
                outcome: BulkItemOutcome::Skipped { reason: "Order not found".to_string() },
            },
        ]);
        assert_eq!(response.updated, 1);
        assert_eq!(response.skipped, 1);
    }
}
