use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::marketplace::MarketplaceSummary;
use super::order::OrderSummary;

#[derive(Debug, Serialize)]
pub struct LiquidationTotals {
    pub matched_amount: Decimal,
    pub unmatched_lines: i64,
    pub mismatched_lines: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub orders_today: i64,
    pub pending_dispatch: i64,
    pub overdue: i64,
    pub orders_by_status: BTreeMap<String, i64>,
    /// Last 30 days.
    pub marketplaces: Vec<MarketplaceSummary>,
    pub liquidations: LiquidationTotals,
    pub recent_orders: Vec<OrderSummary>,
}
