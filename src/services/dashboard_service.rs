use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::middleware::error_handling::Result;
use crate::models::dashboard::DashboardSummary;
use crate::models::order::OrderStatus;
use crate::repositories::{LiquidationRepository, OrderRepository};
use crate::services::order_service::build_summaries;

const RECENT_ORDERS: i64 = 10;
const REVENUE_WINDOW_DAYS: i64 = 30;

pub struct DashboardService {
    orders: OrderRepository,
    liquidations: LiquidationRepository,
}

impl DashboardService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            liquidations: LiquidationRepository::new(pool),
        }
    }

    pub async fn summary(&self) -> Result<DashboardSummary> {
        let now = Utc::now();
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);

        let orders_by_status = self.orders.count_by_status().await?;
        let pending_dispatch = OrderStatus::ALL
            .iter()
            .filter(|s| s.awaiting_dispatch())
            .map(|s| orders_by_status.get(s.as_str()).copied().unwrap_or(0))
            .sum();

        let window_start = now - Duration::days(REVENUE_WINDOW_DAYS);
        let marketplaces = build_summaries(
            self.orders.marketplace_breakdown(Some(window_start)).await?,
        );

        Ok(DashboardSummary {
            orders_today: self.orders.count_since(start_of_day).await?,
            pending_dispatch,
            overdue: self.orders.count_overdue().await?,
            orders_by_status,
            marketplaces,
            liquidations: self.liquidations.totals().await?,
            recent_orders: self.orders.recent(RECENT_ORDERS).await?,
        })
    }
}
