use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, query, PgPool, Postgres, QueryBuilder, Row};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::marketplace::Marketplace;
use crate::models::order::{
    Carrier, CreateOrderRequest, Order, OrderFilter, OrderItem, OrderStatus, OrderSummary,
    OrderWithItems, UpdateOrderRequest,
};
use crate::models::Pagination;

const ORDER_COLUMNS: &str = r#"
    o.id, o.marketplace, o.suborder_number, o.customer_name, o.customer_document,
    o.customer_phone, o.customer_email, o.shipping_address, o.commune, o.region,
    o.carrier, o.tracking_number, o.status, o.total_amount, o.shipping_cost,
    o.invoice_number, o.notes, o.purchased_at, o.dispatch_deadline, o.scan_verified_at,
    o.created_at, o.updated_at
"#;

const ITEM_COLUMNS: &str = "i.id, i.order_id, i.sku, i.ean, i.alternate_codes, i.product_name, \
     i.quantity, i.unit_price, i.scanned_quantity";

const SUMMARY_COLUMNS: &str = r#"
    o.id, o.marketplace, o.suborder_number, o.customer_name, o.commune, o.carrier,
    o.tracking_number, o.status, o.total_amount, o.purchased_at, o.dispatch_deadline,
    o.scan_verified_at,
    (SELECT COUNT(*) FROM order_items i WHERE i.order_id = o.id) AS item_count,
    (SELECT COALESCE(SUM(i.quantity), 0)::BIGINT FROM order_items i WHERE i.order_id = o.id) AS unit_count
"#;

/// SQL twin of `product_matcher::normalize_code` for stored item codes:
/// uppercase, no whitespace or `-` `_` `.` `/`.
const NORMALIZED_SKU: &str = "REGEXP_REPLACE(UPPER(i.sku), '[[:space:]_./-]', '', 'g')";
const NORMALIZED_EAN: &str = "REGEXP_REPLACE(UPPER(i.ean), '[[:space:]_./-]', '', 'g')";

/// Hard cap for CSV exports.
pub const EXPORT_LIMIT: i64 = 50_000;

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        filter: &OrderFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<OrderSummary>, i64)> {
        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM orders o WHERE TRUE");
        push_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut list_query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SUMMARY_COLUMNS} FROM orders o WHERE TRUE"));
        push_filter(&mut list_query, filter);
        list_query.push(" ORDER BY o.purchased_at DESC, o.created_at DESC LIMIT ");
        list_query.push_bind(pagination.per_page());
        list_query.push(" OFFSET ");
        list_query.push_bind(pagination.offset());

        let rows = list_query.build().fetch_all(&self.pool).await?;
        let orders = rows
            .iter()
            .map(map_summary)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok((orders, total))
    }

    pub async fn list_for_export(&self, filter: &OrderFilter) -> Result<Vec<OrderSummary>> {
        let mut list_query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SUMMARY_COLUMNS} FROM orders o WHERE TRUE"));
        push_filter(&mut list_query, filter);
        list_query.push(" ORDER BY o.purchased_at DESC, o.created_at DESC LIMIT ");
        list_query.push_bind(EXPORT_LIMIT);

        let rows = list_query.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(map_summary)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<OrderSummary>> {
        let rows = query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM orders o ORDER BY o.created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_summary)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let row = query(&format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(map_order).transpose()?)
    }

    pub async fn find_with_items(&self, id: Uuid) -> Result<Option<OrderWithItems>> {
        let Some(order) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let items = self.items_for(&[id]).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Orders with items in the order the ids were given; unknown ids are
    /// returned separately.
    pub async fn find_many_with_items(
        &self,
        ids: &[Uuid],
    ) -> Result<(Vec<OrderWithItems>, Vec<Uuid>)> {
        let rows = query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut orders: HashMap<Uuid, Order> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let order = map_order(row)?;
            orders.insert(order.id, order);
        }

        let found: Vec<Uuid> = orders.keys().copied().collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in self.items_for(&found).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let mut result = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match orders.remove(id) {
                Some(order) => {
                    let items = items_by_order.remove(id).unwrap_or_default();
                    result.push(OrderWithItems { order, items });
                }
                // duplicates in the request resolve to the first occurrence
                None if result.iter().any(|o: &OrderWithItems| o.order.id == *id) => {}
                None => missing.push(*id),
            }
        }

        Ok((result, missing))
    }

    pub async fn items_for(&self, order_ids: &[Uuid]) -> Result<Vec<OrderItem>> {
        let rows = query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items i WHERE i.order_id = ANY($1) \
             ORDER BY i.order_id, i.sku NULLS LAST, i.product_name"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_item)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    pub async fn exists(&self, marketplace: Marketplace, suborder_number: &str) -> Result<bool> {
        let row = query(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE marketplace = $1 AND suborder_number = $2) AS found",
        )
        .bind(marketplace.slug())
        .bind(suborder_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("found")?)
    }

    pub async fn create(
        &self,
        request: &CreateOrderRequest,
        total_amount: Decimal,
        alternate_codes: &[Vec<String>],
    ) -> Result<OrderWithItems> {
        let mut tx = self.pool.begin().await?;

        let inserted = query(&format!(
            r#"
            INSERT INTO orders AS o (
                marketplace, suborder_number, customer_name, customer_document, customer_phone,
                customer_email, shipping_address, commune, region, carrier, tracking_number,
                total_amount, shipping_cost, invoice_number, notes, purchased_at, dispatch_deadline
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    COALESCE($16, NOW()), $17)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(request.marketplace.slug())
        .bind(request.suborder_number.trim())
        .bind(request.customer_name.trim())
        .bind(&request.customer_document)
        .bind(&request.customer_phone)
        .bind(&request.customer_email)
        .bind(request.shipping_address.trim())
        .bind(&request.commune)
        .bind(&request.region)
        .bind(request.carrier.map(|c| c.as_str()))
        .bind(&request.tracking_number)
        .bind(total_amount)
        .bind(request.shipping_cost)
        .bind(&request.invoice_number)
        .bind(&request.notes)
        .bind(request.purchased_at)
        .bind(request.dispatch_deadline)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AppError::Conflict(format!(
                    "Order {} already exists for {}",
                    request.suborder_number,
                    request.marketplace.display_name()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let order = map_order(&row)?;

        let mut items = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.iter().enumerate() {
            let codes = alternate_codes.get(index).cloned().unwrap_or_default();
            let row = query(&format!(
                r#"
                INSERT INTO order_items AS i (order_id, sku, ean, alternate_codes, product_name, quantity, unit_price)
                VALUES ($1, NULLIF(TRIM($2), ''), NULLIF(TRIM($3), ''), $4, $5, $6, $7)
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(order.id)
            .bind(&item.sku)
            .bind(&item.ean)
            .bind(&codes)
            .bind(item.product_name.trim())
            .bind(item.quantity)
            .bind(item.unit_price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(map_item(&row)?);
        }

        tx.commit().await?;
        Ok(OrderWithItems { order, items })
    }

    /// Partial update of the editable fields. Empty strings clear optional text.
    /// A status change applies only while the order is still in `current`;
    /// `None` means the order is gone or its status moved, and nothing was written.
    pub async fn update(
        &self,
        id: Uuid,
        request: &UpdateOrderRequest,
        current: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE orders AS o SET updated_at = NOW()");

        if let Some(name) = &request.customer_name {
            builder.push(", customer_name = ").push_bind(name.trim().to_string());
        }
        if let Some(address) = &request.shipping_address {
            builder.push(", shipping_address = ").push_bind(address.trim().to_string());
        }

        let optional_text = [
            ("customer_document", &request.customer_document),
            ("customer_phone", &request.customer_phone),
            ("customer_email", &request.customer_email),
            ("commune", &request.commune),
            ("region", &request.region),
            ("tracking_number", &request.tracking_number),
            ("invoice_number", &request.invoice_number),
            ("notes", &request.notes),
        ];
        for (column, value) in optional_text {
            if let Some(value) = value {
                builder
                    .push(format!(", {column} = NULLIF("))
                    .push_bind(value.trim().to_string())
                    .push(", '')");
            }
        }

        if let Some(carrier) = request.carrier {
            builder.push(", carrier = ").push_bind(carrier.as_str());
        }
        if let Some(deadline) = request.dispatch_deadline {
            builder.push(", dispatch_deadline = ").push_bind(deadline);
        }
        if let Some(next) = request.status {
            builder.push(", status = ").push_bind(next.as_str());
        }

        builder.push(" WHERE o.id = ").push_bind(id);
        if request.status.is_some() {
            builder.push(" AND o.status = ").push_bind(current.as_str());
        }
        builder.push(format!(" RETURNING {ORDER_COLUMNS}"));

        let row = builder.build().fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(map_order).transpose()?)
    }

    /// Single-row status change guarded by the status the caller validated
    /// the transition against. `false` when the order moved in between.
    pub async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let result = query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Carrier change for orders that have not left the warehouse.
    pub async fn update_carrier_guarded(
        &self,
        id: Uuid,
        carrier: Carrier,
        tracking_number: Option<&str>,
    ) -> Result<bool> {
        let result = query(
            r#"
            UPDATE orders
            SET carrier = $2,
                tracking_number = COALESCE(NULLIF(TRIM($3), ''), tracking_number),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing', 'packed')
            "#,
        )
        .bind(id)
        .bind(carrier.as_str())
        .bind(tracking_number)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = query(
            "DELETE FROM orders WHERE id = $1 AND status IN ('pending', 'cancelled')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_suborder_exact(&self, code: &str) -> Result<Vec<Order>> {
        self.find_where("o.suborder_number = $1", code).await
    }

    pub async fn find_by_tracking(&self, code: &str) -> Result<Vec<Order>> {
        self.find_where("UPPER(o.tracking_number) = UPPER($1)", code).await
    }

    /// Matches upper-cased suborder numbers, with and without leading zeros,
    /// against pre-normalized candidate forms.
    pub async fn find_by_suborder_variants(&self, variants: &[String]) -> Result<Vec<Order>> {
        let rows = query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders o
            WHERE UPPER(o.suborder_number) = ANY($1)
               OR LTRIM(UPPER(o.suborder_number), '0') = ANY($1)
            ORDER BY o.purchased_at DESC
            LIMIT 20
            "#
        ))
        .bind(variants)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_order)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    async fn find_where(&self, predicate: &str, code: &str) -> Result<Vec<Order>> {
        let rows = query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE {predicate} ORDER BY o.purchased_at DESC LIMIT 20"
        ))
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_order)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    /// Open orders holding an item whose normalized SKU, EAN or alternate
    /// code equals one of the given normalized forms.
    pub async fn find_open_with_product(&self, codes: &[String]) -> Result<Vec<OrderSummary>> {
        let rows = query(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS} FROM orders o
            WHERE o.status IN ('pending', 'processing')
              AND EXISTS (
                  SELECT 1 FROM order_items i
                  WHERE i.order_id = o.id
                    AND ({NORMALIZED_SKU} = ANY($1)
                         OR {NORMALIZED_EAN} = ANY($1)
                         OR i.alternate_codes && $1)
              )
            ORDER BY o.dispatch_deadline ASC NULLS LAST, o.purchased_at ASC
            LIMIT 100
            "#
        ))
        .bind(codes)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_summary)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    /// Adds to an item's scanned quantity unless that would exceed the ordered
    /// quantity. `None` means the guard rejected the increment.
    pub async fn increment_scanned(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Option<OrderItem>> {
        let row = query(&format!(
            r#"
            UPDATE order_items AS i
            SET scanned_quantity = i.scanned_quantity + $3
            WHERE i.id = $1 AND i.order_id = $2 AND i.scanned_quantity + $3 <= i.quantity
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_id)
        .bind(order_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_item).transpose()?)
    }

    /// Sets `scan_verified_at` and, when given, the packed status, in one statement.
    pub async fn mark_scan_verified(
        &self,
        order_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Option<Order>> {
        let row = query(&format!(
            r#"
            UPDATE orders AS o
            SET scan_verified_at = NOW(),
                status = COALESCE($2, o.status),
                updated_at = NOW()
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_order).transpose()?)
    }

    pub async fn reset_scan(&self, order_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = query(
            "UPDATE orders SET scan_verified_at = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        query("UPDATE order_items SET scanned_quantity = 0 WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Orders and amount keyed by marketplace suborder, for settlement reconciliation.
    /// Each order is keyed by its upper-cased suborder and by that form without
    /// leading zeros, so `0001234` is found for a settlement row saying `1234`.
    pub async fn totals_by_suborder(
        &self,
        marketplace: Marketplace,
        suborders: &[String],
    ) -> Result<HashMap<String, (Uuid, Decimal)>> {
        let rows = query(
            r#"
            SELECT id, UPPER(suborder_number) AS suborder, total_amount
            FROM orders
            WHERE marketplace = $1
              AND (UPPER(suborder_number) = ANY($2)
                   OR LTRIM(UPPER(suborder_number), '0') = ANY($2))
            "#,
        )
        .bind(marketplace.slug())
        .bind(suborders)
        .fetch_all(&self.pool)
        .await?;

        let mut found: Vec<(String, Uuid, Decimal)> = Vec::with_capacity(rows.len());
        for row in rows {
            found.push((
                row.try_get("suborder")?,
                row.try_get("id")?,
                row.try_get("total_amount")?,
            ));
        }
        Ok(key_totals(found))
    }

    pub async fn count_by_status(&self) -> Result<BTreeMap<String, i64>> {
        let rows = query("SELECT status, COUNT(*) AS total FROM orders GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            counts.insert(row.try_get("status")?, row.try_get("total")?);
        }
        Ok(counts)
    }

    /// (marketplace, status) -> (orders, amount), optionally since a point in time.
    pub async fn marketplace_breakdown(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(String, String, i64, Decimal)>> {
        let rows = query(
            r#"
            SELECT marketplace, status, COUNT(*) AS total, COALESCE(SUM(total_amount), 0) AS amount
            FROM orders
            WHERE $1::timestamptz IS NULL OR purchased_at >= $1
            GROUP BY marketplace, status
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut breakdown = Vec::with_capacity(rows.len());
        for row in rows {
            breakdown.push((
                row.try_get("marketplace")?,
                row.try_get("status")?,
                row.try_get("total")?,
                row.try_get("amount")?,
            ));
        }
        Ok(breakdown)
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = query("SELECT COUNT(*) AS total FROM orders WHERE purchased_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    pub async fn count_overdue(&self) -> Result<i64> {
        let row = query(
            r#"
            SELECT COUNT(*) AS total FROM orders
            WHERE dispatch_deadline < NOW() AND status IN ('pending', 'processing', 'packed')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }
}

fn push_filter(builder: &mut QueryBuilder<Postgres>, filter: &OrderFilter) {
    if let Some(marketplace) = filter.marketplace {
        builder.push(" AND o.marketplace = ").push_bind(marketplace.slug());
    }
    if let Some(status) = filter.status {
        builder.push(" AND o.status = ").push_bind(status.as_str());
    }
    if let Some(carrier) = filter.carrier {
        builder.push(" AND o.carrier = ").push_bind(carrier.as_str());
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND o.purchased_at >= ").push_bind(from).push("::date");
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND o.purchased_at < (").push_bind(to).push("::date + 1)");
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        builder.push(" AND (o.suborder_number ILIKE ").push_bind(pattern.clone());
        builder.push(" OR o.customer_name ILIKE ").push_bind(pattern.clone());
        builder.push(" OR o.tracking_number ILIKE ").push_bind(pattern);
        builder.push(")");
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn decode<T, E>(value: std::result::Result<T, E>) -> std::result::Result<T, sqlx::Error>
where
    E: std::error::Error + Send + Sync + 'static,
{
    value.map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Keys each order by its suborder and by that suborder without leading
/// zeros. An exact suborder wins over a zero-padded one.
fn key_totals(rows: Vec<(String, Uuid, Decimal)>) -> HashMap<String, (Uuid, Decimal)> {
    let mut totals = HashMap::with_capacity(rows.len() * 2);
    let mut padded = Vec::new();
    for (suborder, id, total) in rows {
        let unpadded = suborder.trim_start_matches('0');
        if !unpadded.is_empty() && unpadded != suborder {
            padded.push((unpadded.to_string(), (id, total)));
        }
        totals.insert(suborder, (id, total));
    }
    for (key, entry) in padded {
        totals.entry(key).or_insert(entry);
    }
    totals
}

fn map_order(row: &PgRow) -> std::result::Result<Order, sqlx::Error> {
    let marketplace: String = row.try_get("marketplace")?;
    let status: String = row.try_get("status")?;
    let carrier: Option<String> = row.try_get("carrier")?;

    Ok(Order {
        id: row.try_get("id")?,
        marketplace: decode(marketplace.parse::<Marketplace>())?,
        suborder_number: row.try_get("suborder_number")?,
        customer_name: row.try_get("customer_name")?,
        customer_document: row.try_get("customer_document")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_email: row.try_get("customer_email")?,
        shipping_address: row.try_get("shipping_address")?,
        commune: row.try_get("commune")?,
        region: row.try_get("region")?,
        carrier: carrier.map(|c| decode(c.parse::<Carrier>())).transpose()?,
        tracking_number: row.try_get("tracking_number")?,
        status: decode(status.parse::<OrderStatus>())?,
        total_amount: row.try_get("total_amount")?,
        shipping_cost: row.try_get("shipping_cost")?,
        invoice_number: row.try_get("invoice_number")?,
        notes: row.try_get("notes")?,
        purchased_at: row.try_get("purchased_at")?,
        dispatch_deadline: row.try_get("dispatch_deadline")?,
        scan_verified_at: row.try_get("scan_verified_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_item(row: &PgRow) -> std::result::Result<OrderItem, sqlx::Error> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        sku: row.try_get("sku")?,
        ean: row.try_get("ean")?,
        alternate_codes: row.try_get("alternate_codes")?,
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        scanned_quantity: row.try_get("scanned_quantity")?,
    })
}

fn map_summary(row: &PgRow) -> std::result::Result<OrderSummary, sqlx::Error> {
    let marketplace: String = row.try_get("marketplace")?;
    let status: String = row.try_get("status")?;
    let carrier: Option<String> = row.try_get("carrier")?;

    Ok(OrderSummary {
        id: row.try_get("id")?,
        marketplace: decode(marketplace.parse::<Marketplace>())?,
        suborder_number: row.try_get("suborder_number")?,
        customer_name: row.try_get("customer_name")?,
        commune: row.try_get("commune")?,
        carrier: carrier.map(|c| decode(c.parse::<Carrier>())).transpose()?,
        tracking_number: row.try_get("tracking_number")?,
        status: decode(status.parse::<OrderStatus>())?,
        total_amount: row.try_get("total_amount")?,
        item_count: row.try_get("item_count")?,
        unit_count: row.try_get("unit_count")?,
        purchased_at: row.try_get("purchased_at")?,
        dispatch_deadline: row.try_get("dispatch_deadline")?,
        scan_verified_at: row.try_get("scan_verified_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("ML-123"), "ML-123");
    }

    #[test]
    fn test_filter_sql_shape() {
        let filter = OrderFilter {
            marketplace: Some(Marketplace::Paris),
            status: Some(OrderStatus::Packed),
            search: Some("  ana ".to_string()),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM orders o WHERE TRUE");
        push_filter(&mut builder, &filter);
        let sql = builder.sql();
        assert!(sql.contains("o.marketplace = $1"));
        assert!(sql.contains("o.status = $2"));
        assert!(sql.contains("o.suborder_number ILIKE $3"));
        assert!(sql.contains("o.tracking_number ILIKE $5"));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = OrderFilter {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("WHERE TRUE");
        push_filter(&mut builder, &filter);
        assert_eq!(builder.sql(), "WHERE TRUE");
    }

    #[test]
    fn test_totals_are_reachable_without_leading_zeros() {
        use rust_decimal_macros::dec;

        let padded = Uuid::new_v4();
        let totals = key_totals(vec![("0001234".to_string(), padded, dec!(15990))]);
        assert_eq!(totals.get("0001234"), Some(&(padded, dec!(15990))));
        assert_eq!(totals.get("1234"), Some(&(padded, dec!(15990))));

        let exact = Uuid::new_v4();
        let totals = key_totals(vec![
            ("0001234".to_string(), padded, dec!(1)),
            ("1234".to_string(), exact, dec!(2)),
        ]);
        assert_eq!(totals.get("1234"), Some(&(exact, dec!(2))));
        assert_eq!(totals.len(), 2);

        let totals = key_totals(vec![("000".to_string(), padded, dec!(1))]);
        assert_eq!(totals.len(), 1);
    }
}
