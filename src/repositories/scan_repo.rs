use sqlx::{postgres::PgRow, query, PgPool, Row};
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::scan::{MatchKind, NewScanEvent, ScanEvent};

pub struct ScanEventRepository {
    pool: PgPool,
}

impl ScanEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: &NewScanEvent) -> Result<ScanEvent> {
        let row = query(
            r#"
            INSERT INTO scan_events (
                order_id, user_id, scanned_code, order_item_id, match_kind, confidence, accepted, quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, order_id, user_id, scanned_code, order_item_id, match_kind,
                      confidence, accepted, quantity, created_at
            "#,
        )
        .bind(event.order_id)
        .bind(event.user_id)
        .bind(&event.scanned_code)
        .bind(event.order_item_id)
        .bind(event.match_kind.map(|k| k.as_str()))
        .bind(event.confidence)
        .bind(event.accepted)
        .bind(event.quantity)
        .fetch_one(&self.pool)
        .await?;

        Ok(map_event(&row)?)
    }

    pub async fn for_order(&self, order_id: Uuid) -> Result<Vec<ScanEvent>> {
        let rows = query(
            r#"
            SELECT id, order_id, user_id, scanned_code, order_item_id, match_kind,
                   confidence, accepted, quantity, created_at
            FROM scan_events
            WHERE order_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_event)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }
}

fn map_event(row: &PgRow) -> std::result::Result<ScanEvent, sqlx::Error> {
    let kind: Option<String> = row.try_get("match_kind")?;
    Ok(ScanEvent {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        scanned_code: row.try_get("scanned_code")?,
        order_item_id: row.try_get("order_item_id")?,
        match_kind: kind
            .map(|k| k.parse::<MatchKind>().map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()?,
        confidence: row.try_get("confidence")?,
        accepted: row.try_get("accepted")?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
    })
}
