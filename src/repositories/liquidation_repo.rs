use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, query, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::dashboard::LiquidationTotals;
use crate::models::liquidation::{
    JobFilter, JobStatus, LineFilter, LineMatchStatus, LiquidationJob, LiquidationLine,
    NewLiquidationLine,
};
use crate::models::marketplace::Marketplace;
use crate::models::Pagination;

const JOB_COLUMNS: &str = r#"
    id, marketplace, original_filename, file_path, file_hash, status, rows_total,
    rows_processed, rows_matched, rows_unmatched, rows_mismatched, rows_failed,
    error_message, uploaded_by, created_at, started_at, completed_at
"#;

const LINE_COLUMNS: &str = r#"
    id, job_id, row_number, suborder_number, order_id, gross_amount, commission_amount,
    shipping_amount, net_amount, settlement_date, document_number, match_status,
    amount_difference, created_at
"#;

/// Running totals of a job, written after every batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobCounters {
    pub processed: i32,
    pub matched: i32,
    pub unmatched: i32,
    pub mismatched: i32,
    pub failed: i32,
}

pub struct LiquidationRepository {
    pool: PgPool,
}

impl LiquidationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_job(
        &self,
        marketplace: Marketplace,
        original_filename: &str,
        file_path: &str,
        file_hash: &str,
        uploaded_by: Uuid,
    ) -> Result<LiquidationJob> {
        let row = query(&format!(
            r#"
            INSERT INTO liquidation_jobs (marketplace, original_filename, file_path, file_hash, uploaded_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(marketplace.slug())
        .bind(original_filename)
        .bind(file_path)
        .bind(file_hash)
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(map_job(&row)?)
    }

    /// A finished import of the same bytes for the same channel.
    pub async fn find_completed_duplicate(
        &self,
        marketplace: Marketplace,
        file_hash: &str,
    ) -> Result<Option<LiquidationJob>> {
        let row = query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM liquidation_jobs
            WHERE marketplace = $1 AND file_hash = $2 AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(marketplace.slug())
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_job).transpose()?)
    }

    pub async fn find_job(&self, id: Uuid) -> Result<Option<LiquidationJob>> {
        let row = query(&format!("SELECT {JOB_COLUMNS} FROM liquidation_jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(map_job).transpose()?)
    }

    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<LiquidationJob>, i64)> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM liquidation_jobs WHERE TRUE");
        push_job_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;

        let mut list: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM liquidation_jobs WHERE TRUE"));
        push_job_filter(&mut list, filter);
        list.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(pagination.per_page())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let rows = list.build().fetch_all(&self.pool).await?;
        let jobs = rows
            .iter()
            .map(map_job)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
        Ok((jobs, total))
    }

    /// Ids of jobs a previous process left unfinished, oldest first.
    pub async fn unfinished_job_ids(&self) -> Result<Vec<Uuid>> {
        let rows = query(
            "SELECT id FROM liquidation_jobs WHERE status IN ('queued', 'processing') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("id")?);
        }
        Ok(ids)
    }

    /// Moves the job to `processing` and clears lines from an interrupted run.
    pub async fn start_job(&self, id: Uuid, rows_total: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        query("DELETE FROM liquidation_lines WHERE job_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        query(
            r#"
            UPDATE liquidation_jobs
            SET status = 'processing', started_at = NOW(), rows_total = $2,
                rows_processed = 0, rows_matched = 0, rows_unmatched = 0,
                rows_mismatched = 0, rows_failed = 0, error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(rows_total)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts one batch of lines and the updated counters atomically.
    pub async fn insert_batch(
        &self,
        job_id: Uuid,
        lines: &[NewLiquidationLine],
        counters: &JobCounters,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !lines.is_empty() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO liquidation_lines (job_id, row_number, suborder_number, order_id, \
                 gross_amount, commission_amount, shipping_amount, net_amount, settlement_date, \
                 document_number, match_status, amount_difference) ",
            );
            builder.push_values(lines, |mut b, line| {
                b.push_bind(job_id)
                    .push_bind(line.row.row_number)
                    .push_bind(line.row.suborder_number.clone())
                    .push_bind(line.order_id)
                    .push_bind(line.row.gross_amount)
                    .push_bind(line.row.commission_amount)
                    .push_bind(line.row.shipping_amount)
                    .push_bind(line.row.net_amount)
                    .push_bind(line.row.settlement_date)
                    .push_bind(line.row.document_number.clone())
                    .push_bind(line.match_status.as_str())
                    .push_bind(line.amount_difference);
            });
            builder.build().execute(&mut *tx).await?;
        }

        write_counters(&mut tx, job_id, counters).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn complete_job(&self, id: Uuid, counters: &JobCounters) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_counters(&mut tx, id, counters).await?;
        query(
            "UPDATE liquidation_jobs SET status = 'completed', completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn fail_job(&self, id: Uuid, error_message: &str) -> Result<()> {
        query(
            r#"
            UPDATE liquidation_jobs
            SET status = 'failed', error_message = $2, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn lines(
        &self,
        job_id: Uuid,
        filter: &LineFilter,
        pagination: Option<&Pagination>,
    ) -> Result<(Vec<LiquidationLine>, i64)> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM liquidation_lines WHERE job_id = ");
        count.push_bind(job_id);
        push_line_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;

        let mut list: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {LINE_COLUMNS} FROM liquidation_lines WHERE job_id = "));
        list.push_bind(job_id);
        push_line_filter(&mut list, filter);
        list.push(" ORDER BY row_number");
        if let Some(pagination) = pagination {
            list.push(" LIMIT ")
                .push_bind(pagination.per_page())
                .push(" OFFSET ")
                .push_bind(pagination.offset());
        }

        let rows = list.build().fetch_all(&self.pool).await?;
        let lines = rows
            .iter()
            .map(map_line)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
        Ok((lines, total))
    }

    pub async fn totals(&self) -> Result<LiquidationTotals> {
        let row = query(
            r#"
            SELECT
                COALESCE(SUM(gross_amount) FILTER (WHERE match_status = 'matched'), 0) AS matched_amount,
                COUNT(*) FILTER (WHERE match_status = 'unmatched') AS unmatched_lines,
                COUNT(*) FILTER (WHERE match_status = 'amount_mismatch') AS mismatched_lines
            FROM liquidation_lines
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LiquidationTotals {
            matched_amount: row.try_get::<Decimal, _>("matched_amount")?,
            unmatched_lines: row.try_get("unmatched_lines")?,
            mismatched_lines: row.try_get("mismatched_lines")?,
        })
    }
}

async fn write_counters(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
    counters: &JobCounters,
) -> Result<()> {
    query(
        r#"
        UPDATE liquidation_jobs
        SET rows_processed = $2, rows_matched = $3, rows_unmatched = $4,
            rows_mismatched = $5, rows_failed = $6
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(counters.processed)
    .bind(counters.matched)
    .bind(counters.unmatched)
    .bind(counters.mismatched)
    .bind(counters.failed)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn push_job_filter(builder: &mut QueryBuilder<Postgres>, filter: &JobFilter) {
    if let Some(marketplace) = filter.marketplace {
        builder.push(" AND marketplace = ").push_bind(marketplace.slug());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

fn push_line_filter(builder: &mut QueryBuilder<Postgres>, filter: &LineFilter) {
    if let Some(status) = filter.match_status {
        builder.push(" AND match_status = ").push_bind(status.as_str());
    }
}

fn map_job(row: &PgRow) -> std::result::Result<LiquidationJob, sqlx::Error> {
    let marketplace: String = row.try_get("marketplace")?;
    let status: String = row.try_get("status")?;
    Ok(LiquidationJob {
        id: row.try_get("id")?,
        marketplace: marketplace
            .parse::<Marketplace>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        original_filename: row.try_get("original_filename")?,
        file_path: row.try_get("file_path")?,
        file_hash: row.try_get("file_hash")?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        rows_total: row.try_get("rows_total")?,
        rows_processed: row.try_get("rows_processed")?,
        rows_matched: row.try_get("rows_matched")?,
        rows_unmatched: row.try_get("rows_unmatched")?,
        rows_mismatched: row.try_get("rows_mismatched")?,
        rows_failed: row.try_get("rows_failed")?,
        error_message: row.try_get("error_message")?,
        uploaded_by: row.try_get("uploaded_by")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn map_line(row: &PgRow) -> std::result::Result<LiquidationLine, sqlx::Error> {
    let match_status: String = row.try_get("match_status")?;
    Ok(LiquidationLine {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        row_number: row.try_get("row_number")?,
        suborder_number: row.try_get("suborder_number")?,
        order_id: row.try_get("order_id")?,
        gross_amount: row.try_get("gross_amount")?,
        commission_amount: row.try_get("commission_amount")?,
        shipping_amount: row.try_get("shipping_amount")?,
        net_amount: row.try_get("net_amount")?,
        settlement_date: row.try_get("settlement_date")?,
        document_number: row.try_get("document_number")?,
        match_status: match_status
            .parse::<LineMatchStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        amount_difference: row.try_get("amount_difference")?,
        created_at: row.try_get("created_at")?,
    })
}
