//! Marketplace settlement imports: upload, background processing, review

use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::metrics::{record_liquidation_job, record_liquidation_rows};
use crate::models::liquidation::{
    JobFilter, JobStatus, LineFilter, LineMatchStatus, LiquidationJob, LiquidationJobResponse,
    LiquidationLine, NewLiquidationLine,
};
use crate::models::marketplace::Marketplace;
use crate::models::{Paginated, Pagination};
use crate::repositories::{JobCounters, LiquidationRepository, OrderRepository};
use crate::services::file_parser_service::{sha256_hex, FileParserService};
use crate::services::liquidation_parser::{lookup_keys, parse_settlement, reconcile};
use crate::services::liquidation_worker::LiquidationQueue;
use crate::utils::file_storage::FileStorage;
use crate::utils::log_sanitizer::sanitize_for_log;

pub const BATCH_SIZE: usize = 100;

pub struct LiquidationService {
    jobs: LiquidationRepository,
    orders: OrderRepository,
    storage: FileStorage,
    max_upload_bytes: usize,
}

impl LiquidationService {
    pub fn new(pool: PgPool, storage: FileStorage, max_upload_bytes: usize) -> Self {
        Self {
            jobs: LiquidationRepository::new(pool.clone()),
            orders: OrderRepository::new(pool),
            storage,
            max_upload_bytes,
        }
    }

    /// Stores the file, creates a queued job and hands it to the workers.
    pub async fn upload(
        &self,
        marketplace: Marketplace,
        filename: &str,
        data: &[u8],
        uploaded_by: Uuid,
        queue: &LiquidationQueue,
    ) -> Result<LiquidationJobResponse> {
        check_upload_size(data.len(), self.max_upload_bytes)?;
        // fail fast on formats the worker could never read
        FileParserService::detect_file_type(data, filename)?;

        let hash = sha256_hex(data);
        if let Some(existing) = self.jobs.find_completed_duplicate(marketplace, &hash).await? {
            return Err(AppError::Conflict(format!(
                "This file was already imported for {} (job {})",
                marketplace.display_name(),
                existing.id
            )));
        }

        let stored = self.storage.save(marketplace.slug(), filename, data)?;
        let original_filename = sanitize_filename(filename);
        let job = self
            .jobs
            .create_job(
                marketplace,
                &original_filename,
                &stored.relative_path,
                &stored.sha256,
                uploaded_by,
            )
            .await?;

        queue.enqueue(job.id).await?;
        record_liquidation_job(JobStatus::Queued.as_str());
        tracing::info!(
            "Liquidation {} queued: {} ({} bytes) for {}",
            job.id,
            sanitize_for_log(&original_filename),
            data.len(),
            marketplace.slug()
        );
        Ok(job.into())
    }

    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        pagination: &Pagination,
    ) -> Result<Paginated<LiquidationJobResponse>> {
        let (jobs, total) = self.jobs.list_jobs(filter, pagination).await?;
        Ok(Paginated::new(
            jobs.into_iter().map(LiquidationJobResponse::from).collect(),
            pagination,
            total,
        ))
    }

    pub async fn get_job(&self, id: Uuid) -> Result<LiquidationJobResponse> {
        Ok(self.find_job(id).await?.into())
    }

    pub async fn job_lines(
        &self,
        id: Uuid,
        filter: &LineFilter,
        pagination: &Pagination,
    ) -> Result<Paginated<LiquidationLine>> {
        self.find_job(id).await?;
        let (lines, total) = self.jobs.lines(id, filter, Some(pagination)).await?;
        Ok(Paginated::new(lines, pagination, total))
    }

    pub async fn export_job_csv(&self, id: Uuid, filter: &LineFilter) -> Result<(String, Vec<u8>)> {
        let job = self.find_job(id).await?;
        let (lines, _) = self.jobs.lines(id, filter, None).await?;
        let filename = format!(
            "liquidation-{}-{}.csv",
            job.marketplace.slug(),
            job.created_at.format("%Y%m%d")
        );
        Ok((filename, write_lines_csv(&lines)?))
    }

    /// Runs one job to completion. Called by the workers.
    pub async fn process_job(&self, id: Uuid) -> Result<JobCounters> {
        let job = self.find_job(id).await?;
        if job.status.is_finished() {
            tracing::debug!("Liquidation {} already {}, skipping", id, job.status.as_str());
            return Ok(JobCounters::default());
        }

        let data = self.storage.read(&job.file_path)?;
        let filename = job.original_filename.clone();
        let marketplace = job.marketplace;
        let parsed = tokio::task::spawn_blocking(move || {
            let sheet = FileParserService::parse(&data, &filename)?;
            parse_settlement(&sheet, marketplace)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("parser task failed: {}", e)))??;

        let rows_total = i32::try_from(parsed.row_count()).unwrap_or(i32::MAX);
        self.jobs.start_job(id, rows_total).await?;
        record_liquidation_job(JobStatus::Processing.as_str());

        let mut counters = JobCounters {
            failed: i32::try_from(parsed.failures.len()).unwrap_or(i32::MAX),
            processed: i32::try_from(parsed.failures.len()).unwrap_or(i32::MAX),
            ..JobCounters::default()
        };
        for failure in &parsed.failures {
            tracing::debug!(
                "Liquidation {} row {} skipped: {}",
                id,
                failure.row_number,
                sanitize_for_log(&failure.reason)
            );
        }
        record_liquidation_rows("failed", parsed.failures.len() as u64);

        let batches = (parsed.rows.len() + BATCH_SIZE - 1) / BATCH_SIZE;
        for (batch_idx, chunk) in parsed.rows.chunks(BATCH_SIZE).enumerate() {
            let keys = lookup_keys(chunk);
            let totals = self.orders.totals_by_suborder(marketplace, &keys).await?;

            let lines: Vec<NewLiquidationLine> = chunk
                .iter()
                .cloned()
                .map(|row| reconcile(row, &totals))
                .collect();
            let batch = tally(&lines);
            counters.processed += batch.processed;
            counters.matched += batch.matched;
            counters.unmatched += batch.unmatched;
            counters.mismatched += batch.mismatched;

            self.jobs.insert_batch(id, &lines, &counters).await?;
            record_liquidation_rows("matched", batch.matched as u64);
            record_liquidation_rows("unmatched", batch.unmatched as u64);
            record_liquidation_rows("amount_mismatch", batch.mismatched as u64);

            tracing::debug!(
                "Liquidation {} batch {}/{} stored ({} rows)",
                id,
                batch_idx + 1,
                batches,
                lines.len()
            );
        }

        self.jobs.complete_job(id, &counters).await?;
        record_liquidation_job(JobStatus::Completed.as_str());
        tracing::info!(
            "Liquidation {} completed: {} rows, {} matched, {} unmatched, {} mismatched, {} failed",
            id,
            counters.processed,
            counters.matched,
            counters.unmatched,
            counters.mismatched,
            counters.failed
        );
        Ok(counters)
    }

    pub async fn fail_job(&self, id: Uuid, error: &AppError) -> Result<()> {
        let message = match error {
            AppError::InvalidInput(msg) | AppError::BadRequest(msg) => msg.clone(),
            _ => "Internal error while processing the file".to_string(),
        };
        self.jobs.fail_job(id, &message).await?;
        record_liquidation_job(JobStatus::Failed.as_str());
        Ok(())
    }

    pub async fn unfinished_job_ids(&self) -> Result<Vec<Uuid>> {
        self.jobs.unfinished_job_ids().await
    }

    async fn find_job(&self, id: Uuid) -> Result<LiquidationJob> {
        self.jobs
            .find_job(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Liquidation job not found".to_string()))
    }
}

pub fn check_upload_size(size: usize, max: usize) -> Result<()> {
    if size == 0 {
        return Err(AppError::BadRequest("The uploaded file is empty".to_string()));
    }
    if size > max {
        return Err(AppError::BadRequest(format!(
            "File exceeds the {} MB upload limit",
            max / (1024 * 1024)
        )));
    }
    Ok(())
}

fn tally(lines: &[NewLiquidationLine]) -> JobCounters {
    let mut counters = JobCounters::default();
    for line in lines {
        counters.processed += 1;
        match line.match_status {
            LineMatchStatus::Matched => counters.matched += 1,
            LineMatchStatus::Unmatched => counters.unmatched += 1,
            LineMatchStatus::AmountMismatch => counters.mismatched += 1,
        }
    }
    counters
}

/// Keeps the file name only, without directories or control characters.
fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .chars()
        .filter(|c| !c.is_control())
        .take(200)
        .collect::<String>();
    if name.trim().is_empty() {
        "upload".to_string()
    } else {
        name.trim().to_string()
    }
}

fn write_lines_csv(lines: &[LiquidationLine]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "row_number",
            "suborder_number",
            "match_status",
            "gross_amount",
            "commission_amount",
            "shipping_amount",
            "net_amount",
            "amount_difference",
            "settlement_date",
            "document_number",
            "order_id",
        ])
        .map_err(|e| AppError::Internal(e.into()))?;

    let amount = |v: Option<rust_decimal::Decimal>| v.map(|d| d.to_string()).unwrap_or_default();
    for line in lines {
        writer
            .write_record([
                line.row_number.to_string(),
                line.suborder_number.clone(),
                line.match_status.as_str().to_string(),
                amount(line.gross_amount),
                amount(line.commission_amount),
                amount(line.shipping_amount),
                amount(line.net_amount),
                amount(line.amount_difference),
                line.settlement_date.map(|d| d.to_string()).unwrap_or_default(),
                line.document_number.clone().unwrap_or_default(),
                line.order_id.map(|id| id.to_string()).unwrap_or_default(),
            ])
            .map_err(|e| AppError::Internal(e.into()))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CSV flush failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::liquidation::ParsedLiquidationRow;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_upload_size_limits() {
        assert!(matches!(check_upload_size(0, 10), Err(AppError::BadRequest(_))));
        assert!(matches!(check_upload_size(11, 10), Err(AppError::BadRequest(_))));
        assert!(check_upload_size(10, 10).is_ok());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("C:\\Users\\ops\\liq marzo.xlsx"), "liq marzo.xlsx");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("  "), "upload");
    }

    fn line(status: LineMatchStatus) -> NewLiquidationLine {
        NewLiquidationLine {
            row: ParsedLiquidationRow {
                row_number: 2,
                suborder_number: "1".to_string(),
                gross_amount: None,
                commission_amount: None,
                shipping_amount: None,
                net_amount: None,
                settlement_date: None,
                document_number: None,
            },
            order_id: None,
            match_status: status,
            amount_difference: None,
        }
    }

    #[test]
    fn test_tally() {
        let counters = tally(&[
            line(LineMatchStatus::Matched),
            line(LineMatchStatus::Matched),
            line(LineMatchStatus::Unmatched),
            line(LineMatchStatus::AmountMismatch),
        ]);
        assert_eq!(counters.processed, 4);
        assert_eq!(counters.matched, 2);
        assert_eq!(counters.unmatched, 1);
        assert_eq!(counters.mismatched, 1);
        assert_eq!(counters.failed, 0);
    }

    #[test]
    fn test_lines_csv() {
        let lines = vec![LiquidationLine {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            row_number: 4,
            suborder_number: "RP-1001".to_string(),
            order_id: None,
            gross_amount: Some(dec!(12990)),
            commission_amount: Some(dec!(1299)),
            shipping_amount: None,
            net_amount: Some(dec!(11691)),
            settlement_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            document_number: None,
            match_status: LineMatchStatus::Unmatched,
            amount_difference: None,
            created_at: Utc::now(),
        }];
        let csv = String::from_utf8(write_lines_csv(&lines).unwrap()).unwrap();
        let mut rows = csv.lines();
        assert!(rows.next().unwrap().starts_with("row_number,suborder_number,match_status"));
        assert_eq!(rows.next().unwrap(), "4,RP-1001,unmatched,12990,1299,,11691,,2024-03-15,,");
    }
}
