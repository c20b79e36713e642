use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::marketplace::Marketplace;
use super::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(ParseEnumError::new("job status", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineMatchStatus {
    Matched,
    Unmatched,
    AmountMismatch,
}

impl LineMatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineMatchStatus::Matched => "matched",
            LineMatchStatus::Unmatched => "unmatched",
            LineMatchStatus::AmountMismatch => "amount_mismatch",
        }
    }
}

impl std::str::FromStr for LineMatchStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched" => Ok(LineMatchStatus::Matched),
            "unmatched" => Ok(LineMatchStatus::Unmatched),
            "amount_mismatch" => Ok(LineMatchStatus::AmountMismatch),
            _ => Err(ParseEnumError::new("match status", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationJob {
    pub id: Uuid,
    pub marketplace: Marketplace,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_hash: String,
    pub status: JobStatus,
    pub rows_total: i32,
    pub rows_processed: i32,
    pub rows_matched: i32,
    pub rows_unmatched: i32,
    pub rows_mismatched: i32,
    pub rows_failed: i32,
    pub error_message: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LiquidationJob {
    /// 0-100, for progress bars while the worker runs.
    pub fn progress_percent(&self) -> u8 {
        if self.status == JobStatus::Completed {
            return 100;
        }
        if self.rows_total <= 0 {
            return 0;
        }
        let pct = (self.rows_processed as f64 / self.rows_total as f64 * 100.0).floor();
        pct.clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationJobResponse {
    #[serde(flatten)]
    pub job: LiquidationJob,
    pub progress_percent: u8,
}

impl From<LiquidationJob> for LiquidationJobResponse {
    fn from(job: LiquidationJob) -> Self {
        let progress_percent = job.progress_percent();
        Self { job, progress_percent }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationLine {
    pub id: Uuid,
    pub job_id: Uuid,
    pub row_number: i32,
    pub suborder_number: String,
    pub order_id: Option<Uuid>,
    pub gross_amount: Option<Decimal>,
    pub commission_amount: Option<Decimal>,
    pub shipping_amount: Option<Decimal>,
    pub net_amount: Option<Decimal>,
    pub settlement_date: Option<NaiveDate>,
    pub document_number: Option<String>,
    pub match_status: LineMatchStatus,
    pub amount_difference: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// One parsed row of a settlement file, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLiquidationRow {
    pub row_number: i32,
    pub suborder_number: String,
    pub gross_amount: Option<Decimal>,
    pub commission_amount: Option<Decimal>,
    pub shipping_amount: Option<Decimal>,
    pub net_amount: Option<Decimal>,
    pub settlement_date: Option<NaiveDate>,
    pub document_number: Option<String>,
}

/// Row ready to be inserted, with its reconciliation result.
#[derive(Debug, Clone)]
pub struct NewLiquidationLine {
    pub row: ParsedLiquidationRow,
    pub order_id: Option<Uuid>,
    pub match_status: LineMatchStatus,
    pub amount_difference: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LineFilter {
    pub match_status: Option<LineMatchStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobFilter {
    pub marketplace: Option<Marketplace>,
    pub status: Option<JobStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, total: i32, processed: i32) -> LiquidationJob {
        LiquidationJob {
            id: Uuid::new_v4(),
            marketplace: Marketplace::Falabella,
            original_filename: "liq.xlsx".to_string(),
            file_path: "/tmp/liq.xlsx".to_string(),
            file_hash: "abc".to_string(),
            status,
            rows_total: total,
            rows_processed: processed,
            rows_matched: 0,
            rows_unmatched: 0,
            rows_mismatched: 0,
            rows_failed: 0,
            error_message: None,
            uploaded_by: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(job(JobStatus::Queued, 0, 0).progress_percent(), 0);
        assert_eq!(job(JobStatus::Processing, 300, 100).progress_percent(), 33);
        assert_eq!(job(JobStatus::Completed, 0, 0).progress_percent(), 100);
    }

    #[test]
    fn test_file_path_not_serialized() {
        let value = serde_json::to_value(job(JobStatus::Queued, 0, 0)).unwrap();
        assert!(value.get("file_path").is_none());
        assert_eq!(value["status"], "queued");
    }
}
