use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    handlers::orders::csv_response,
    middleware::{error_handling::{AppError, Result}, Claims},
    models::{
        liquidation::{JobFilter, LineFilter, LiquidationJobResponse, LiquidationLine},
        marketplace::Marketplace,
        Paginated, Pagination,
    },
    services::{LiquidationQueue, LiquidationService},
    utils::log_sanitizer::sanitize_for_log,
};

/// POST /api/liquidations (multipart: `marketplace`, `file`)
///
/// Returns 202 with the queued job; poll GET /api/liquidations/:id for progress.
pub async fn upload_liquidation(
    Extension(claims): Extension<Claims>,
    Extension(service): Extension<Arc<LiquidationService>>,
    Extension(queue): Extension<LiquidationQueue>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<LiquidationJobResponse>)> {
    let mut marketplace: Option<Marketplace> = None;
    let mut file_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart data: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "marketplace" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Invalid marketplace field: {}", e)))?;
                marketplace = Some(
                    value
                        .parse()
                        .map_err(|_| AppError::BadRequest("Unknown marketplace".to_string()))?,
                );
            }
            "file" => {
                filename = field.file_name().map(str::to_string);
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::InvalidInput(format!("Failed to read file: {}", e)))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let marketplace =
        marketplace.ok_or_else(|| AppError::InvalidInput("No marketplace provided".to_string()))?;
    let file_data = file_data.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;
    let filename = filename.ok_or_else(|| AppError::InvalidInput("No filename provided".to_string()))?;

    tracing::info!(
        "Liquidation upload by {}: {} ({} bytes)",
        claims.user_id,
        sanitize_for_log(&filename),
        file_data.len()
    );

    let job = service
        .upload(marketplace, &filename, &file_data, claims.user_id, &queue)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/liquidations
pub async fn list_liquidations(
    Extension(service): Extension<Arc<LiquidationService>>,
    Query(filter): Query<JobFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<LiquidationJobResponse>>> {
    Ok(Json(service.list_jobs(&filter, &pagination).await?))
}

/// GET /api/liquidations/:id
pub async fn get_liquidation(
    Extension(service): Extension<Arc<LiquidationService>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<LiquidationJobResponse>> {
    Ok(Json(service.get_job(job_id).await?))
}

/// GET /api/liquidations/:id/lines?match_status=unmatched
pub async fn liquidation_lines(
    Extension(service): Extension<Arc<LiquidationService>>,
    Path(job_id): Path<Uuid>,
    Query(filter): Query<LineFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<LiquidationLine>>> {
    Ok(Json(service.job_lines(job_id, &filter, &pagination).await?))
}

/// GET /api/liquidations/:id/export.csv
pub async fn export_liquidation(
    Extension(service): Extension<Arc<LiquidationService>>,
    Path(job_id): Path<Uuid>,
    Query(filter): Query<LineFilter>,
) -> Result<Response> {
    let (filename, csv) = service.export_job_csv(job_id, &filter).await?;
    Ok(csv_response(filename, csv))
}
