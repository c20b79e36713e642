use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    config::AppConfig,
    middleware::error_handling::{AppError, Result},
    models::document::{BarcodeFormat, BarcodeQuery, DocumentKind, DocumentRequest},
    services::documents::{barcode, DocumentService},
};

const MAX_BARCODE_VALUE: usize = 256;

/// POST /api/documents/:kind
///
/// `kind` is one of labels, packing-list, picking-list, invoice, manifest.
pub async fn generate_document(
    State(config): State<AppConfig>,
    Path(kind): Path<String>,
    Json(request): Json<DocumentRequest>,
) -> Result<Response> {
    let kind: DocumentKind = kind
        .parse()
        .map_err(|e: crate::models::ParseEnumError| AppError::BadRequest(e.to_string()))?;

    let document = DocumentService::new(config.database_pool.clone(), config.company.clone())
        .generate(kind, request)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
        ],
        document.bytes,
    )
        .into_response())
}

/// GET /api/barcodes?value=...&format=code128|qr
pub async fn barcode_png(Query(query): Query<BarcodeQuery>) -> Result<Response> {
    let value = query.value.trim();
    if value.is_empty() || value.chars().count() > MAX_BARCODE_VALUE {
        return Err(AppError::BadRequest(format!(
            "Barcode value must be 1 to {} characters",
            MAX_BARCODE_VALUE
        )));
    }

    let value = value.to_string();
    let format = query.format;
    let png = tokio::task::spawn_blocking(move || match format {
        BarcodeFormat::Code128 => barcode::code128_png(&value, 2, 80),
        BarcodeFormat::Qr => barcode::qr_png(&value, 6),
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("barcode task failed: {}", e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        png,
    )
        .into_response())
}

/// GET /api/documents/kinds
pub async fn list_document_kinds() -> Json<Vec<serde_json::Value>> {
    let kinds = [
        DocumentKind::Labels,
        DocumentKind::PackingList,
        DocumentKind::PickingList,
        DocumentKind::Invoice,
        DocumentKind::Manifest,
    ];
    Json(
        kinds
            .iter()
            .map(|k| serde_json::json!({ "kind": k.as_str(), "title": k.title() }))
            .collect(),
    )
}
