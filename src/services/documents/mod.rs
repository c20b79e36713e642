//! Printable documents for the dispatch floor: labels, packing and picking
//! lists, invoices and carrier manifests.

pub mod barcode;
pub mod invoice;
pub mod labels;
pub mod layout;
pub mod manifest;
pub mod packing_list;
pub mod picking_list;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::CompanyProfile;
use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::metrics::record_document;
use crate::models::document::{DocumentKind, DocumentRequest, RenderedDocument, MAX_DOCUMENT_ORDERS};
use crate::models::order::{Carrier, OrderWithItems};
use crate::repositories::OrderRepository;

pub struct DocumentService {
    orders: OrderRepository,
    company: CompanyProfile,
}

impl DocumentService {
    pub fn new(pool: PgPool, company: CompanyProfile) -> Self {
        Self {
            orders: OrderRepository::new(pool),
            company,
        }
    }

    pub async fn generate(&self, kind: DocumentKind, request: DocumentRequest) -> Result<RenderedDocument> {
        check_order_ids(&request.order_ids)?;

        let (orders, missing) = self.orders.find_many_with_items(&request.order_ids).await?;
        if !missing.is_empty() {
            let ids: Vec<String> = missing.iter().map(Uuid::to_string).collect();
            return Err(AppError::NotFound(format!("Orders not found: {}", ids.join(", "))));
        }

        let company = self.company.clone();
        let carrier = request.carrier;
        let document = tokio::task::spawn_blocking(move || {
            render_document(kind, &orders, carrier, &company, Utc::now())
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("document task failed: {}", e)))??;

        record_document(kind.as_str());
        tracing::info!(
            "Rendered {} for {} orders ({} pages, {} bytes)",
            kind.as_str(),
            request.order_ids.len(),
            document.pages,
            document.bytes.len()
        );
        Ok(document)
    }
}

pub fn check_order_ids(ids: &[Uuid]) -> Result<()> {
    if ids.is_empty() {
        return Err(AppError::BadRequest("Select at least one order".to_string()));
    }
    if ids.len() > MAX_DOCUMENT_ORDERS {
        return Err(AppError::BadRequest(format!(
            "At most {} orders per document",
            MAX_DOCUMENT_ORDERS
        )));
    }
    Ok(())
}

pub fn document_filename(kind: DocumentKind, at: DateTime<Utc>) -> String {
    format!("{}-{}.pdf", kind.as_str(), at.format("%Y%m%d-%H%M%S"))
}

/// Renders already loaded orders; no database access.
pub fn render_document(
    kind: DocumentKind,
    orders: &[OrderWithItems],
    carrier: Option<Carrier>,
    company: &CompanyProfile,
    at: DateTime<Utc>,
) -> Result<RenderedDocument> {
    let (bytes, pages) = match kind {
        DocumentKind::Labels => labels::render(orders, company)?,
        DocumentKind::PackingList => packing_list::render(orders, company, at)?,
        DocumentKind::PickingList => picking_list::render(orders, company, at)?,
        DocumentKind::Invoice => invoice::render(orders, company, at)?,
        DocumentKind::Manifest => manifest::render(orders, carrier, company, at)?,
    };

    Ok(RenderedDocument {
        kind,
        filename: document_filename(kind, at),
        bytes,
        pages,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::config::CompanyProfile;
    use crate::models::marketplace::Marketplace;
    use crate::models::order::{Order, OrderItem, OrderStatus, OrderWithItems};

    pub fn sample_company() -> CompanyProfile {
        CompanyProfile {
            name: "Comercial Andes SpA".to_string(),
            tax_id: "76.543.210-K".to_string(),
            address: "Av. Providencia 1234, Providencia".to_string(),
            phone: Some("+56 2 2345 6789".to_string()),
        }
    }

    pub fn sample_item(sku: &str, ean: &str, quantity: i32) -> OrderItem {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            sku: opt(sku),
            ean: opt(ean),
            alternate_codes: Vec::new(),
            product_name: "Audífonos Bluetooth Ñandú".to_string(),
            quantity,
            unit_price: dec!(15990),
            scanned_quantity: 0,
        }
    }

    pub fn sample_order(suborder: &str) -> OrderWithItems {
        let now = Utc::now();
        OrderWithItems {
            order: Order {
                id: Uuid::new_v4(),
                marketplace: Marketplace::MercadoLibre,
                suborder_number: suborder.to_string(),
                customer_name: "Pérez, Juan".to_string(),
                customer_document: Some("12.345.678-5".to_string()),
                customer_phone: Some("+56 9 8765 4321".to_string()),
                customer_email: None,
                shipping_address: "Irarrázaval 2401, depto 1203".to_string(),
                commune: Some("Ñuñoa".to_string()),
                region: Some("Región Metropolitana".to_string()),
                carrier: None,
                tracking_number: None,
                status: OrderStatus::Processing,
                total_amount: dec!(31980),
                shipping_cost: dec!(0),
                invoice_number: None,
                notes: None,
                purchased_at: now,
                dispatch_deadline: None,
                scan_verified_at: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![sample_item("AUD-BT-01", "7801234567891", 2)],
        }
    }
}
