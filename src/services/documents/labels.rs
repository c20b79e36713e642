use crate::config::CompanyProfile;
use crate::middleware::error_handling::Result;
use crate::models::order::OrderWithItems;

use super::barcode::is_code128_encodable;
use super::layout::{truncate, PdfCanvas, LABEL_100X150};

const PAD: f32 = 5.0;

/// Value printed under the Code128 bars: tracking when the carrier assigned one,
/// otherwise the suborder. `None` when neither can be encoded.
pub fn label_barcode_value(order: &OrderWithItems) -> Option<&str> {
    order
        .order
        .tracking_number
        .as_deref()
        .into_iter()
        .chain(std::iter::once(order.order.suborder_number.as_str()))
        .map(str::trim)
        .find(|value| is_code128_encodable(value))
}

pub fn label_qr_payload(order: &OrderWithItems) -> String {
    format!(
        "{}:{}",
        order.order.marketplace.slug(),
        order.order.suborder_number
    )
}

/// One 100x150 mm page per order.
pub fn render(orders: &[OrderWithItems], company: &CompanyProfile) -> Result<(Vec<u8>, usize)> {
    let mut canvas = PdfCanvas::new("Shipping labels", LABEL_100X150)?;

    for (index, order) in orders.iter().enumerate() {
        if index > 0 {
            canvas.new_page();
        }
        draw_label(&canvas, order, company)?;
    }

    canvas.finish()
}

fn draw_label(canvas: &PdfCanvas, entry: &OrderWithItems, company: &CompanyProfile) -> Result<()> {
    let order = &entry.order;
    let width = canvas.size().width;
    let inner = width - 2.0 * PAD;

    canvas.frame(PAD - 2.0, PAD - 2.0, inner + 4.0, canvas.size().height - 2.0 * PAD + 4.0);

    // Sender
    canvas.bold(PAD, 9.0, 7.0, "REMITENTE");
    canvas.text(PAD, 13.0, 8.0, &truncate(&company.name, 40));
    canvas.text(PAD, 17.0, 7.0, &format!("RUT {}", company.tax_id));
    canvas.text(PAD, 21.0, 7.0, &truncate(&company.address, 48));
    if let Some(phone) = &company.phone {
        canvas.text(PAD, 25.0, 7.0, &format!("Tel. {}", phone));
    }
    canvas.hline(PAD, width - PAD, 28.0, 0.3);

    // Recipient
    canvas.bold(PAD, 34.0, 7.0, "DESTINATARIO");
    canvas.bold(PAD, 40.0, 11.0, &truncate(&order.customer_name, 30));
    canvas.text(PAD, 46.0, 8.0, &truncate(&order.shipping_address, 48));
    let locality = match (&order.commune, &order.region) {
        (Some(c), Some(r)) => format!("{}, {}", c, r),
        (Some(c), None) => c.clone(),
        (None, Some(r)) => r.clone(),
        (None, None) => String::new(),
    };
    canvas.bold(PAD, 51.0, 9.0, &truncate(&locality, 40));
    if let Some(phone) = &order.customer_phone {
        canvas.text(PAD, 56.0, 8.0, &format!("Tel. {}", phone));
    }
    canvas.hline(PAD, width - PAD, 60.0, 0.3);

    // Order
    canvas.text(PAD, 66.0, 8.0, order.marketplace.display_name());
    canvas.bold(PAD, 72.0, 12.0, &format!("#{}", order.suborder_number));
    let carrier = order
        .carrier
        .map(|c| c.display_name())
        .unwrap_or("Sin transportista");
    canvas.text(PAD, 78.0, 8.0, carrier);
    if let Some(tracking) = &order.tracking_number {
        canvas.text(PAD, 82.0, 8.0, &format!("Tracking {}", tracking));
    }
    canvas.text(
        PAD,
        86.0,
        8.0,
        &format!(
            "{} items / {} unidades",
            entry.items.len(),
            entry.total_units()
        ),
    );

    let qr_side = 26.0;
    canvas.qr(width - PAD - qr_side, 62.0, qr_side, &label_qr_payload(entry))?;
    canvas.hline(PAD, width - PAD, 92.0, 0.3);

    match label_barcode_value(entry) {
        Some(code) => {
            canvas.code128(PAD + 2.0, 98.0, inner - 4.0, 28.0, code)?;
            canvas.text(PAD + 2.0, 132.0, 9.0, code);
        }
        None => {
            tracing::warn!("Order {} has no barcode-safe identifier for its label", order.id);
            canvas.frame(PAD + 2.0, 98.0, inner - 4.0, 28.0);
            canvas.bold(PAD + 6.0, 113.0, 9.0, "Sin codigo de barras: usar QR");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::documents::test_support::{sample_company, sample_order};

    #[test]
    fn test_barcode_prefers_tracking() {
        let mut order = sample_order("2000004567");
        assert_eq!(label_barcode_value(&order), Some("2000004567"));
        order.order.tracking_number = Some("  ".to_string());
        assert_eq!(label_barcode_value(&order), Some("2000004567"));
        order.order.tracking_number = Some("CX99887766".to_string());
        assert_eq!(label_barcode_value(&order), Some("CX99887766"));
    }

    #[test]
    fn test_unprintable_tracking_falls_back_to_suborder() {
        let mut order = sample_order("2000004567");
        order.order.tracking_number = Some("CHX-Ñ123".to_string());
        assert_eq!(label_barcode_value(&order), Some("2000004567"));

        order.order.suborder_number = "Pedido-Ñ1".to_string();
        assert_eq!(label_barcode_value(&order), None);
    }

    #[test]
    fn test_one_bad_identifier_does_not_fail_the_batch() {
        let mut odd = sample_order("Pedido-Ñ1");
        odd.order.tracking_number = Some("CHX-Ñ123".to_string());
        let orders = vec![odd, sample_order("A-2")];
        let (bytes, pages) = render(&orders, &sample_company()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages, 2);
    }

    #[test]
    fn test_qr_payload() {
        let order = sample_order("2000004567");
        assert_eq!(label_qr_payload(&order), "mercado_libre:2000004567");
    }

    #[test]
    fn test_one_page_per_order() {
        let orders = vec![sample_order("A-1"), sample_order("A-2"), sample_order("A-3")];
        let (bytes, pages) = render(&orders, &sample_company()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages, 3);
    }
}
