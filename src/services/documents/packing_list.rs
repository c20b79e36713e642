use chrono::{DateTime, Utc};

use crate::config::CompanyProfile;
use crate::middleware::error_handling::Result;
use crate::models::order::OrderWithItems;

use super::layout::{format_clp, truncate, PdfCanvas, A4, MARGIN};

const ROW: f32 = 5.5;
const COL_SKU: f32 = MARGIN;
const COL_EAN: f32 = 48.0;
const COL_PRODUCT: f32 = 82.0;
const COL_QTY_RIGHT: f32 = 172.0;
const COL_CHECK: f32 = 180.0;

/// A4 document, one section per order; sections never share a page.
pub fn render(
    orders: &[OrderWithItems],
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) -> Result<(Vec<u8>, usize)> {
    let mut canvas = PdfCanvas::new("Packing list", A4)?;

    for (index, entry) in orders.iter().enumerate() {
        if index > 0 {
            canvas.new_page();
        }
        draw_section(&mut canvas, entry, company, generated_at);
    }

    canvas.finish()
}

fn draw_section(
    canvas: &mut PdfCanvas,
    entry: &OrderWithItems,
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) {
    let order = &entry.order;
    let right = canvas.size().width - MARGIN;

    draw_header(canvas, entry, company, generated_at);

    canvas.text(MARGIN, canvas.cursor, 9.0, &format!("Cliente: {}", order.customer_name));
    canvas.cursor += 4.5;
    canvas.text(
        MARGIN,
        canvas.cursor,
        9.0,
        &truncate(&format!("Direccion: {}", order.shipping_address), 95),
    );
    canvas.cursor += 4.5;
    if let Some(commune) = &order.commune {
        canvas.text(MARGIN, canvas.cursor, 9.0, &format!("Comuna: {}", commune));
        canvas.cursor += 4.5;
    }
    let carrier = order.carrier.map(|c| c.display_name()).unwrap_or("-");
    let tracking = order.tracking_number.as_deref().unwrap_or("-");
    canvas.text(
        MARGIN,
        canvas.cursor,
        9.0,
        &format!("Transportista: {}   Tracking: {}", carrier, tracking),
    );
    canvas.cursor += 7.0;

    draw_table_header(canvas);

    for item in &entry.items {
        if canvas.ensure_space(ROW + 12.0) {
            draw_continuation(canvas, entry);
            draw_table_header(canvas);
        }
        let y = canvas.cursor;
        canvas.text(COL_SKU, y, 8.0, &truncate(item.sku.as_deref().unwrap_or("-"), 20));
        canvas.text(COL_EAN, y, 8.0, item.ean.as_deref().unwrap_or("-"));
        canvas.text(COL_PRODUCT, y, 8.0, &truncate(&item.product_name, 48));
        canvas.text_right(COL_QTY_RIGHT, y, 8.0, &item.quantity.to_string());
        canvas.frame(COL_CHECK, y - 3.0, 3.5, 3.5);
        canvas.cursor += ROW;
    }

    canvas.ensure_space(16.0);
    canvas.hline(MARGIN, right, canvas.cursor - 2.0, 0.4);
    canvas.cursor += 3.0;
    canvas.bold(
        MARGIN,
        canvas.cursor,
        9.0,
        &format!(
            "{} productos / {} unidades",
            entry.items.len(),
            entry.total_units()
        ),
    );
    canvas.text_right(
        right,
        canvas.cursor,
        9.0,
        &format!("Total pedido {}", format_clp(order.total_amount)),
    );
    canvas.cursor += 10.0;
    canvas.text(MARGIN, canvas.cursor, 8.0, "Preparado por: ____________________");
    canvas.text(110.0, canvas.cursor, 8.0, "Revisado por: ____________________");
    canvas.cursor += 8.0;
}

fn draw_header(
    canvas: &mut PdfCanvas,
    entry: &OrderWithItems,
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) {
    let right = canvas.size().width - MARGIN;
    canvas.bold(MARGIN, canvas.cursor + 4.0, 14.0, "PACKING LIST");
    canvas.text_right(right, canvas.cursor + 2.0, 8.0, &company.name);
    canvas.text_right(
        right,
        canvas.cursor + 6.0,
        8.0,
        &generated_at.format("%d-%m-%Y %H:%M").to_string(),
    );
    canvas.cursor += 12.0;
    canvas.bold(
        MARGIN,
        canvas.cursor,
        11.0,
        &format!(
            "{} #{}",
            entry.order.marketplace.display_name(),
            entry.order.suborder_number
        ),
    );
    canvas.cursor += 6.0;
}

fn draw_continuation(canvas: &mut PdfCanvas, entry: &OrderWithItems) {
    canvas.bold(
        MARGIN,
        canvas.cursor + 2.0,
        10.0,
        &format!("#{} (continuacion)", entry.order.suborder_number),
    );
    canvas.cursor += 8.0;
}

fn draw_table_header(canvas: &mut PdfCanvas) {
    let right = canvas.size().width - MARGIN;
    let y = canvas.cursor;
    canvas.fill_rect(MARGIN, y - 4.0, right - MARGIN, 6.0, 0.88);
    canvas.bold(COL_SKU, y, 8.0, "SKU");
    canvas.bold(COL_EAN, y, 8.0, "EAN");
    canvas.bold(COL_PRODUCT, y, 8.0, "Producto");
    canvas.bold(COL_QTY_RIGHT - 6.0, y, 8.0, "Cant.");
    canvas.bold(COL_CHECK - 1.0, y, 8.0, "OK");
    canvas.cursor += ROW + 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::documents::test_support::{sample_company, sample_item, sample_order};

    #[test]
    fn test_one_section_per_order() {
        let orders = vec![sample_order("2000004567"), sample_order("2000004568")];
        let (bytes, pages) = render(&orders, &sample_company(), Utc::now()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages, 2);
    }

    #[test]
    fn test_long_orders_continue_on_new_page() {
        let mut order = sample_order("2000004567");
        order.items = (0..80)
            .map(|i| sample_item(&format!("SKU-{}", i), "7801234567891", 1))
            .collect();
        let (_, pages) = render(&[order], &sample_company(), Utc::now()).unwrap();
        assert!(pages >= 2);
    }
}
