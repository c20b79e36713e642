use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::config::CompanyProfile;
use crate::middleware::error_handling::Result;
use crate::models::order::OrderWithItems;

use super::layout::{format_clp, truncate, PdfCanvas, A4, MARGIN};

pub const IVA_RATE: Decimal = dec!(0.19);

const ROW: f32 = 5.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub net: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
}

/// Marketplace prices include IVA; split a gross amount into net + tax in whole pesos.
pub fn tax_breakdown(total: Decimal) -> TaxBreakdown {
    let net = (total / (Decimal::ONE + IVA_RATE))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    TaxBreakdown {
        net,
        iva: total - net,
        total,
    }
}

/// One A4 invoice per order.
pub fn render(
    orders: &[OrderWithItems],
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) -> Result<(Vec<u8>, usize)> {
    let mut canvas = PdfCanvas::new("Invoice", A4)?;

    for (index, entry) in orders.iter().enumerate() {
        if index > 0 {
            canvas.new_page();
        }
        draw_invoice(&mut canvas, entry, company, generated_at);
    }

    canvas.finish()
}

fn draw_invoice(
    canvas: &mut PdfCanvas,
    entry: &OrderWithItems,
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) {
    let order = &entry.order;
    let right = canvas.size().width - MARGIN;

    canvas.bold(MARGIN, canvas.cursor + 4.0, 13.0, &company.name);
    canvas.text(MARGIN, canvas.cursor + 9.0, 8.0, &format!("RUT {}", company.tax_id));
    canvas.text(MARGIN, canvas.cursor + 13.0, 8.0, &company.address);

    let box_x = right - 62.0;
    canvas.frame(box_x, canvas.cursor, 62.0, 20.0);
    canvas.bold(box_x + 4.0, canvas.cursor + 6.0, 10.0, "FACTURA ELECTRONICA");
    canvas.text(
        box_x + 4.0,
        canvas.cursor + 12.0,
        9.0,
        &format!("N. {}", order.invoice_number.as_deref().unwrap_or("Pendiente")),
    );
    canvas.text(
        box_x + 4.0,
        canvas.cursor + 17.0,
        8.0,
        &generated_at.format("%d-%m-%Y").to_string(),
    );
    canvas.cursor += 28.0;

    canvas.bold(MARGIN, canvas.cursor, 9.0, "Cliente");
    canvas.text(35.0, canvas.cursor, 9.0, &order.customer_name);
    canvas.cursor += 4.5;
    if let Some(document) = &order.customer_document {
        canvas.bold(MARGIN, canvas.cursor, 9.0, "RUT");
        canvas.text(35.0, canvas.cursor, 9.0, document);
        canvas.cursor += 4.5;
    }
    canvas.bold(MARGIN, canvas.cursor, 9.0, "Direccion");
    canvas.text(35.0, canvas.cursor, 9.0, &truncate(&order.shipping_address, 80));
    canvas.cursor += 4.5;
    canvas.bold(MARGIN, canvas.cursor, 9.0, "Pedido");
    canvas.text(
        35.0,
        canvas.cursor,
        9.0,
        &format!(
            "{} #{} ({})",
            order.marketplace.display_name(),
            order.suborder_number,
            order.purchased_at.format("%d-%m-%Y")
        ),
    );
    canvas.cursor += 9.0;

    draw_table_header(canvas);
    for item in &entry.items {
        if canvas.ensure_space(ROW + 30.0) {
            draw_table_header(canvas);
        }
        let y = canvas.cursor;
        canvas.text(MARGIN, y, 8.0, &truncate(item.sku.as_deref().unwrap_or("-"), 18));
        canvas.text(45.0, y, 8.0, &truncate(&item.product_name, 52));
        canvas.text_right(140.0, y, 8.0, &item.quantity.to_string());
        canvas.text_right(165.0, y, 8.0, &format_clp(item.unit_price));
        canvas.text_right(right, y, 8.0, &format_clp(item.line_total()));
        canvas.cursor += ROW;
    }
    if order.shipping_cost > Decimal::ZERO {
        let y = canvas.cursor;
        canvas.text(45.0, y, 8.0, "Despacho");
        canvas.text_right(140.0, y, 8.0, "1");
        canvas.text_right(165.0, y, 8.0, &format_clp(order.shipping_cost));
        canvas.text_right(right, y, 8.0, &format_clp(order.shipping_cost));
        canvas.cursor += ROW;
    }

    canvas.ensure_space(26.0);
    canvas.hline(MARGIN, right, canvas.cursor - 2.0, 0.4);
    canvas.cursor += 4.0;

    let taxes = tax_breakdown(order.total_amount);
    for (label, amount) in [
        ("Neto", taxes.net),
        ("IVA 19%", taxes.iva),
        ("Total", taxes.total),
    ] {
        canvas.bold(140.0, canvas.cursor, 9.0, label);
        canvas.text_right(right, canvas.cursor, 9.0, &format_clp(amount));
        canvas.cursor += 5.0;
    }
}

fn draw_table_header(canvas: &mut PdfCanvas) {
    let right = canvas.size().width - MARGIN;
    let y = canvas.cursor;
    canvas.fill_rect(MARGIN, y - 4.0, right - MARGIN, 6.0, 0.88);
    canvas.bold(MARGIN, y, 8.0, "SKU");
    canvas.bold(45.0, y, 8.0, "Descripcion");
    canvas.bold(131.0, y, 8.0, "Cant.");
    canvas.bold(147.0, y, 8.0, "Precio");
    canvas.bold(right - 12.0, y, 8.0, "Total");
    canvas.cursor += ROW + 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::documents::test_support::{sample_company, sample_order};

    #[test]
    fn test_tax_breakdown() {
        let taxes = tax_breakdown(dec!(11900));
        assert_eq!(taxes.net, dec!(10000));
        assert_eq!(taxes.iva, dec!(1900));

        // net rounds, IVA absorbs the remainder so the parts always add up
        let taxes = tax_breakdown(dec!(15990));
        assert_eq!(taxes.net, dec!(13437));
        assert_eq!(taxes.iva, dec!(2553));
        assert_eq!(taxes.net + taxes.iva, taxes.total);
    }

    #[test]
    fn test_render_one_page_per_order() {
        let orders = vec![sample_order("1001"), sample_order("1002")];
        let (bytes, pages) = render(&orders, &sample_company(), Utc::now()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages, 2);
    }
}
