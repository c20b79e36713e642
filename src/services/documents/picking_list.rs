use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::CompanyProfile;
use crate::middleware::error_handling::Result;
use crate::models::order::{OrderItem, OrderWithItems};

use super::layout::{truncate, PdfCanvas, A4, MARGIN};

const ROW: f32 = 6.0;

/// One line of the batch: every unit of the same product across the selected orders.
#[derive(Debug, Clone, PartialEq)]
pub struct PickLine {
    pub key: String,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub product_name: String,
    pub quantity: i64,
    pub suborders: Vec<String>,
}

/// Aggregation key: SKU, falling back to EAN, then product name.
fn pick_key(item: &OrderItem) -> String {
    let non_empty = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
    };
    non_empty(&item.sku)
        .or_else(|| non_empty(&item.ean))
        .unwrap_or_else(|| item.product_name.trim().to_uppercase())
}

/// Sorted by key, so SKUs come out in warehouse order.
pub fn aggregate(orders: &[OrderWithItems]) -> Vec<PickLine> {
    let mut lines: BTreeMap<String, PickLine> = BTreeMap::new();

    for entry in orders {
        for item in &entry.items {
            let key = pick_key(item);
            let line = lines.entry(key.clone()).or_insert_with(|| PickLine {
                key,
                sku: item.sku.clone(),
                ean: item.ean.clone(),
                product_name: item.product_name.clone(),
                quantity: 0,
                suborders: Vec::new(),
            });
            line.quantity += i64::from(item.quantity);
            if !line.suborders.contains(&entry.order.suborder_number) {
                line.suborders.push(entry.order.suborder_number.clone());
            }
        }
    }

    lines.into_values().collect()
}

pub fn render(
    orders: &[OrderWithItems],
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) -> Result<(Vec<u8>, usize)> {
    let lines = aggregate(orders);
    let mut canvas = PdfCanvas::new("Picking list", A4)?;
    let right = canvas.size().width - MARGIN;

    canvas.bold(MARGIN, canvas.cursor + 4.0, 14.0, "PICKING LIST");
    canvas.text_right(right, canvas.cursor + 2.0, 8.0, &company.name);
    canvas.text_right(
        right,
        canvas.cursor + 6.0,
        8.0,
        &generated_at.format("%d-%m-%Y %H:%M").to_string(),
    );
    canvas.cursor += 12.0;
    let units: i64 = lines.iter().map(|l| l.quantity).sum();
    canvas.text(
        MARGIN,
        canvas.cursor,
        9.0,
        &format!(
            "{} pedidos, {} productos, {} unidades",
            orders.len(),
            lines.len(),
            units
        ),
    );
    canvas.cursor += 8.0;
    draw_table_header(&mut canvas);

    for line in &lines {
        let suborders = line.suborders.join(", ");
        let extra_rows = wrap(&suborders, 70).len().saturating_sub(1) as f32;
        if canvas.ensure_space(ROW * (1.0 + extra_rows)) {
            draw_table_header(&mut canvas);
        }

        let y = canvas.cursor;
        canvas.text(MARGIN, y, 8.0, &truncate(line.sku.as_deref().unwrap_or("-"), 18));
        canvas.text(45.0, y, 8.0, line.ean.as_deref().unwrap_or("-"));
        canvas.text(78.0, y, 8.0, &truncate(&line.product_name, 42));
        canvas.text_right(162.0, y, 9.0, &line.quantity.to_string());
        canvas.frame(168.0, y - 3.0, 3.5, 3.5);
        canvas.cursor += 4.0;

        for chunk in wrap(&suborders, 70) {
            canvas.text(78.0, canvas.cursor, 6.5, &chunk);
            canvas.cursor += 3.0;
        }
        canvas.hline(MARGIN, right, canvas.cursor - 1.5, 0.1);
        canvas.cursor += 2.0;
    }

    canvas.finish()
}

fn draw_table_header(canvas: &mut PdfCanvas) {
    let right = canvas.size().width - MARGIN;
    let y = canvas.cursor;
    canvas.fill_rect(MARGIN, y - 4.0, right - MARGIN, 6.0, 0.88);
    canvas.bold(MARGIN, y, 8.0, "SKU");
    canvas.bold(45.0, y, 8.0, "EAN");
    canvas.bold(78.0, y, 8.0, "Producto / pedidos");
    canvas.bold(152.0, y, 8.0, "Cant.");
    canvas.bold(167.0, y, 8.0, "OK");
    canvas.cursor += ROW + 1.0;
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();
    for word in text.split(' ') {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            rows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::documents::test_support::{sample_company, sample_item, sample_order};

    #[test]
    fn test_aggregates_by_sku_then_ean_then_name() {
        let mut first = sample_order("1001");
        first.items = vec![
            sample_item("SKU-B", "7801234567891", 2),
            sample_item("", "7809999999999", 1),
        ];
        let mut second = sample_order("1002");
        second.items = vec![sample_item("sku-b", "", 3), sample_item("", "", 1)];
        second.items[1].product_name = "Cable USB-C".to_string();

        let lines = aggregate(&[first, second]);
        let keys: Vec<&str> = lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["7809999999999", "CABLE USB-C", "SKU-B"]);

        let sku_b = &lines[2];
        assert_eq!(sku_b.quantity, 5);
        assert_eq!(sku_b.suborders, vec!["1001".to_string(), "1002".to_string()]);
    }

    #[test]
    fn test_same_order_listed_once() {
        let mut order = sample_order("1001");
        order.items = vec![sample_item("SKU-A", "", 1), sample_item("SKU-A", "", 2)];
        let lines = aggregate(&[order]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].suborders.len(), 1);
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("a, b, c", 3), vec!["a,", "b,", "c"]);
        assert_eq!(wrap("a, b, c", 4), vec!["a,", "b, c"]);
        assert!(wrap("", 10).is_empty());
    }

    #[test]
    fn test_render() {
        let (bytes, pages) =
            render(&[sample_order("1001")], &sample_company(), Utc::now()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages, 1);
    }
}
