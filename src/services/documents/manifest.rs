use chrono::{DateTime, Utc};

use crate::config::CompanyProfile;
use crate::middleware::error_handling::{AppError, Result};
use crate::models::order::{Carrier, OrderWithItems};

use super::layout::{truncate, PdfCanvas, A4, MARGIN};

const ROW: f32 = 6.0;

/// Carrier the manifest is issued for.
///
/// With an explicit carrier, orders assigned to another carrier are rejected.
/// Without one, every order that has a carrier must share it. Orders with no
/// carrier assigned yet ride along in both cases.
pub fn resolve_carrier(orders: &[OrderWithItems], requested: Option<Carrier>) -> Result<Option<Carrier>> {
    match requested {
        Some(carrier) => {
            let foreign: Vec<&str> = orders
                .iter()
                .filter(|o| o.order.carrier.is_some_and(|c| c != carrier))
                .map(|o| o.order.suborder_number.as_str())
                .collect();
            if !foreign.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Orders assigned to another carrier than {}: {}",
                    carrier.display_name(),
                    foreign.join(", ")
                )));
            }
            Ok(Some(carrier))
        }
        None => {
            let mut found: Option<Carrier> = None;
            for entry in orders {
                match (found, entry.order.carrier) {
                    (None, Some(c)) => found = Some(c),
                    (Some(a), Some(b)) if a != b => {
                        return Err(AppError::BadRequest(
                            "Orders belong to different carriers; choose one carrier for the manifest"
                                .to_string(),
                        ))
                    }
                    _ => {}
                }
            }
            Ok(found)
        }
    }
}

pub fn render(
    orders: &[OrderWithItems],
    carrier: Option<Carrier>,
    company: &CompanyProfile,
    generated_at: DateTime<Utc>,
) -> Result<(Vec<u8>, usize)> {
    let carrier = resolve_carrier(orders, carrier)?;
    let mut canvas = PdfCanvas::new("Dispatch manifest", A4)?;
    let right = canvas.size().width - MARGIN;
    let carrier_name = carrier.map(|c| c.display_name()).unwrap_or("Sin transportista");

    canvas.bold(MARGIN, canvas.cursor + 4.0, 14.0, "MANIFIESTO DE DESPACHO");
    canvas.text_right(right, canvas.cursor + 2.0, 8.0, &company.name);
    canvas.text_right(right, canvas.cursor + 6.0, 8.0, &format!("RUT {}", company.tax_id));
    canvas.cursor += 12.0;
    canvas.bold(MARGIN, canvas.cursor, 10.0, &format!("Transportista: {}", carrier_name));
    canvas.text_right(
        right,
        canvas.cursor,
        9.0,
        &generated_at.format("%d-%m-%Y %H:%M").to_string(),
    );
    canvas.cursor += 8.0;
    draw_table_header(&mut canvas);

    let mut units = 0i64;
    for (index, entry) in orders.iter().enumerate() {
        if canvas.ensure_space(ROW + 40.0) {
            draw_table_header(&mut canvas);
        }
        let order = &entry.order;
        let y = canvas.cursor;
        let order_units = entry.total_units();
        units += i64::from(order_units);

        canvas.text(MARGIN, y, 8.0, &(index + 1).to_string());
        canvas.text(20.0, y, 8.0, &truncate(&order.suborder_number, 18));
        canvas.text(55.0, y, 8.0, &truncate(&order.customer_name, 26));
        canvas.text(105.0, y, 8.0, &truncate(order.commune.as_deref().unwrap_or("-"), 18));
        canvas.text(140.0, y, 8.0, &truncate(order.tracking_number.as_deref().unwrap_or("-"), 20));
        canvas.text_right(right, y, 8.0, &order_units.to_string());
        canvas.hline(MARGIN, right, y + 1.8, 0.1);
        canvas.cursor += ROW;
    }

    canvas.ensure_space(40.0);
    canvas.cursor += 2.0;
    canvas.bold(
        MARGIN,
        canvas.cursor,
        10.0,
        &format!("Total: {} pedidos / {} unidades", orders.len(), units),
    );
    canvas.cursor += 24.0;

    let y = canvas.cursor;
    canvas.hline(MARGIN, MARGIN + 70.0, y, 0.3);
    canvas.hline(right - 70.0, right, y, 0.3);
    canvas.text(MARGIN, y + 4.0, 8.0, "Entrega (nombre y firma)");
    canvas.text(right - 70.0, y + 4.0, 8.0, "Recibe transportista (nombre, RUT y firma)");
    canvas.cursor += 10.0;

    canvas.finish()
}

fn draw_table_header(canvas: &mut PdfCanvas) {
    let right = canvas.size().width - MARGIN;
    let y = canvas.cursor;
    canvas.fill_rect(MARGIN, y - 4.0, right - MARGIN, 6.0, 0.88);
    canvas.bold(MARGIN, y, 8.0, "#");
    canvas.bold(20.0, y, 8.0, "Pedido");
    canvas.bold(55.0, y, 8.0, "Destinatario");
    canvas.bold(105.0, y, 8.0, "Comuna");
    canvas.bold(140.0, y, 8.0, "Tracking");
    canvas.bold(right - 10.0, y, 8.0, "Unid.");
    canvas.cursor += ROW + 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::documents::test_support::{sample_company, sample_order};

    fn with_carrier(suborder: &str, carrier: Option<Carrier>) -> OrderWithItems {
        let mut order = sample_order(suborder);
        order.order.carrier = carrier;
        order
    }

    #[test]
    fn test_mixed_carriers_rejected_without_explicit_carrier() {
        let orders = vec![
            with_carrier("1", Some(Carrier::Starken)),
            with_carrier("2", Some(Carrier::Chilexpress)),
        ];
        assert!(matches!(resolve_carrier(&orders, None), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_explicit_carrier_rejects_foreign_orders() {
        let orders = vec![
            with_carrier("1", Some(Carrier::Starken)),
            with_carrier("2", Some(Carrier::Chilexpress)),
        ];
        match resolve_carrier(&orders, Some(Carrier::Starken)) {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains('2')),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unassigned_orders_ride_along() {
        let orders = vec![
            with_carrier("1", Some(Carrier::Starken)),
            with_carrier("2", None),
        ];
        assert_eq!(resolve_carrier(&orders, None).unwrap(), Some(Carrier::Starken));
        assert_eq!(
            resolve_carrier(&orders, Some(Carrier::Starken)).unwrap(),
            Some(Carrier::Starken)
        );
        assert_eq!(resolve_carrier(&[with_carrier("3", None)], None).unwrap(), None);
    }

    #[test]
    fn test_render() {
        let orders = vec![with_carrier("1", Some(Carrier::BlueExpress))];
        let (bytes, pages) = render(&orders, None, &sample_company(), Utc::now()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages, 1);
    }
}
