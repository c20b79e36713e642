use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use orderdesk::config::CompanyProfile;
use orderdesk::models::document::DocumentKind;
use orderdesk::models::marketplace::Marketplace;
use orderdesk::models::order::{Carrier, Order, OrderItem, OrderStatus, OrderWithItems};
use orderdesk::services::documents::picking_list::aggregate;
use orderdesk::services::documents::render_document;

fn company() -> CompanyProfile {
    CompanyProfile {
        name: "Distribuidora Los Andes Ltda".to_string(),
        tax_id: "77.111.222-3".to_string(),
        address: "San Diego 850, Santiago".to_string(),
        phone: None,
    }
}

fn item(sku: &str, name: &str, quantity: i32) -> OrderItem {
    OrderItem {
        id: Uuid::new_v4(),
        order_id: Uuid::nil(),
        sku: Some(sku.to_string()),
        ean: None,
        alternate_codes: Vec::new(),
        product_name: name.to_string(),
        quantity,
        unit_price: dec!(9990),
        scanned_quantity: 0,
    }
}

fn order(marketplace: Marketplace, suborder: &str, carrier: Option<Carrier>, items: Vec<OrderItem>) -> OrderWithItems {
    let now = Utc::now();
    let total = items.iter().map(OrderItem::line_total).sum();
    OrderWithItems {
        order: Order {
            id: Uuid::new_v4(),
            marketplace,
            suborder_number: suborder.to_string(),
            customer_name: "Soto Muñoz, Camila".to_string(),
            customer_document: None,
            customer_phone: Some("+56 9 1111 2222".to_string()),
            customer_email: Some("camila@example.cl".to_string()),
            shipping_address: "Los Carrera 455".to_string(),
            commune: Some("Concepción".to_string()),
            region: Some("Biobío".to_string()),
            carrier,
            tracking_number: carrier.map(|_| format!("TRK{}", suborder)),
            status: OrderStatus::Packed,
            total_amount: total,
            shipping_cost: dec!(3990),
            invoice_number: Some("F-1001".to_string()),
            notes: None,
            purchased_at: now,
            dispatch_deadline: None,
            scan_verified_at: Some(now),
            created_at: now,
            updated_at: now,
        },
        items,
    }
}

fn batch() -> Vec<OrderWithItems> {
    vec![
        order(
            Marketplace::Ripley,
            "RP-1001",
            Some(Carrier::Starken),
            vec![item("TAZ-01", "Taza cerámica", 2), item("PLT-07", "Plato hondo", 4)],
        ),
        order(
            Marketplace::Paris,
            "PA-2002",
            Some(Carrier::Starken),
            vec![item("TAZ-01", "Taza cerámica", 1)],
        ),
        order(Marketplace::WooCommerce, "1043", None, vec![item("MNT-3", "Mantel", 1)]),
    ]
}

#[test]
fn every_document_kind_renders_a_pdf() {
    let at = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap();
    let orders = batch();

    for kind in [
        DocumentKind::Labels,
        DocumentKind::PackingList,
        DocumentKind::PickingList,
        DocumentKind::Invoice,
        DocumentKind::Manifest,
    ] {
        let document = render_document(kind, &orders, None, &company(), at)
            .unwrap_or_else(|e| panic!("{} failed: {}", kind.as_str(), e));
        assert!(document.bytes.starts_with(b"%PDF"), "{}", kind.as_str());
        assert!(document.pages >= 1);
        assert_eq!(document.filename, format!("{}-20240315-093000.pdf", kind.as_str()));
    }
}

#[test]
fn labels_and_invoices_have_one_page_per_order() {
    let at = Utc::now();
    let orders = batch();
    let labels = render_document(DocumentKind::Labels, &orders, None, &company(), at).unwrap();
    assert_eq!(labels.pages, 3);
    let invoices = render_document(DocumentKind::Invoice, &orders, None, &company(), at).unwrap();
    assert_eq!(invoices.pages, 3);
}

#[test]
fn picking_list_totals_units_across_orders() {
    let lines = aggregate(&batch());
    let cups = lines.iter().find(|l| l.sku.as_deref() == Some("TAZ-01")).unwrap();
    assert_eq!(cups.quantity, 3);
    assert_eq!(cups.suborders, vec!["RP-1001".to_string(), "PA-2002".to_string()]);
    assert_eq!(lines.len(), 3);
}

#[test]
fn manifest_rejects_orders_of_another_carrier() {
    let orders = batch();
    let result = render_document(
        DocumentKind::Manifest,
        &orders,
        Some(Carrier::Chilexpress),
        &company(),
        Utc::now(),
    );
    let message = result.unwrap_err().to_string();
    assert!(message.contains("RP-1001"));
    assert!(message.contains("PA-2002"));

    let mut mixed = batch();
    mixed[1].order.carrier = Some(Carrier::BlueExpress);
    assert!(render_document(DocumentKind::Manifest, &mixed, None, &company(), Utc::now()).is_err());
}
