//! Service flows against a real Postgres. Each test gets a fresh database
//! with the migrations applied; run with `cargo test -- --ignored` and
//! `DATABASE_URL` pointing at a server the tests may create databases on.

use std::collections::HashMap;

use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use orderdesk::config::ScanSettings;
use orderdesk::middleware::error_handling::AppError;
use orderdesk::models::liquidation::{JobStatus, LineFilter, LineMatchStatus};
use orderdesk::models::marketplace::Marketplace;
use orderdesk::models::order::{
    BulkCarrierRequest, BulkItemOutcome, BulkStatusRequest, Carrier, CreateOrderItemRequest,
    CreateOrderRequest, OrderStatus, OrderWithItems, UpdateOrderRequest,
};
use orderdesk::models::scan::ScanItemRequest;
use orderdesk::models::user::UserRole;
use orderdesk::models::Pagination;
use orderdesk::repositories::{LiquidationRepository, OrderRepository, UserRepository};
use orderdesk::services::{LiquidationQueue, LiquidationService, OrderService, ScanService};
use orderdesk::utils::FileStorage;

fn item(sku: &str, ean: &str, quantity: i32) -> CreateOrderItemRequest {
    CreateOrderItemRequest {
        sku: Some(sku.to_string()),
        ean: Some(ean.to_string()),
        alternate_codes: Vec::new(),
        product_name: format!("Producto {}", sku),
        quantity,
        unit_price: dec!(12990),
    }
}

fn order_request(marketplace: Marketplace, suborder: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        marketplace,
        suborder_number: suborder.to_string(),
        customer_name: "María Pérez".to_string(),
        customer_document: None,
        customer_phone: None,
        customer_email: None,
        shipping_address: "Av. Providencia 1234".to_string(),
        commune: Some("Providencia".to_string()),
        region: None,
        carrier: None,
        tracking_number: None,
        total_amount: None,
        shipping_cost: dec!(0),
        invoice_number: None,
        notes: None,
        purchased_at: None,
        dispatch_deadline: None,
        items: vec![item("LAMP-01", "7801234567890", 2)],
    }
}

async fn create_order(pool: &PgPool, suborder: &str) -> OrderWithItems {
    OrderService::new(pool.clone())
        .create(order_request(Marketplace::Paris, suborder))
        .await
        .unwrap()
}

async fn set_status(pool: &PgPool, id: Uuid, status: OrderStatus) {
    sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await
        .unwrap();
}

async fn operator(pool: &PgPool) -> Uuid {
    UserRepository::new(pool.clone())
        .create("bodega@example.cl", "not-a-real-hash", "Bodega", UserRole::Operator)
        .await
        .unwrap()
        .id
}

fn scan(code: &str, quantity: i32) -> ScanItemRequest {
    ScanItemRequest {
        code: code.to_string(),
        quantity,
        force_item_id: None,
    }
}

#[sqlx::test]
#[ignore] // Requires database
async fn duplicate_suborder_is_a_conflict(pool: PgPool) {
    let service = OrderService::new(pool.clone());
    service
        .create(order_request(Marketplace::Paris, "PA-1001"))
        .await
        .unwrap();

    let again = service
        .create(order_request(Marketplace::Paris, "PA-1001"))
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    // same number on another channel is a different order
    service
        .create(order_request(Marketplace::Ripley, "PA-1001"))
        .await
        .unwrap();
}

#[sqlx::test]
#[ignore] // Requires database
async fn only_pending_or_cancelled_orders_are_deleted(pool: PgPool) {
    let service = OrderService::new(pool.clone());
    let processing = create_order(&pool, "PA-2001").await;
    set_status(&pool, processing.order.id, OrderStatus::Processing).await;

    let refused = service.delete(processing.order.id).await;
    assert!(matches!(refused, Err(AppError::BadRequest(_))));
    assert!(service.get(processing.order.id).await.is_ok());

    let pending = create_order(&pool, "PA-2002").await;
    service.delete(pending.order.id).await.unwrap();
    assert!(matches!(
        service.get(pending.order.id).await,
        Err(AppError::NotFound(_))
    ));

    let cancelled = create_order(&pool, "PA-2003").await;
    set_status(&pool, cancelled.order.id, OrderStatus::Cancelled).await;
    service.delete(cancelled.order.id).await.unwrap();
}

#[sqlx::test]
#[ignore] // Requires database
async fn bulk_status_reports_why_orders_were_skipped(pool: PgPool) {
    let service = OrderService::new(pool.clone());
    let pending = create_order(&pool, "PA-3001").await;
    let shipped = create_order(&pool, "PA-3002").await;
    set_status(&pool, shipped.order.id, OrderStatus::Shipped).await;
    let missing = Uuid::new_v4();

    let response = service
        .bulk_update_status(BulkStatusRequest {
            order_ids: vec![pending.order.id, shipped.order.id, missing, pending.order.id],
            status: OrderStatus::Processing,
        })
        .await
        .unwrap();

    assert_eq!(response.updated, 1);
    assert_eq!(response.skipped, 2);
    assert_eq!(response.results.len(), 3);

    let outcome = |id: Uuid| {
        response
            .results
            .iter()
            .find(|r| r.order_id == id)
            .map(|r| r.outcome.clone())
            .unwrap()
    };
    assert_eq!(outcome(pending.order.id), BulkItemOutcome::Updated);
    assert_eq!(
        outcome(shipped.order.id),
        BulkItemOutcome::Skipped {
            reason: "Cannot change status from shipped to processing".to_string()
        }
    );
    assert_eq!(
        outcome(missing),
        BulkItemOutcome::Skipped {
            reason: "Order not found".to_string()
        }
    );

    let stored = service.get(pending.order.id).await.unwrap();
    assert_eq!(stored.order.status, OrderStatus::Processing);
}

#[sqlx::test]
#[ignore] // Requires database
async fn status_guard_loses_to_a_concurrent_writer(pool: PgPool) {
    let repo = OrderRepository::new(pool.clone());
    let order = create_order(&pool, "PA-3101").await;

    // someone else moved it first
    set_status(&pool, order.order.id, OrderStatus::Cancelled).await;

    let applied = repo
        .update_status_guarded(order.order.id, OrderStatus::Pending, OrderStatus::Processing)
        .await
        .unwrap();
    assert!(!applied);
    let stored = repo.find_by_id(order.order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
}

#[sqlx::test]
#[ignore] // Requires database
async fn bulk_carrier_skips_orders_already_dispatched(pool: PgPool) {
    let service = OrderService::new(pool.clone());
    let packed = create_order(&pool, "PA-4001").await;
    set_status(&pool, packed.order.id, OrderStatus::Packed).await;
    let shipped = create_order(&pool, "PA-4002").await;
    set_status(&pool, shipped.order.id, OrderStatus::Shipped).await;

    let response = service
        .bulk_update_carrier(BulkCarrierRequest {
            order_ids: vec![packed.order.id, shipped.order.id],
            carrier: Carrier::Starken,
            tracking_numbers: HashMap::from([(packed.order.id, "STK998877".to_string())]),
        })
        .await
        .unwrap();

    assert_eq!(response.updated, 1);
    assert_eq!(response.skipped, 1);
    assert_eq!(
        response.results[1].outcome,
        BulkItemOutcome::Skipped {
            reason: "Carrier cannot change once the order is shipped".to_string()
        }
    );

    let stored = service.get(packed.order.id).await.unwrap();
    assert_eq!(stored.order.carrier, Some(Carrier::Starken));
    assert_eq!(stored.order.tracking_number.as_deref(), Some("STK998877"));
    let untouched = service.get(shipped.order.id).await.unwrap();
    assert_eq!(untouched.order.carrier, None);
}

#[sqlx::test]
#[ignore] // Requires database
async fn update_with_stale_status_writes_nothing(pool: PgPool) {
    let repo = OrderRepository::new(pool.clone());
    let order = create_order(&pool, "PA-5001").await;
    set_status(&pool, order.order.id, OrderStatus::Cancelled).await;

    let request = UpdateOrderRequest {
        customer_name: Some("Otro Cliente".to_string()),
        status: Some(OrderStatus::Processing),
        ..UpdateOrderRequest::default()
    };
    let written = repo
        .update(order.order.id, &request, OrderStatus::Pending)
        .await
        .unwrap();
    assert!(written.is_none());

    let stored = repo.find_by_id(order.order.id).await.unwrap().unwrap();
    assert_eq!(stored.customer_name, "María Pérez");
    assert_eq!(stored.status, OrderStatus::Cancelled);
}

#[sqlx::test]
#[ignore] // Requires database
async fn update_changes_fields_and_status_together(pool: PgPool) {
    let service = OrderService::new(pool.clone());
    let order = create_order(&pool, "PA-5002").await;

    let updated = service
        .update(
            order.order.id,
            UpdateOrderRequest {
                tracking_number: Some("CHX123456".to_string()),
                status: Some(OrderStatus::Processing),
                ..UpdateOrderRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.order.status, OrderStatus::Processing);
    assert_eq!(updated.order.tracking_number.as_deref(), Some("CHX123456"));
}

#[sqlx::test]
#[ignore] // Requires database
async fn over_scan_is_rejected(pool: PgPool) {
    let user = operator(&pool).await;
    let order = create_order(&pool, "PA-6001").await;
    let scanner = ScanService::new(pool.clone(), &ScanSettings::default());

    let first = scanner
        .scan_item(order.order.id, user, scan("7801234567890", 1))
        .await
        .unwrap();
    assert!(first.accepted);
    assert_eq!(first.progress.units_scanned, 1);

    let over = scanner
        .scan_item(order.order.id, user, scan("7801234567890", 2))
        .await;
    assert!(matches!(over, Err(AppError::BadRequest(_))));

    let progress = scanner.scan_progress(order.order.id).await.unwrap();
    assert_eq!(progress.units_scanned, 1);
    assert!(!progress.complete);

    let events = scanner.scan_events(order.order.id).await.unwrap();
    assert_eq!(events.len(), 2);
}

#[sqlx::test]
#[ignore] // Requires database
async fn full_scan_packs_a_pending_order(pool: PgPool) {
    let user = operator(&pool).await;
    let order = create_order(&pool, "PA-6002").await;
    let scanner = ScanService::new(pool.clone(), &ScanSettings::default());

    let first = scanner
        .scan_item(order.order.id, user, scan("7801234567890", 1))
        .await
        .unwrap();
    assert!(!first.order_completed);

    // SKU typed with the separator dropped still resolves to the item
    let last = scanner
        .scan_item(order.order.id, user, scan("lamp01", 1))
        .await
        .unwrap();
    assert!(last.accepted);
    assert!(last.order_completed);
    assert!(last.progress.complete);
    assert!(last.progress.verified_at.is_some());

    let stored = OrderRepository::new(pool.clone())
        .find_by_id(order.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Packed);
    assert!(stored.scan_verified_at.is_some());
}

#[sqlx::test]
#[ignore] // Requires database
async fn reset_scan_clears_counts_and_verification(pool: PgPool) {
    let user = operator(&pool).await;
    let order = create_order(&pool, "PA-6003").await;
    let scanner = ScanService::new(pool.clone(), &ScanSettings::default());
    scanner
        .scan_item(order.order.id, user, scan("7801234567890", 2))
        .await
        .unwrap();

    let progress = scanner.reset_scan(order.order.id).await.unwrap();
    assert_eq!(progress.units_scanned, 0);
    assert!(!progress.complete);
    assert!(progress.verified_at.is_none());
    assert!(progress.items.iter().all(|i| i.scanned == 0));

    assert!(matches!(
        scanner.reset_scan(Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));
}

#[sqlx::test]
#[ignore] // Requires database
async fn product_search_ignores_separators_in_stored_sku(pool: PgPool) {
    let order = create_order(&pool, "PA-7001").await;
    let scanner = ScanService::new(pool.clone(), &ScanSettings::default());

    for code in ["LAMP-01", "lamp01", "LAMP 01", "lamp_01"] {
        let found = scanner.find_orders_for_product(code).await.unwrap();
        assert_eq!(found.len(), 1, "code {:?}", code);
        assert_eq!(found[0].id, order.order.id);
    }

    set_status(&pool, order.order.id, OrderStatus::Shipped).await;
    assert!(scanner.find_orders_for_product("LAMP01").await.unwrap().is_empty());
}

const RIPLEY_SETTLEMENT: &str = "\
Nro OT;Fecha;Monto
1234;15/03/2024;$ 25.980
5555;15/03/2024;$ 9.990
2222;16/03/2024;$ 30.000
;;abc
Total;;$ 65.970
";

#[sqlx::test]
#[ignore] // Requires database
async fn settlement_job_counts_rows_and_survives_a_restart(pool: PgPool) {
    let user = operator(&pool).await;
    let orders = OrderService::new(pool.clone());
    // stored zero-padded, settled without the padding
    let padded = orders
        .create(order_request(Marketplace::Ripley, "0001234"))
        .await
        .unwrap();
    let mut short = order_request(Marketplace::Ripley, "2222");
    short.items = vec![item("BAG-9", "7809876543210", 1)];
    orders.create(short).await.unwrap();

    let storage_dir = std::env::temp_dir().join(format!("orderdesk-db-{}", Uuid::new_v4()));
    let storage = FileStorage::new(&storage_dir).unwrap();
    let service = LiquidationService::new(pool.clone(), storage, 1024 * 1024);
    let (queue, _receiver) = LiquidationQueue::new(4);

    let job = service
        .upload(
            Marketplace::Ripley,
            "liquidacion-ripley.csv",
            RIPLEY_SETTLEMENT.as_bytes(),
            user,
            &queue,
        )
        .await
        .unwrap();
    assert_eq!(job.job.status, JobStatus::Queued);
    let job_id = job.job.id;

    let counters = service.process_job(job_id).await.unwrap();
    assert_eq!(counters.processed, 4);
    assert_eq!(counters.matched, 1);
    assert_eq!(counters.unmatched, 1);
    assert_eq!(counters.mismatched, 1);
    assert_eq!(counters.failed, 1);

    let finished = service.get_job(job_id).await.unwrap();
    assert_eq!(finished.job.status, JobStatus::Completed);
    assert_eq!(finished.job.rows_total, 4);
    assert_eq!(finished.progress_percent, 100);

    let matched = service
        .job_lines(
            job_id,
            &LineFilter {
                match_status: Some(LineMatchStatus::Matched),
            },
            &Pagination::new(1, 50),
        )
        .await
        .unwrap();
    assert_eq!(matched.total, 1);
    assert_eq!(matched.items[0].order_id, Some(padded.order.id));

    // a worker died mid-run: the job is picked up again from the start
    sqlx::query("UPDATE liquidation_jobs SET status = 'processing' WHERE id = $1")
        .bind(job_id)
        .execute(&pool)
        .await
        .unwrap();
    let unfinished = LiquidationRepository::new(pool.clone())
        .unfinished_job_ids()
        .await
        .unwrap();
    assert_eq!(unfinished, vec![job_id]);

    let rerun = service.process_job(job_id).await.unwrap();
    assert_eq!(rerun.processed, 4);
    let lines = service
        .job_lines(job_id, &LineFilter::default(), &Pagination::new(1, 50))
        .await
        .unwrap();
    assert_eq!(lines.total, 3);

    // a completed job is left alone
    let again = service.process_job(job_id).await.unwrap();
    assert_eq!(again.processed, 0);

    let _ = std::fs::remove_dir_all(storage_dir);
}
