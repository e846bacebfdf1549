//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need Docker.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{OrderId, ProductId, UserId, Version};
use domain::{
    CustomerOrder, HoldPolicy, LineItem, Money, OrderKind, OrderLike, OrderRecord, OrderStatus,
    PriceList, Product, ReservationUpsert, StockOrder,
};
use inventory_store::{
    InventoryStore, OrderQuery, PostgresInventoryStore, StoreError, SweepOutcome,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresInventoryStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE line_items, reservations, orders, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInventoryStore::new(pool)
}

async fn seed_product(store: &PostgresInventoryStore, count: u32) -> Product {
    let product = Product::new(
        "EXT-1",
        "Widget",
        count,
        PriceList::flat(Money::from_cents(1999)),
    );
    store.save_product(product.clone()).await.unwrap();
    product
}

fn upsert(product: ProductId, order: OrderId, quantity: u32) -> ReservationUpsert {
    ReservationUpsert {
        product,
        order,
        author: UserId::new(),
        quantity,
        for_stock: false,
        now: Utc::now(),
        hold_for: HoldPolicy::default().customer,
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn product_round_trip_keeps_reservation_set() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;

    let outcome = store
        .upsert_reservation(upsert(product.id, OrderId::new(), 3), None)
        .await
        .unwrap();

    let loaded = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded.physical_count, 10);
    assert_eq!(loaded.prices.retail, Money::from_cents(1999));
    assert_eq!(loaded.reservations, vec![outcome.reservation.id]);
    assert_eq!(loaded.reservation_version, Version::new(1));

    store.update_product_count(product.id, 7).await.unwrap();
    let loaded = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded.physical_count, 7);
    assert_eq!(loaded.reservation_version, Version::new(2));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn upsert_is_keyed_by_product_and_order() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;
    let order = OrderId::new();

    let first = store
        .upsert_reservation(upsert(product.id, order, 2), None)
        .await
        .unwrap();
    assert!(first.created);

    let second = store
        .upsert_reservation(upsert(product.id, order, 6), Some(first.product_version))
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.reservation.id, first.reservation.id);
    assert_eq!(second.reservation.quantity, 6);
    assert_eq!(second.reservation.expires_at, first.reservation.expires_at);

    let snapshot = store.product_snapshot(product.id).await.unwrap().unwrap();
    assert_eq!(snapshot.reservations.len(), 1);
    assert_eq!(snapshot.version(), Version::new(2));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn stale_version_is_rejected() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;

    store
        .upsert_reservation(upsert(product.id, OrderId::new(), 1), None)
        .await
        .unwrap();

    let result = store
        .upsert_reservation(
            upsert(product.id, OrderId::new(), 1),
            Some(Version::initial()),
        )
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { .. })
    ));

    let missing = store
        .upsert_reservation(upsert(ProductId::new(), OrderId::new(), 1), None)
        .await;
    assert!(matches!(missing, Err(StoreError::ProductNotFound(_))));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn delete_reservation_is_idempotent_and_detaches() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;
    let order = OrderId::new();

    let outcome = store
        .upsert_reservation(upsert(product.id, order, 2), None)
        .await
        .unwrap();
    let mut item = LineItem::new(order, product.id, UserId::new(), 2, false);
    item.reserved = Some(outcome.reservation.id);
    store.save_line_item(item.clone()).await.unwrap();

    assert!(
        store
            .delete_reservation(outcome.reservation.id)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .delete_reservation(outcome.reservation.id)
            .await
            .unwrap()
            .is_none()
    );

    let item = store.get_line_item(item.id).await.unwrap().unwrap();
    assert!(item.reserved.is_none());
    let product = store.get_product(product.id).await.unwrap().unwrap();
    assert!(product.reservations.is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn sweeper_release_skips_committed_items() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;
    let past = Utc::now() - Duration::hours(3);

    let mut ids = Vec::new();
    for in_progress in [true, false] {
        let order = OrderId::new();
        let reservation = store
            .upsert_reservation(
                ReservationUpsert {
                    now: past,
                    ..upsert(product.id, order, 1)
                },
                None,
            )
            .await
            .unwrap()
            .reservation;

        let mut item = LineItem::new(order, product.id, UserId::new(), 1, false);
        item.reserved = Some(reservation.id);
        item.in_progress = in_progress;
        store.save_line_item(item).await.unwrap();
        ids.push(reservation.id);
    }

    let now = Utc::now();
    let expired = store.expired_reservations(now, 500).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, ids[0]);

    assert!(matches!(
        store.release_expired_reservation(ids[0], now).await.unwrap(),
        SweepOutcome::Released(_)
    ));
    assert_eq!(
        store.release_expired_reservation(ids[1], now).await.unwrap(),
        SweepOutcome::Committed
    );
    assert!(store.get_reservation(ids[1]).await.unwrap().is_some());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn one_in_progress_customer_order_per_author() {
    let store = get_test_store().await;
    let author = UserId::new();

    store
        .insert_order(CustomerOrder::new(author, "Ann", Utc::now()).into())
        .await
        .unwrap();
    let duplicate = store
        .insert_order(CustomerOrder::new(author, "Ann", Utc::now()).into())
        .await;
    assert!(matches!(
        duplicate,
        Err(StoreError::DuplicateInProgressOrder(_))
    ));

    let found = store
        .find_in_progress_customer_order(author)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.author, author);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn order_saves_are_version_checked() {
    let store = get_test_store().await;
    let author = UserId::new();
    let inserted = store
        .insert_order(CustomerOrder::new(author, "Ann", Utc::now()).into())
        .await
        .unwrap();

    let mut order = inserted.clone().into_customer().unwrap();
    let (to, effect) = order.plan_status_change(Some(OrderStatus::Ordered)).unwrap();
    order.apply_status_change(to, effect, Utc::now());

    let saved = store.save_order(order.into()).await.unwrap();
    assert_eq!(saved.version(), Version::new(1));
    assert_eq!(saved.status_str(), "ordered");

    let stale = store.save_order(inserted).await;
    assert!(matches!(stale, Err(StoreError::OrderVersionConflict { .. })));

    // The author may open a new cart once the previous one is ordered.
    store
        .insert_order(CustomerOrder::new(author, "Ann", Utc::now()).into())
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn list_orders_by_kind_and_status() {
    let store = get_test_store().await;
    let author = UserId::new();

    store
        .insert_order(StockOrder::new(author, Utc::now()).into())
        .await
        .unwrap();
    for _ in 0..2 {
        store
            .insert_order(StockOrder::new(UserId::new(), Utc::now()).into())
            .await
            .unwrap();
    }
    store
        .insert_order(CustomerOrder::new(author, "Ann", Utc::now()).into())
        .await
        .unwrap();

    let stock = store
        .list_orders(OrderQuery::for_kind(OrderKind::Stock).statuses(vec!["in_progress"]))
        .await
        .unwrap();
    assert_eq!(stock.len(), 3);
    assert!(stock.iter().all(|o| matches!(o, OrderRecord::Stock(_))));

    let page = store.list_orders(OrderQuery::new().page(2, 3)).await.unwrap();
    assert_eq!(page.len(), 1);

    let mine = store.list_orders(OrderQuery::new().author(author)).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(store.in_progress_stock_orders(author).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn committed_holds_do_not_block_the_sweep_batch() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;
    let base = Utc::now() - Duration::hours(5);

    let mut ids = Vec::new();
    for (minutes, in_progress) in [(0, false), (1, false), (2, true)] {
        let order = OrderId::new();
        let reservation = store
            .upsert_reservation(
                ReservationUpsert {
                    now: base + Duration::minutes(minutes),
                    ..upsert(product.id, order, 1)
                },
                None,
            )
            .await
            .unwrap()
            .reservation;
        let mut item = LineItem::new(order, product.id, reservation.author, 1, false);
        item.reserved = Some(reservation.id);
        item.in_progress = in_progress;
        store.save_line_item(item).await.unwrap();
        ids.push(reservation.id);
    }

    let batch = store.expired_reservations(Utc::now(), 2).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, ids[2]);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn count_update_invalidates_earlier_snapshots() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let before = store.product_snapshot(product.id).await.unwrap().unwrap();

    store.update_product_count(product.id, 1).await.unwrap();

    let stale = store
        .upsert_reservation(upsert(product.id, OrderId::new(), 3), Some(before.version()))
        .await;
    assert!(matches!(stale, Err(StoreError::ConcurrencyConflict { .. })));

    let after = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(after.physical_count, 1);
    assert_eq!(after.reservation_version, before.version().next());
    assert!(after.reservations.is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn one_empty_stock_order_per_author() {
    let store = get_test_store().await;
    let author = UserId::new();
    let first = store
        .insert_order(StockOrder::new(author, Utc::now()).into())
        .await
        .unwrap();

    let second = store
        .insert_order(StockOrder::new(author, Utc::now()).into())
        .await;
    assert!(matches!(second, Err(StoreError::EmptyStockOrderExists(a)) if a == author));

    assert!(store.discard_empty_order(first.id()).await.unwrap());
    store
        .insert_order(StockOrder::new(author, Utc::now()).into())
        .await
        .unwrap();
}
